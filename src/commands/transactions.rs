use crate::commands::Out;
use crate::model::calendar::{night_of, short_date};
use crate::model::{phone_key, Transaction, TransactionType, User};
use crate::store::RecordStore;
use crate::Result;
use anyhow::{bail, Context};
use chrono::NaiveDate;

/// Files a contribution or an expense under the user whose phone is `phone`. The owner's name is
/// `name` when given, otherwise it is looked up among the known users. `date` defaults to today
/// and must be `YYYY-MM-DD`.
///
/// # Errors
/// - The owner is unknown and no `name` was given.
/// - `date` does not parse.
/// - The local cache cannot be written.
pub async fn transaction_add(
    store: &RecordStore,
    phone: &str,
    name: Option<&str>,
    amount: u64,
    kind: TransactionType,
    date: Option<&str>,
) -> Result<Out<Transaction>> {
    let owner = owner(store, phone, name).await?;
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Unable to parse '{d}' as a YYYY-MM-DD date"))?,
        None => chrono::Local::now().date_naive(),
    };

    let mut tx = Transaction::new(
        short_date(date),
        night_of(date),
        owner.name.clone(),
        amount,
        kind,
    );
    tx.phone = Some(owner.phone.clone());

    if !store.save_transaction(&tx, &owner).await {
        bail!("Unable to record transaction {} in the local cache", tx.id);
    }
    Ok(Out::new(
        format!("Saved transaction {} for {}", tx.id, owner.name),
        tx,
    ))
}

/// Lists transactions newest first. With a `phone`, this is the owner's view, which falls back to
/// the cache or the placeholder ledger when the sheet cannot answer. Without one, every
/// transaction is listed.
pub async fn transactions(
    store: &RecordStore,
    phone: Option<&str>,
    name: Option<&str>,
) -> Result<Out<Vec<Transaction>>> {
    let txs = match phone {
        Some(phone) => {
            let owner = match owner(store, phone, name).await {
                Ok(owner) => owner,
                Err(_) => User::new(name.unwrap_or(phone), phone),
            };
            store.get_transactions_for_owner(&owner).await
        }
        None => store.get_all_transactions().await,
    };
    Ok(Out::new(
        format!("Found {} transaction(s)", txs.len()),
        txs,
    ))
}

async fn owner(store: &RecordStore, phone: &str, name: Option<&str>) -> Result<User> {
    let phone = phone.trim();
    if phone.is_empty() {
        bail!("A phone number is required");
    }
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(User::new(name, phone));
    }
    let key = phone_key(phone);
    match store
        .get_all_users()
        .await
        .into_iter()
        .find(|u| u.phone_key() == key)
    {
        Some(user) => Ok(User::new(user.name, phone)),
        None => bail!("No user is registered with phone {phone}, pass --name or add them first"),
    }
}
