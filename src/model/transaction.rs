use crate::model::columns::{build_row, Row, TransactionColumn};
use crate::model::user::phone_key;
use crate::model::User;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// The direction of a contribution.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money received into the kamling fund.
    #[default]
    #[serde(alias = "masuk", alias = "income")]
    In,
    /// Money paid out of the fund.
    #[serde(alias = "keluar", alias = "expense")]
    Out,
}

serde_plain::derive_display_from_serialize!(TransactionType);
serde_plain::derive_fromstr_from_deserialize!(TransactionType);

impl TransactionType {
    /// Interprets a `type` cell from the sheet. Matching is case-insensitive and anything
    /// unrecognized counts as money in.
    pub fn from_cell(cell: &str) -> Self {
        match cell.trim().to_lowercase().as_str() {
            "keluar" | "expense" | "out" => TransactionType::Out,
            _ => TransactionType::In,
        }
    }

    /// The word written into the sheet's `type` column.
    pub fn sheet_label(self) -> &'static str {
        match self {
            TransactionType::In => "masuk",
            TransactionType::Out => "keluar",
        }
    }
}

/// One contribution or expense. Immutable once saved.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    /// Assigned by the writer from the clock, see [`next_transaction_id`].
    pub id: i64,
    /// Localized calendar date, e.g. `1 Jan 2026`.
    pub date: String,
    /// Localized night name, e.g. `Malam Jumat`.
    pub day: String,
    /// Display name of the owner.
    pub name: String,
    /// Smallest currency unit.
    pub amount: u64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The owner's key. Optional on the wire; short sheet rows leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Transaction {
    /// Creates a transaction with a freshly assigned id and no owner phone.
    pub fn new(
        date: impl Into<String>,
        day: impl Into<String>,
        name: impl Into<String>,
        amount: u64,
        kind: TransactionType,
    ) -> Self {
        Self {
            id: next_transaction_id(),
            date: date.into(),
            day: day.into(),
            name: name.into(),
            amount,
            kind,
            phone: None,
        }
    }

    /// Reads a transaction from a `Transactions` sheet row, defaulting what is missing or
    /// unparsable: `id` becomes the current timestamp, `amount` becomes zero.
    pub(crate) fn from_row(row: Row<'_>) -> Self {
        let id = row
            .get(TransactionColumn::Id)
            .and_then(parse_integer)
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let amount = row
            .get(TransactionColumn::Amount)
            .and_then(parse_integer)
            .and_then(|a| u64::try_from(a).ok())
            .unwrap_or_default();
        Self {
            id,
            date: row.text(TransactionColumn::Date),
            day: row.text(TransactionColumn::Day),
            name: row.text(TransactionColumn::Name),
            amount,
            kind: TransactionType::from_cell(&row.text(TransactionColumn::Type)),
            phone: row.get(TransactionColumn::Phone).map(str::to_string),
        }
    }

    /// The `Transactions` sheet row for this transaction, filed under `owner_phone`.
    pub(crate) fn to_row(&self, owner_phone: &str) -> Vec<String> {
        build_row(&TransactionColumn::ALL, |col| match col {
            TransactionColumn::Id => self.id.to_string(),
            TransactionColumn::Date => self.date.clone(),
            TransactionColumn::Day => self.day.clone(),
            TransactionColumn::Name => self.name.clone(),
            TransactionColumn::Amount => self.amount.to_string(),
            TransactionColumn::Type => self.kind.sheet_label().to_string(),
            TransactionColumn::Phone => owner_phone.to_string(),
        })
    }

    /// `true` when this transaction is filed under `owner`'s phone.
    pub fn is_owned_by(&self, owner: &User) -> bool {
        self.phone
            .as_deref()
            .is_some_and(|p| phone_key(p) == owner.phone_key())
    }
}

/// Parses an integer cell. Sheets may render numbers as decimals, so a finite decimal is
/// truncated.
fn parse_integer(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Returns the current time in milliseconds, bumped past the last id this process handed out, so
/// ids are strictly increasing in save order.
pub fn next_transaction_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Sorts newest first.
pub(crate) fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.id.cmp(&a.id));
}

/// The sample ledger shown before the sheet is reachable. The first entry is filed under the
/// owner's name so the screen greets them with their own row.
pub fn placeholder_transactions(owner: &User) -> Vec<Transaction> {
    let sample = |id, date: &str, day: &str, name: &str, amount, kind| Transaction {
        id,
        date: date.to_string(),
        day: day.to_string(),
        name: name.to_string(),
        amount,
        kind,
        phone: None,
    };
    vec![
        sample(
            1,
            "1 Jan 2026",
            "Malam Jumat",
            &owner.name,
            23000,
            TransactionType::In,
        ),
        sample(
            2,
            "31 Des 2025",
            "Malam Kamis",
            "Alex",
            19000,
            TransactionType::In,
        ),
        sample(
            3,
            "31 Des 2025",
            "Malam Kamis",
            "Sarah",
            15000,
            TransactionType::Out,
        ),
        sample(
            4,
            "30 Des 2025",
            "Malam Rabu",
            "Budi",
            30000,
            TransactionType::In,
        ),
    ]
}
