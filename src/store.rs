//! `RecordStore` is the only layer that decides what happens when the sheet cannot be used. The
//! sheet gateway, the schema guard and the auth flow report what went wrong; the store logs it,
//! falls back to the local cache, and answers the caller anyway.

use crate::api::{
    self, AccessToken, AuthFlow, AuthState, Credential, Mode, Sheet, SheetSchemaGuard,
    TRANSACTIONS, TRANSACTIONS_APPEND_RANGE, TRANSACTIONS_FIRST_ROW, TRANSACTIONS_RANGE, USERS,
    USERS_APPEND_RANGE, USERS_RANGE,
};
use crate::config::OwnerScope;
use crate::db::LocalCache;
use crate::error::{SheetResult, SyncError};
use crate::model::calendar::today;
use crate::model::columns::{header_row, Row, TransactionColumn, UserColumn};
use crate::model::{phone_key, placeholder_transactions, sort_newest_first, Transaction, User};
use crate::{Config, Result};
use tracing::{debug, error, info, warn};
use url::Url;

/// What became of the remote half of a write.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum RemoteWrite {
    Appended,
    AlreadyPresent,
    NotAuthorized,
}

/// Composes the sheet gateway, the schema guard, the auth flow and the local cache into the
/// ledger's domain operations.
pub struct RecordStore {
    sheet: Box<dyn Sheet>,
    auth: AuthFlow,
    cache: LocalCache,
    api_key: Option<String>,
    owner_scope: OwnerScope,
}

impl RecordStore {
    pub fn new(
        sheet: Box<dyn Sheet>,
        auth: AuthFlow,
        cache: LocalCache,
        api_key: Option<String>,
        owner_scope: OwnerScope,
    ) -> Self {
        Self {
            sheet,
            auth,
            cache,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            owner_scope,
        }
    }

    /// Builds the store described by `config`.
    ///
    /// # Errors
    /// - `SyncError::Configuration` when `mode` is `Google` and no spreadsheet id is configured.
    pub fn from_config(config: &Config, mode: Mode) -> Result<Self> {
        Ok(Self::new(
            api::sheet(config, mode)?,
            AuthFlow::new(config),
            config.cache().clone(),
            config.api_key().map(str::to_string),
            config.owner_scope(),
        ))
    }

    /// Records `user` in the sheet unless their phone is already there, then caches them. Only
    /// a local cache failure returns `false`.
    pub async fn initialize_user(&self, user: &User) -> bool {
        let token = self.auth.valid_token().await;
        match self.sync_user(user, token.as_ref()).await {
            Ok(RemoteWrite::Appended) => info!("Added {} to the {USERS} sheet", user.phone),
            Ok(RemoteWrite::AlreadyPresent) => {
                debug!("{} is already in the {USERS} sheet", user.phone)
            }
            Ok(RemoteWrite::NotAuthorized) => {
                debug!("Not authorized to write, caching {} locally", user.phone)
            }
            Err(e) => warn!("Unable to sync {} to the {USERS} sheet: {e}", user.phone),
        }

        match self.cache.upsert_user(user, &today()).await {
            Ok(_) => true,
            Err(e) => {
                error!("Unable to cache user {}: {e:#}", user.phone);
                false
            }
        }
    }

    async fn sync_user(
        &self,
        user: &User,
        token: Option<&AccessToken>,
    ) -> SheetResult<RemoteWrite> {
        let Some(credential) = self.read_credential(token) else {
            return Ok(RemoteWrite::NotAuthorized);
        };
        self.require_sheet(USERS, &credential).await?;

        let key = user.phone_key();
        let rows = self.sheet.read(USERS_RANGE, &credential).await?;
        let present = rows.iter().skip(1).any(|r| {
            Row::new(r)
                .get(UserColumn::Phone)
                .is_some_and(|p| phone_key(p) == key)
        });
        if present {
            return Ok(RemoteWrite::AlreadyPresent);
        }

        let Some(token) = token else {
            return Ok(RemoteWrite::NotAuthorized);
        };
        // an empty sheet gets its header first, reads always skip row 1
        let mut new_rows = Vec::with_capacity(2);
        if rows.is_empty() {
            new_rows.push(header_row(&UserColumn::ALL));
        }
        new_rows.push(user.to_row(&today()));
        self.sheet
            .append(USERS_APPEND_RANGE, &new_rows, token.bearer())
            .await?;
        Ok(RemoteWrite::Appended)
    }

    /// Appends `tx` to the sheet under `owner` when authorized, then caches it. The answer only
    /// reflects the local cache write.
    pub async fn save_transaction(&self, tx: &Transaction, owner: &User) -> bool {
        match self.auth.valid_token().await {
            Some(token) => match self.append_transaction(tx, owner, &token).await {
                Ok(()) => info!("Appended transaction {} to the {TRANSACTIONS} sheet", tx.id),
                Err(e) => warn!(
                    "Unable to append transaction {} to the {TRANSACTIONS} sheet: {e}",
                    tx.id
                ),
            },
            None => debug!("Not authorized to write, caching transaction {} locally", tx.id),
        }

        let cached = Transaction {
            phone: Some(owner.phone.clone()),
            ..tx.clone()
        };
        match self.cache.upsert_transaction(&cached).await {
            Ok(_) => true,
            Err(e) => {
                error!("Unable to cache transaction {}: {e:#}", tx.id);
                false
            }
        }
    }

    async fn append_transaction(
        &self,
        tx: &Transaction,
        owner: &User,
        token: &AccessToken,
    ) -> SheetResult<()> {
        let credential = Credential::Bearer(token.bearer().clone());
        self.require_sheet(TRANSACTIONS, &credential).await?;

        let first_row = self.sheet.read(TRANSACTIONS_FIRST_ROW, &credential).await?;
        let mut new_rows = Vec::with_capacity(2);
        if first_row.is_empty() {
            new_rows.push(header_row(&TransactionColumn::ALL));
        }
        new_rows.push(tx.to_row(&owner.phone));
        self.sheet
            .append(TRANSACTIONS_APPEND_RANGE, &new_rows, token.bearer())
            .await
    }

    /// The transactions to show `owner`, newest first. When the sheet is missing or the read is
    /// not authorized, answers from the cache, or with the placeholder ledger if the cache has
    /// nothing to show.
    pub async fn get_transactions_for_owner(&self, owner: &User) -> Vec<Transaction> {
        let result = match self.read_credential(self.auth.valid_token().await.as_ref()) {
            Some(credential) => self.read_transactions(&credential).await,
            None => Err(SyncError::AuthRequired { status: 401 }),
        };
        match result {
            Ok(mut txs) => {
                if self.owner_scope == OwnerScope::Owner {
                    txs.retain(|t| t.is_owned_by(owner));
                }
                sort_newest_first(&mut txs);
                txs
            }
            Err(e @ (SyncError::SheetNotFound(_) | SyncError::AuthRequired { .. })) => {
                debug!("Reading transactions from the cache: {e}");
                let cached = self.cached_transactions_for(owner).await;
                if cached.is_empty() {
                    placeholder_transactions(owner)
                } else {
                    cached
                }
            }
            Err(e) => {
                warn!("Unable to read the {TRANSACTIONS} sheet, using the cache: {e}");
                self.cached_transactions_for(owner).await
            }
        }
    }

    /// Every user in the sheet, or in the cache if the sheet cannot be read.
    pub async fn get_all_users(&self) -> Vec<User> {
        match self.read_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("Unable to read the {USERS} sheet, using the cache: {e}");
                self.cache.list_users().await.unwrap_or_else(|e| {
                    error!("Unable to list cached users: {e:#}");
                    Vec::new()
                })
            }
        }
    }

    /// Every transaction in the sheet, or in the cache if the sheet cannot be read, newest first.
    pub async fn get_all_transactions(&self) -> Vec<Transaction> {
        let result = match self.read_credential(self.auth.valid_token().await.as_ref()) {
            Some(credential) => self.read_transactions(&credential).await,
            None => Err(SyncError::AuthRequired { status: 401 }),
        };
        match result {
            Ok(mut txs) => {
                sort_newest_first(&mut txs);
                txs
            }
            Err(e) => {
                warn!("Unable to read the {TRANSACTIONS} sheet, using the cache: {e}");
                self.cached_all_transactions().await
            }
        }
    }

    async fn read_users(&self) -> SheetResult<Vec<User>> {
        let credential = self
            .read_credential(self.auth.valid_token().await.as_ref())
            .ok_or(SyncError::AuthRequired { status: 401 })?;
        self.require_sheet(USERS, &credential).await?;
        let rows = self.sheet.read(USERS_RANGE, &credential).await?;
        Ok(rows
            .iter()
            .skip(1)
            .filter_map(|r| User::from_row(Row::new(r)))
            .collect())
    }

    async fn read_transactions(&self, credential: &Credential) -> SheetResult<Vec<Transaction>> {
        self.require_sheet(TRANSACTIONS, credential).await?;
        let rows = self.sheet.read(TRANSACTIONS_RANGE, credential).await?;
        Ok(rows
            .iter()
            .skip(1)
            .map(|r| Row::new(r))
            .filter(|r| !r.is_blank())
            .map(Transaction::from_row)
            .collect())
    }

    async fn cached_transactions_for(&self, owner: &User) -> Vec<Transaction> {
        let cached = match self.owner_scope {
            OwnerScope::All => self.cache.list_all_transactions().await,
            OwnerScope::Owner => self.cache.list_transactions_for_owner(&owner.phone).await,
        };
        cached.unwrap_or_else(|e| {
            error!("Unable to list cached transactions: {e:#}");
            Vec::new()
        })
    }

    async fn cached_all_transactions(&self) -> Vec<Transaction> {
        self.cache.list_all_transactions().await.unwrap_or_else(|e| {
            error!("Unable to list cached transactions: {e:#}");
            Vec::new()
        })
    }

    async fn require_sheet(&self, name: &str, credential: &Credential) -> SheetResult<()> {
        if SheetSchemaGuard::new(self.sheet.as_ref())
            .exists(name, credential)
            .await
        {
            Ok(())
        } else {
            Err(SyncError::SheetNotFound(name.to_string()))
        }
    }

    /// The bearer token when there is a valid one, otherwise the API key. Never both.
    fn read_credential(&self, token: Option<&AccessToken>) -> Option<Credential> {
        match (token, &self.api_key) {
            (Some(token), _) => Some(Credential::Bearer(token.bearer().clone())),
            (None, Some(key)) => Some(Credential::ApiKey(key.clone())),
            (None, None) => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.auth.is_configured()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated().await
    }

    pub async fn is_token_expired(&self) -> bool {
        self.auth.is_token_expired().await
    }

    pub async fn auth_state(&self) -> AuthState {
        self.auth.state().await
    }

    pub async fn build_authorization_url(&self) -> Result<Url> {
        self.auth.build_authorization_url().await
    }

    pub async fn process_callback(&self, fragment: &str) -> Result<bool> {
        self.auth.process_callback(fragment).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.auth.logout().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheetCalls;
    use crate::model::TransactionType;
    use crate::test::TestEnv;

    fn ronald() -> User {
        User::new("Ronald", "+6281234567890")
    }

    fn contribution(amount: u64) -> Transaction {
        Transaction::new("1 Jan 2026", "Malam Jumat", "Ronald", amount, TransactionType::In)
    }

    #[tokio::test]
    async fn test_initialize_user_twice_caches_once() {
        let env = TestEnv::new().await;
        env.authorize().await;
        let store = env.store();
        assert!(store.initialize_user(&ronald()).await);
        assert!(store.initialize_user(&ronald()).await);

        assert_eq!(env.cache().list_users().await.unwrap(), vec![ronald()]);
        // the second call found the phone in the sheet
        assert_eq!(env.sheet.calls().appends, 1);
        let rows = env.sheet.rows(USERS).unwrap();
        let appended = rows.last().unwrap();
        assert_eq!(appended[0], "Ronald");
        assert_eq!(appended[1], "+6281234567890");
    }

    #[tokio::test]
    async fn test_initialize_user_matches_numeric_phone_cell() {
        let env = TestEnv::new().await;
        env.authorize().await;
        // the seeded sheet holds 6281211112222 without the plus sign
        let budi = User::new("Budi Santoso", "+6281211112222");
        assert!(env.store().initialize_user(&budi).await);
        assert_eq!(env.sheet.calls().appends, 0);
    }

    #[tokio::test]
    async fn test_initialize_user_without_token_is_cache_only() {
        let env = TestEnv::new().await;
        assert!(env.store().initialize_user(&ronald()).await);
        assert_eq!(env.sheet.calls().appends, 0);
        assert_eq!(env.cache().list_users().await.unwrap(), vec![ronald()]);
    }

    #[tokio::test]
    async fn test_initialize_user_without_users_sheet() {
        let env = TestEnv::new().await;
        env.authorize().await;
        env.sheet.remove_sheet(USERS);
        assert!(env.store().initialize_user(&ronald()).await);
        let calls = env.sheet.calls();
        assert_eq!((calls.reads, calls.appends), (0, 0));
        assert_eq!(env.cache().list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_user_writes_header_into_empty_sheet() {
        let env = TestEnv::new().await;
        env.authorize().await;
        env.sheet.add_sheet(USERS, Vec::new());
        let store = env.store();
        assert!(store.initialize_user(&ronald()).await);

        let rows = env.sheet.rows(USERS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], TestEnv::row(&["name", "phone", "createdAt"]));
        assert_eq!(store.get_all_users().await, vec![ronald()]);
    }

    #[tokio::test]
    async fn test_save_transaction_appends_in_column_order() {
        let env = TestEnv::new().await;
        env.authorize().await;
        let tx = contribution(23000);
        assert!(env.store().save_transaction(&tx, &ronald()).await);

        assert_eq!(env.sheet.calls().appends, 1);
        let rows = env.sheet.rows(TRANSACTIONS).unwrap();
        assert_eq!(
            rows.last().unwrap(),
            &vec![
                tx.id.to_string(),
                "1 Jan 2026".to_string(),
                "Malam Jumat".to_string(),
                "Ronald".to_string(),
                "23000".to_string(),
                "masuk".to_string(),
                "+6281234567890".to_string(),
            ]
        );
        let cached = env.cache().list_all_transactions().await.unwrap();
        assert_eq!(cached[0].phone.as_deref(), Some("+6281234567890"));
    }

    #[tokio::test]
    async fn test_save_transaction_writes_header_into_empty_sheet() {
        let env = TestEnv::new().await;
        env.authorize().await;
        env.sheet.add_sheet(TRANSACTIONS, Vec::new());
        let store = env.store();
        let tx = contribution(23000);
        assert!(store.save_transaction(&tx, &ronald()).await);

        let rows = env.sheet.rows(TRANSACTIONS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            TestEnv::row(&["id", "date", "day", "name", "amount", "type", "phone"])
        );
        let all = store.get_all_transactions().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, tx.id);
        let mine = store.get_transactions_for_owner(&ronald()).await;
        assert_eq!(mine.iter().map(|t| t.id).collect::<Vec<_>>(), vec![tx.id]);

        // a second save finds the header and appends only its own row
        assert!(store.save_transaction(&contribution(1000), &ronald()).await);
        assert_eq!(env.sheet.rows(TRANSACTIONS).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_save_transaction_with_expired_token_skips_append() {
        let env = TestEnv::new().await;
        env.expire().await;
        let store = env.store();
        assert!(store.is_token_expired().await);
        assert!(store.save_transaction(&contribution(5000), &ronald()).await);
        let calls = env.sheet.calls();
        assert_eq!(calls.appends, 0);
        assert_eq!(calls.metadata, 0);
        assert_eq!(env.cache().list_all_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_transaction_unconfigured() {
        let env = TestEnv::unconfigured().await;
        let store = env.store();
        let err = store.build_authorization_url().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Configuration(_))
        ));
        assert!(store.save_transaction(&contribution(1000), &ronald()).await);
    }

    #[tokio::test]
    async fn test_save_transaction_remote_failure_still_succeeds() {
        let env = TestEnv::new().await;
        env.authorize().await;
        env.sheet
            .fail_appends(SyncError::RemoteUnavailable("connection reset".to_string()));
        assert!(env.store().save_transaction(&contribution(1000), &ronald()).await);
        assert_eq!(env.sheet.calls().appends, 1);
        assert_eq!(env.cache().list_all_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_when_transactions_sheet_missing() {
        let env = TestEnv::new().await;
        env.sheet.remove_sheet(TRANSACTIONS);
        let txs = env.store().get_transactions_for_owner(&ronald()).await;
        assert_eq!(txs.len(), 4);
        assert_eq!(
            txs[0],
            Transaction {
                id: 1,
                date: "1 Jan 2026".to_string(),
                day: "Malam Jumat".to_string(),
                name: "Ronald".to_string(),
                amount: 23000,
                kind: TransactionType::In,
                phone: None,
            }
        );
    }

    #[tokio::test]
    async fn test_placeholder_when_read_is_unauthorized() {
        let env = TestEnv::new().await;
        env.sheet.fail_reads(SyncError::AuthRequired { status: 403 });
        let txs = env.store().get_transactions_for_owner(&ronald()).await;
        assert_eq!(txs, placeholder_transactions(&ronald()));
    }

    #[tokio::test]
    async fn test_cached_rows_preferred_over_placeholder() {
        let env = TestEnv::new().await;
        let store = env.store();
        store.save_transaction(&contribution(700), &ronald()).await;
        env.sheet.remove_sheet(TRANSACTIONS);
        let txs = store.get_transactions_for_owner(&ronald()).await;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, 700);
    }

    #[tokio::test]
    async fn test_remote_unavailable_uses_cache() {
        let env = TestEnv::new().await;
        let store = env.store();
        store.save_transaction(&contribution(700), &ronald()).await;
        env.sheet
            .fail_reads(SyncError::RemoteUnavailable("timed out".to_string()));
        let txs = store.get_transactions_for_owner(&ronald()).await;
        assert_eq!(txs.len(), 1);
        assert_eq!(store.get_all_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_normalizes_and_sorts() {
        let env = TestEnv::new().await;
        env.sheet.add_sheet(
            TRANSACTIONS,
            vec![
                TestEnv::row(&["id", "date", "day", "name", "amount", "type", "phone"]),
                TestEnv::row(&["3", "d", "Malam Jumat", "A", "10", "Income"]),
                TestEnv::row(&["9", "d", "Malam Jumat", "B", "abc", "IN"]),
                TestEnv::row(&["5", "d", "Malam Jumat", "C", "30", "keluar"]),
            ],
        );
        let txs = env.store().get_transactions_for_owner(&ronald()).await;
        let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![9, 5, 3]);
        let kinds: Vec<TransactionType> = txs.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TransactionType::In, TransactionType::Out, TransactionType::In]
        );
        assert_eq!(txs[0].amount, 0);
    }

    #[tokio::test]
    async fn test_owner_scope() {
        let env = TestEnv::new().await;
        env.authorize().await;
        let store = env.store_with_scope(OwnerScope::Owner);
        let mine = contribution(100);
        store.save_transaction(&mine, &ronald()).await;
        let txs = store.get_transactions_for_owner(&ronald()).await;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, mine.id);

        // the default scope returns every row in the sheet
        let everyone = env.store().get_transactions_for_owner(&ronald()).await;
        assert_eq!(everyone.len(), 4);
    }

    #[tokio::test]
    async fn test_round_trip_through_the_sheet() {
        let env = TestEnv::new().await;
        env.authorize().await;
        let store = env.store();
        let tx = Transaction {
            kind: TransactionType::Out,
            ..contribution(12500)
        };
        store.save_transaction(&tx, &ronald()).await;
        let read = store.get_all_transactions().await;
        let found = read.iter().find(|t| t.id == tx.id).unwrap();
        assert_eq!(
            found,
            &Transaction {
                phone: Some(ronald().phone),
                ..tx
            }
        );
    }

    #[tokio::test]
    async fn test_ids_sorted_descending_in_save_order() {
        let env = TestEnv::new().await;
        env.authorize().await;
        env.sheet.add_sheet(
            TRANSACTIONS,
            vec![TestEnv::row(&["id", "date", "day", "name", "amount", "type", "phone"])],
        );
        let store = env.store();
        let mut saved = Vec::new();
        for amount in [1, 2, 3, 4, 5] {
            let tx = contribution(amount);
            store.save_transaction(&tx, &ronald()).await;
            saved.push(tx.id);
        }
        assert!(saved.windows(2).all(|w| w[0] < w[1]));
        let ids: Vec<i64> = store
            .get_transactions_for_owner(&ronald())
            .await
            .iter()
            .map(|t| t.id)
            .collect();
        saved.reverse();
        assert_eq!(ids, saved);
    }

    #[tokio::test]
    async fn test_get_all_users() {
        let env = TestEnv::new().await;
        env.sheet.add_sheet(
            USERS,
            vec![
                TestEnv::row(&["name", "phone", "createdAt"]),
                TestEnv::row(&["Budi", "6281211112222", "28 Des 2025"]),
                TestEnv::row(&["No Phone"]),
                TestEnv::row(&["Sarah", "6281333334444"]),
            ],
        );
        let users = env.store().get_all_users().await;
        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Budi", "Sarah"]);
    }

    #[tokio::test]
    async fn test_get_all_users_falls_back_to_cache() {
        let env = TestEnv::new().await;
        let store = env.store();
        store.initialize_user(&ronald()).await;
        env.sheet.remove_sheet(USERS);
        assert_eq!(store.get_all_users().await, vec![ronald()]);
    }

    #[tokio::test]
    async fn test_reads_prefer_bearer_over_api_key() {
        let env = TestEnv::new().await;
        let store = env.store();
        store.get_all_users().await;
        assert_eq!(env.sheet.calls().api_key_reads, 1);
        env.authorize().await;
        store.get_all_users().await;
        let calls = env.sheet.calls();
        assert_eq!((calls.api_key_reads, calls.bearer_reads), (1, 1));
    }

    #[tokio::test]
    async fn test_no_credentials_means_no_remote_calls() {
        let env = TestEnv::unconfigured().await;
        let store = env.store();
        assert_eq!(store.get_transactions_for_owner(&ronald()).await.len(), 4);
        assert!(store.get_all_users().await.is_empty());
        assert!(store.get_all_transactions().await.is_empty());
        assert_eq!(env.sheet.calls(), TestSheetCalls::default());
    }
}
