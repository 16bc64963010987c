//! The local cache: a SQLite mirror of the users and transactions the ledger has seen. Every
//! write lands here whether or not the sheet accepted it, and reads fall back to it when the
//! sheet cannot be reached.

mod migrations;

use crate::model::{Transaction, TransactionType, User};
use crate::Result;
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, trace};

type TransactionRow = (i64, String, String, String, i64, String, Option<String>);

const SELECT_TRANSACTIONS: &str =
    "SELECT id, date, day, name, amount, type, phone FROM transactions";

/// A handle to the cache database. Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LocalCache {
    pool: SqlitePool,
}

impl LocalCache {
    /// Opens the database at `path`, creating it if needed, and migrates the schema to the
    /// current version.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Unable to open the SQLite cache at {}", path.display()))?;

        let version = migrations::schema_version(&pool).await?;
        migrations::run(&pool, version, migrations::CURRENT_VERSION).await?;
        debug!("Opened the local cache at {}", path.display());
        Ok(Self { pool })
    }

    /// Inserts `user` unless a user with the same phone is already cached. Returns `true` when
    /// the user was inserted.
    pub async fn upsert_user(&self, user: &User, created_at: &str) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO users (phone, name, created_at) VALUES (?, ?, ?)")
                .bind(&user.phone)
                .bind(&user.name)
                .bind(created_at)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Unable to cache user {}", user.phone))?;
        let inserted = result.rows_affected() > 0;
        trace!("upsert_user {} inserted={inserted}", user.phone);
        Ok(inserted)
    }

    /// Inserts `tx` unless a transaction with the same id is already cached. Returns `true` when
    /// the transaction was inserted.
    pub async fn upsert_transaction(&self, tx: &Transaction) -> Result<bool> {
        let amount = i64::try_from(tx.amount)
            .with_context(|| format!("Amount {} is too large to cache", tx.amount))?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO transactions (id, date, day, name, amount, type, phone) \
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.id)
        .bind(&tx.date)
        .bind(&tx.day)
        .bind(&tx.name)
        .bind(amount)
        .bind(tx.kind.to_string())
        .bind(tx.phone.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Unable to cache transaction {}", tx.id))?;
        let inserted = result.rows_affected() > 0;
        trace!("upsert_transaction {} inserted={inserted}", tx.id);
        Ok(inserted)
    }

    /// Every cached user, in the order they were first cached.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, phone FROM users ORDER BY rowid")
                .fetch_all(&self.pool)
                .await
                .context("Unable to list cached users")?;
        Ok(rows
            .into_iter()
            .map(|(name, phone)| User { name, phone })
            .collect())
    }

    /// The cached transactions filed under `phone`, newest first.
    pub async fn list_transactions_for_owner(&self, phone: &str) -> Result<Vec<Transaction>> {
        let rows: Vec<TransactionRow> =
            sqlx::query_as(&format!("{SELECT_TRANSACTIONS} WHERE phone = ? ORDER BY id DESC"))
                .bind(phone)
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Unable to list cached transactions for {phone}"))?;
        Ok(rows.into_iter().map(transaction).collect())
    }

    /// Every cached transaction, newest first.
    pub async fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        let rows: Vec<TransactionRow> =
            sqlx::query_as(&format!("{SELECT_TRANSACTIONS} ORDER BY id DESC"))
                .fetch_all(&self.pool)
                .await
                .context("Unable to list cached transactions")?;
        Ok(rows.into_iter().map(transaction).collect())
    }
}

fn transaction(row: TransactionRow) -> Transaction {
    let (id, date, day, name, amount, kind, phone) = row;
    Transaction {
        id,
        date,
        day,
        name,
        amount: u64::try_from(amount).unwrap_or_default(),
        kind: TransactionType::from_cell(&kind),
        phone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cache() -> (TempDir, LocalCache) {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(&dir.path().join("kamling.sqlite"))
            .await
            .unwrap();
        (dir, cache)
    }

    fn tx(id: i64, phone: Option<&str>, kind: TransactionType) -> Transaction {
        Transaction {
            id,
            date: "1 Jan 2026".to_string(),
            day: "Malam Jumat".to_string(),
            name: "Ronald".to_string(),
            amount: 23000,
            kind,
            phone: phone.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_upsert_user_first_write_wins() {
        let (_dir, cache) = cache().await;
        let first = User::new("Ronald", "+6281234567890");
        let second = User::new("Ronald Renamed", "+6281234567890");
        assert!(cache.upsert_user(&first, "1 Jan 2026").await.unwrap());
        assert!(!cache.upsert_user(&second, "2 Jan 2026").await.unwrap());
        assert_eq!(cache.list_users().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_users_in_insertion_order() {
        let (_dir, cache) = cache().await;
        for (name, phone) in [("Zed", "+629"), ("Ann", "+621"), ("Mia", "+625")] {
            cache.upsert_user(&User::new(name, phone), "").await.unwrap();
        }
        let names: Vec<String> = cache
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Zed", "Ann", "Mia"]);
    }

    #[tokio::test]
    async fn test_upsert_transaction_by_id() {
        let (_dir, cache) = cache().await;
        let original = tx(10, Some("+62812"), TransactionType::Out);
        assert!(cache.upsert_transaction(&original).await.unwrap());
        let mut changed = original.clone();
        changed.amount = 1;
        assert!(!cache.upsert_transaction(&changed).await.unwrap());
        assert_eq!(cache.list_all_transactions().await.unwrap(), vec![original]);
    }

    #[tokio::test]
    async fn test_list_transactions() {
        let (_dir, cache) = cache().await;
        cache
            .upsert_transaction(&tx(1, Some("+62812"), TransactionType::In))
            .await
            .unwrap();
        cache
            .upsert_transaction(&tx(3, Some("+62899"), TransactionType::In))
            .await
            .unwrap();
        cache
            .upsert_transaction(&tx(2, Some("+62812"), TransactionType::Out))
            .await
            .unwrap();
        cache
            .upsert_transaction(&tx(4, None, TransactionType::In))
            .await
            .unwrap();

        let mine: Vec<i64> = cache
            .list_transactions_for_owner("+62812")
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(mine, vec![2, 1]);

        let all = cache.list_all_transactions().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
        assert_eq!(all[2].kind, TransactionType::Out);
        assert_eq!(all[0].phone, None);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kamling.sqlite");
        {
            let cache = LocalCache::open(&path).await.unwrap();
            cache
                .upsert_user(&User::new("Ronald", "+62812"), "1 Jan 2026")
                .await
                .unwrap();
        }
        let cache = LocalCache::open(&path).await.unwrap();
        assert_eq!(cache.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_record() {
        let (_dir, cache) = cache().await;
        let user = User::new("Ronald", "+6281234567890");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                cache.upsert_user(&user, "1 Jan 2026").await.unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(cache.list_users().await.unwrap().len(), 1);
    }
}
