//! Schema migrations for the local cache.
//!
//! Migration files live next to this module:
//! - `migration_NN_up.sql` takes the schema from version `NN-1` to `NN`
//! - `migration_NN_down.sql` takes it from `NN` back to `NN-1`

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

/// The schema version this build of the app expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

struct Migration {
    /// The version the database is at after `up_sql` runs.
    version: i32,
    up_sql: &'static str,
    down_sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up_sql: include_str!("migration_01_up.sql"),
    down_sql: include_str!("migration_01_down.sql"),
}];

/// Creates the `schema_version` table at version 0 if the database has never been migrated, then
/// returns the version the database is at.
pub(crate) async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("Failed to create the schema_version table")?;

    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to read the schema version")?;

    match row.0 {
        Some(version) => Ok(version),
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
                .execute(pool)
                .await
                .context("Failed to record the initial schema version")?;
            Ok(0)
        }
    }
}

/// Moves the schema from `from` to `to`, one version at a time, up or down. Each step runs in a
/// transaction together with its `schema_version` update. Every step is checked for before any
/// of them runs.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Cache schema is at version {to}");
        return Ok(());
    }
    if from > CURRENT_VERSION {
        bail!(
            "The cache schema is at version {from}, which is newer than this app understands \
            ({CURRENT_VERSION})"
        );
    }
    check_available(from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            debug!("Running cache migration {version:02} (up)");
            step(pool, find(version)?.up_sql, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Running cache migration {version:02} (down)");
            step(pool, find(version)?.down_sql, version - 1).await?;
        }
    }

    debug!("Cache schema migrated from version {from} to {to}");
    Ok(())
}

fn find(version: i32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
}

async fn step(pool: &SqlitePool, sql: &str, new_version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    tx.execute(sql)
        .await
        .context("Failed to execute migration SQL")?;

    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}

fn check_available(from: i32, to: i32) -> Result<()> {
    let (low, high) = if from < to { (from + 1, to) } else { (to + 1, from) };
    for version in low..=high {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            bail!("Migration {version} is required to go from version {from} to {to}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("test.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        (dir, pool)
    }

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        row.0 > 0
    }

    #[tokio::test]
    async fn test_fresh_database_is_version_zero() {
        let (_dir, pool) = pool().await;
        assert_eq!(schema_version(&pool).await.unwrap(), 0);
        // asking twice does not add a second row
        assert_eq!(schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_dir, pool) = pool().await;
        let from = schema_version(&pool).await.unwrap();
        run(&pool, from, CURRENT_VERSION).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), 1);
        assert!(table_exists(&pool, "users").await);
        assert!(table_exists(&pool, "transactions").await);

        run(&pool, 1, 0).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), 0);
        assert!(!table_exists(&pool, "users").await);
        assert!(!table_exists(&pool, "transactions").await);
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let (_dir, pool) = pool().await;
        schema_version(&pool).await.unwrap();
        assert!(run(&pool, CURRENT_VERSION + 1, CURRENT_VERSION).await.is_err());
    }

    #[test]
    fn test_check_available() {
        assert!(check_available(0, 1).is_ok());
        assert!(check_available(1, 0).is_ok());
        assert!(check_available(0, 2).is_err());
    }
}
