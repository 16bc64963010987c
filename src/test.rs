//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::{AuthFlow, TestSheet, TokenStore};
use crate::config::{OwnerScope, Settings};
use crate::db::LocalCache;
use crate::store::RecordStore;
use crate::Config;
use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// A kamling home in a temporary directory plus a seeded `TestSheet`. Holds the `TempDir` to keep
/// the directory alive for the duration of the test.
pub(crate) struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
    pub(crate) sheet: TestSheet,
}

impl TestEnv {
    /// An environment with an API key and an OAuth client id, but no token yet.
    pub(crate) async fn new() -> Self {
        Self::with_settings(Some("test-api-key"), Some("test-client.apps.googleusercontent.com"))
            .await
    }

    /// An environment with neither an API key nor an OAuth client id.
    pub(crate) async fn unconfigured() -> Self {
        Self::with_settings(None, None).await
    }

    async fn with_settings(api_key: Option<&str>, client_id: Option<&str>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("kamling");
        let id = Uuid::new_v4().to_string().replace('-', "");
        let settings = Settings {
            sheet_url: format!("https://docs.google.com/spreadsheets/d/{id}/edit"),
            api_key: api_key.map(str::to_string),
            client_id: client_id.map(str::to_string),
            redirect_uri: None,
            owner_scope: OwnerScope::All,
        };
        let config = Config::create(&root, settings).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
            sheet: TestSheet::default(),
        }
    }

    pub(crate) fn config(&self) -> Config {
        self.config.clone()
    }

    pub(crate) fn cache(&self) -> &LocalCache {
        self.config.cache()
    }

    /// A store over this environment's sheet, cache and secrets.
    pub(crate) fn store(&self) -> RecordStore {
        self.store_with_scope(self.config.owner_scope())
    }

    pub(crate) fn store_with_scope(&self, scope: OwnerScope) -> RecordStore {
        RecordStore::new(
            Box::new(self.sheet.clone()),
            AuthFlow::new(&self.config),
            self.config.cache().clone(),
            self.config.api_key().map(str::to_string),
            scope,
        )
    }

    /// Stores a token that is good for an hour.
    pub(crate) async fn authorize(&self) {
        TokenStore::new(self.config.token_path())
            .set("test-access-token", 3600)
            .await
            .unwrap();
    }

    /// Stores a token that expired a second ago.
    pub(crate) async fn expire(&self) {
        TokenStore::new(self.config.token_path())
            .set_expiring_at("test-access-token", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
    }

    pub(crate) fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }
}
