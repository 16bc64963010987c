//! Durable storage for the single OAuth access token.

use crate::api::files::{File, TokenFile};
use crate::api::BearerToken;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An access token and the instant it stops being valid.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccessToken {
    value: BearerToken,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: BearerToken::new(value),
            expires_at,
        }
    }

    pub fn bearer(&self) -> &BearerToken {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `now >= expires_at`.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Keeps the access token in `.secrets/token.json` so it survives restarts. There is no network
/// access here.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, or `None` if nothing has been stored.
    pub async fn get(&self) -> Result<Option<AccessToken>> {
        let file = File::<TokenFile>::load(&self.path).await?;
        Ok(file.map(|f| {
            let data = f.into_data();
            AccessToken::new(data.access_token, data.expires_at)
        }))
    }

    /// Stores `value`, expiring `expires_in` seconds from now.
    ///
    /// # Errors
    /// - `expires_in` does not fit in a timestamp.
    /// - The token file cannot be written.
    pub async fn set(&self, value: impl Into<String>, expires_in: i64) -> Result<AccessToken> {
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .with_context(|| format!("A lifetime of {expires_in} seconds is out of range"))?;
        self.set_expiring_at(value, expires_at).await
    }

    /// Stores `value` with an absolute expiry.
    pub async fn set_expiring_at(
        &self,
        value: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessToken> {
        let data = TokenFile {
            access_token: value.into(),
            expires_at,
        };
        File::new(&self.path, data.clone()).save().await?;
        debug!("Stored an access token that expires at {expires_at}");
        Ok(AccessToken::new(data.access_token, expires_at))
    }

    pub async fn clear(&self) -> Result<()> {
        File::<TokenFile>::delete(&self.path).await
    }

    /// A missing token counts as expired, and so does one we cannot read.
    pub async fn is_expired(&self) -> bool {
        match self.get().await {
            Ok(Some(token)) => token.is_expired(),
            Ok(None) => true,
            Err(e) => {
                warn!("Unable to read the stored token: {e:#}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("token.json"))
    }

    #[tokio::test]
    async fn test_absent_token_is_expired() {
        let dir = TempDir::new().unwrap();
        let tokens = store(&dir);
        assert_eq!(tokens.get().await.unwrap(), None);
        assert!(tokens.is_expired().await);
    }

    #[tokio::test]
    async fn test_set_get_clear() {
        let dir = TempDir::new().unwrap();
        let tokens = store(&dir);
        let stored = tokens.set("ya29.token", 3600).await.unwrap();
        let loaded = tokens.get().await.unwrap().unwrap();
        assert_eq!(stored, loaded);
        assert_eq!(loaded.bearer().secret(), "ya29.token");
        assert!(!tokens.is_expired().await);

        // a second store instance sees the same token
        assert!(!store(&dir).is_expired().await);

        tokens.clear().await.unwrap();
        assert_eq!(tokens.get().await.unwrap(), None);
        assert!(tokens.is_expired().await);
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_an_error() {
        let dir = TempDir::new().unwrap();
        let tokens = store(&dir);
        assert!(tokens.set("ya29.token", 10_000_000_000_000).await.is_err());
        assert!(tokens.set("ya29.token", i64::MAX).await.is_err());
        assert_eq!(tokens.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_one_second_in_the_past_is_expired() {
        let dir = TempDir::new().unwrap();
        let tokens = store(&dir);
        tokens
            .set_expiring_at("ya29.old", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(tokens.get().await.unwrap().is_some());
        assert!(tokens.is_expired().await);
    }

    #[tokio::test]
    async fn test_unreadable_token_is_expired() {
        let dir = TempDir::new().unwrap();
        let tokens = store(&dir);
        utils::write(tokens.path(), "garbage").await.unwrap();
        assert!(tokens.get().await.is_err());
        assert!(tokens.is_expired().await);
    }
}
