//! Durable JSON files kept under `$KAMLING_HOME/.secrets`.
//! - `token.json`: the OAuth access token and the instant it expires
//! - `oauth_state.json`: the CSRF state of the authorization round trip in flight

use crate::{utils, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Represents a file that we want to `Serialize`, `Deserialize`, and read from memory in-between
/// serializations and deserialization. Basically we are just holding the `path` and the `data`
/// here.
#[derive(Default, Debug, Clone)]
pub(super) struct File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    path: PathBuf,
    data: F,
}

impl<F> File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    /// Loads the file at `path`, or `None` when nothing has been saved there yet.
    pub(super) async fn load(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        let data: Option<F> = utils::deserialize_optional(&path).await?;
        Ok(data.map(|data| Self { path, data }))
    }

    pub(super) fn new(path: impl Into<PathBuf>, data: F) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    /// Saves the data, readable by the owner only.
    pub(super) async fn save(&self) -> Result<()> {
        let json =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize data to JSON")?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            use tokio::io::AsyncWriteExt;

            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .await
                .with_context(|| format!("Unable to open {}", self.path.display()))?;
            // `mode` only applies on creation, an existing file keeps its old bits
            file.set_permissions(Permissions::from_mode(0o600))
                .await
                .context("Failed to set file permissions")?;
            file.write_all(json.as_bytes())
                .await
                .with_context(|| format!("Unable to write to {}", self.path.display()))?;
            file.flush().await.context("Failed to flush file")?;
        }

        #[cfg(not(unix))]
        utils::write(&self.path, json).await?;

        Ok(())
    }

    pub(super) fn into_data(self) -> F {
        self.data
    }

    /// Deletes whatever is stored at `path`.
    pub(super) async fn delete(path: &Path) -> Result<()> {
        utils::remove(path).await
    }
}

/// How we save the token that comes back in the callback fragment.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct TokenFile {
    pub(super) access_token: String,
    pub(super) expires_at: DateTime<Utc>,
}

/// The pending CSRF state, written when the authorization URL is built.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct OAuthStateFile {
    pub(super) state: String,
    pub(super) created_at: DateTime<Utc>,
}
