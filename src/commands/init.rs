use crate::commands::Out;
use crate::config::Settings;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its `.secrets` subdirectory, the local cache and an initial
/// `config.json` built from `settings`.
///
/// # Arguments
/// - `kamling_home` - The directory that will be the root of data directory, e.g. `$HOME/kamling`
/// - `settings` - The sheet URL, the optional API key and OAuth client id, and the owner scope.
///
/// # Errors
/// - Returns an error if the sheet URL has no spreadsheet id or any file operation fails.
pub async fn init(kamling_home: &Path, settings: Settings) -> Result<Out<()>> {
    let config = Config::create(kamling_home, settings)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Created the kamling directory at {} for spreadsheet {}",
        config.root().display(),
        config.spreadsheet_id()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OwnerScope;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("kamling");
        let settings = Settings {
            sheet_url: "https://docs.google.com/spreadsheets/d/abc123XYZ/edit#gid=0".to_string(),
            api_key: Some("AIza-test".to_string()),
            owner_scope: OwnerScope::Owner,
            ..Settings::default()
        };
        let out = init(&home, settings).await.unwrap();
        assert!(out.message().contains("abc123XYZ"));

        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.spreadsheet_id(), "abc123XYZ");
        assert_eq!(config.api_key(), Some("AIza-test"));
        assert_eq!(config.owner_scope(), OwnerScope::Owner);
    }

    #[tokio::test]
    async fn test_init_rejects_bad_url() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            sheet_url: "https://example.com/not-a-sheet".to_string(),
            ..Settings::default()
        };
        assert!(init(&dir.path().join("kamling"), settings).await.is_err());
    }
}
