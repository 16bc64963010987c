//! Configuration file handling for the kamling ledger.
//!
//! The configuration file is stored at `$KAMLING_HOME/config.json` and contains the Google Sheet
//! URL, the public API key used for reads, the OAuth client id used for writes, and a few knobs
//! for how the ledger talks to the sheet.

use crate::db::LocalCache;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "kamling";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const TOKEN_JSON: &str = "token.json";
const OAUTH_STATE_JSON: &str = "oauth_state.json";
const CONFIG_JSON: &str = "config.json";
const KAMLING_SQLITE: &str = "kamling.sqlite";

pub(crate) const DEFAULT_API_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3001";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PORT: u16 = 3001;

/// Which rows `RecordStore::get_transactions_for_owner` returns.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerScope {
    /// Every transaction in the sheet, whoever filed it.
    #[default]
    All,
    /// Only the transactions whose phone matches the owner.
    Owner,
}

serde_plain::derive_display_from_serialize!(OwnerScope);
serde_plain::derive_fromstr_from_deserialize!(OwnerScope);

/// The values `kamling init` writes into a fresh `config.json`.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Settings {
    pub sheet_url: String,
    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub owner_scope: OwnerScope,
}

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$KAMLING_HOME` and from there it loads `$KAMLING_HOME/config.json`. It provides
/// paths to the secret files and owns the opened local cache.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    cache: LocalCache,
    spreadsheet_id: String,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its `.secrets` subdirectory, an initial `config.json` built
    /// from `settings`, and the SQLite cache.
    ///
    /// # Errors
    /// - Returns an error if the sheet URL cannot be parsed or any file operation fails.
    pub async fn create(dir: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the kamling home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;

        let spreadsheet_id = extract_spreadsheet_id(&settings.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile {
            sheet_url: settings.sheet_url,
            api_key: settings.api_key,
            client_id: settings.client_id,
            redirect_uri: settings.redirect_uri,
            owner_scope: settings.owner_scope,
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(KAMLING_SQLITE);
        let cache = LocalCache::open(&sqlite_path)
            .await
            .context("Unable to create SQLite cache")?;

        Ok(Self {
            root,
            secrets: secrets_dir,
            config_path,
            config_file,
            cache,
            spreadsheet_id,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that `kamling_home` and its config file exist
    /// - load the config file
    /// - validate that the secrets directory exists
    /// - open the local cache, migrating it if needed
    pub async fn load(kamling_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = kamling_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Kamling home is missing, run 'kamling init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let secrets = root.join(SECRETS);
        if !secrets.is_dir() {
            bail!("The secrets directory is missing '{}'", secrets.display())
        }

        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let sqlite_path = root.join(KAMLING_SQLITE);
        let cache = LocalCache::open(&sqlite_path)
            .await
            .context("Unable to open SQLite cache")?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            cache,
            spreadsheet_id,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub(crate) fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    /// The spreadsheet id extracted from the sheet URL. Empty when no URL was configured.
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.config_file.api_key.as_deref())
    }

    pub fn client_id(&self) -> Option<&str> {
        non_empty(self.config_file.client_id.as_deref())
    }

    pub fn redirect_uri(&self) -> &str {
        non_empty(self.config_file.redirect_uri.as_deref()).unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn api_base_url(&self) -> &str {
        non_empty(self.config_file.api_base_url.as_deref()).unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn owner_scope(&self) -> OwnerScope {
        self.config_file.owner_scope
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs)
    }

    pub fn port(&self) -> u16 {
        self.config_file.port
    }

    pub fn token_path(&self) -> PathBuf {
        self.secrets.join(TOKEN_JSON)
    }

    pub fn oauth_state_path(&self) -> PathBuf {
        self.secrets.join(OAUTH_STATE_JSON)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "kamling",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/1MbjeDkD51X0fmr8D_pXvK28mpUq9MQ3IITnQtljTgYM",
///   "api_key": "AIza...",
///   "client_id": "1234.apps.googleusercontent.com",
///   "redirect_uri": "http://localhost:3001",
///   "owner_scope": "all",
///   "request_timeout_secs": 10,
///   "port": 3001
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "kamling"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// URL to the Google Sheet that mirrors the ledger
    sheet_url: String,

    /// Public API key, used for reads when no OAuth token is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,

    /// OAuth client id. Without it the ledger never writes to the sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,

    /// Where the OAuth consent screen sends the browser back to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<String>,

    /// Overrides the Google Sheets REST endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_base_url: Option<String>,

    #[serde(default)]
    owner_scope: OwnerScope,

    #[serde(default = "default_timeout_secs")]
    request_timeout_secs: u64,

    #[serde(default = "default_port")]
    port: u16,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            api_key: None,
            client_id: None,
            redirect_uri: None,
            api_base_url: None,
            owner_scope: OwnerScope::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            port: DEFAULT_PORT,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or names another application
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID or an error if the URL format is invalid. Returns an empty string if the URL is empty.
fn extract_spreadsheet_id(url: &str) -> Result<&str> {
    if url.is_empty() {
        return Ok(url);
    }

    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split(['?', '#'])
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    Err(anyhow::anyhow!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    ))
}
