//! The remote side of the ledger: the `Sheet` trait that every sheet gateway implements, the
//! Google implementation of it, an in-memory implementation for tests and offline runs, and the
//! OAuth plumbing that supplies write credentials.

mod files;
mod oauth;
mod schema;
mod sheet;
mod sheet_test_client;
mod token;

use crate::error::SheetResult;
use crate::{Config, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use tracing::debug;

pub use oauth::{AuthFlow, AuthState};
pub use schema::{
    SheetEntry, SheetProperties, SheetSchemaGuard, SpreadsheetMetadata, SpreadsheetProperties,
};
pub use sheet::GoogleSheet;
pub use sheet_test_client::{TestSheet, TestSheetCalls};
pub use token::{AccessToken, TokenStore};

/// The sheet that holds one row per user.
pub const USERS: &str = "Users";

/// The sheet that holds one row per transaction.
pub const TRANSACTIONS: &str = "Transactions";

/// Every user column.
pub const USERS_RANGE: &str = "Users!A:C";

/// Every transaction column.
pub const TRANSACTIONS_RANGE: &str = "Transactions!A:G";

/// The header row of the transactions sheet.
pub const TRANSACTIONS_FIRST_ROW: &str = "Transactions!A1:G1";

/// Where user rows are appended. The API finds the table that starts at this cell.
pub const USERS_APPEND_RANGE: &str = "Users!A1";

/// Where transaction rows are appended.
pub const TRANSACTIONS_APPEND_RANGE: &str = "Transactions!A1";

/// Scopes requested by the implicit-grant authorization URL.
pub(crate) const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

/// Google's OAuth 2.0 authorization endpoint.
pub(crate) const AUTHORIZATION_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// A short-lived OAuth access token. Writes only accept this type, which keeps the API key out
/// of every write request.
#[derive(Clone, Eq, PartialEq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl Debug for BearerToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(****)")
    }
}

/// How a read request is authorized: the public API key as a `key` query parameter, or an OAuth
/// bearer token as a header. Never both.
#[derive(Clone, Eq, PartialEq)]
pub enum Credential {
    ApiKey(String),
    Bearer(BearerToken),
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(****)"),
            Credential::Bearer(_) => f.write_str("Credential::Bearer(****)"),
        }
    }
}

/// A gateway to one spreadsheet. Every method is a single attempt: no retries, no fallback, and
/// failures come back as a distinguished `SyncError` kind.
#[async_trait::async_trait]
pub trait Sheet: Send + Sync {
    /// Reads the rows of `range`, e.g. `Transactions!A:G`. Empty trailing cells are omitted by
    /// the remote, so rows may be shorter than the range.
    async fn read(&self, range: &str, credential: &Credential) -> SheetResult<Vec<Vec<String>>>;

    /// Appends `rows` after the last row of the table found in `range`.
    async fn append(&self, range: &str, rows: &[Vec<String>], token: &BearerToken)
        -> SheetResult<()>;

    /// Overwrites the cells of `range` with `rows`.
    async fn update(&self, range: &str, rows: &[Vec<String>], token: &BearerToken)
        -> SheetResult<()>;

    /// Clears the values in `range`.
    async fn clear(&self, range: &str, token: &BearerToken) -> SheetResult<()>;

    /// Fetches the spreadsheet title and the list of sheets it contains.
    async fn metadata(&self, credential: &Credential) -> SheetResult<SpreadsheetMetadata>;
}

/// Which `Sheet` implementation the app runs against.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The real Google Sheets API.
    #[default]
    Google,
    /// The seeded in-memory `TestSheet`.
    Test,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

const TEST_MODE_ENV: &str = "KAMLING_IN_TEST_MODE";

impl Mode {
    /// `Mode::Test` when `KAMLING_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// Constructs the `Sheet` implementation for `mode`.
pub fn sheet(config: &Config, mode: Mode) -> Result<Box<dyn Sheet>> {
    debug!("Using the {mode} sheet gateway");
    Ok(match mode {
        Mode::Google => Box::new(GoogleSheet::new(
            config.api_base_url(),
            config.spreadsheet_id(),
            config.request_timeout(),
        )?),
        Mode::Test => Box::new(TestSheet::default()),
    })
}

/// The sheet name part of an A1 range such as `Users!A:C`.
pub(crate) fn sheet_name(range: &str) -> &str {
    range
        .split_once('!')
        .map(|(name, _)| name)
        .unwrap_or(range)
        .trim_matches('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name() {
        assert_eq!(sheet_name("Users!A:C"), "Users");
        assert_eq!(sheet_name("'Kas Bulanan'!A1:G"), "Kas Bulanan");
        assert_eq!(sheet_name("Transactions"), "Transactions");
    }

    #[test]
    fn test_credentials_do_not_leak_in_debug() {
        let c = Credential::Bearer(BearerToken::new("ya29.secret"));
        assert!(!format!("{c:?}").contains("secret"));
        let c = Credential::ApiKey("AIza-secret".to_string());
        assert!(!format!("{c:?}").contains("secret"));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Test.to_string(), "test");
        assert_eq!("google".parse::<Mode>().unwrap(), Mode::Google);
    }
}
