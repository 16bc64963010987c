//! Checks that a named sheet exists before anything reads from or appends to it. The sheets API
//! answers a missing sheet with the same 400 it uses for a malformed range, so the guard looks
//! at the spreadsheet metadata instead.

use crate::api::{Credential, Sheet};
use crate::error::{SheetResult, SyncError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The subset of the spreadsheet resource the guard needs.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpreadsheetMetadata {
    #[serde(default)]
    pub properties: SpreadsheetProperties,
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SheetEntry {
    #[serde(default)]
    pub properties: SheetProperties,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sheet_id: i64,
}

impl SpreadsheetMetadata {
    pub fn new(title: impl Into<String>, sheet_titles: &[&str]) -> Self {
        Self {
            properties: SpreadsheetProperties {
                title: title.into(),
            },
            sheets: sheet_titles
                .iter()
                .enumerate()
                .map(|(i, t)| SheetEntry {
                    properties: SheetProperties {
                        title: t.to_string(),
                        sheet_id: i as i64,
                    },
                })
                .collect(),
        }
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.properties.title == name)
    }

    pub fn sheet_titles(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.properties.title.as_str())
    }
}

/// Answers "does this sheet exist" with a single metadata fetch.
pub struct SheetSchemaGuard<'a> {
    sheet: &'a dyn Sheet,
}

impl<'a> SheetSchemaGuard<'a> {
    pub fn new(sheet: &'a dyn Sheet) -> Self {
        Self { sheet }
    }

    /// `Ok(())` when `name` is in the spreadsheet, `SheetNotFound` when it is not, and the
    /// transport error when the metadata could not be fetched.
    pub async fn check(&self, name: &str, credential: &Credential) -> SheetResult<()> {
        let metadata = self.sheet.metadata(credential).await?;
        if metadata.has_sheet(name) {
            Ok(())
        } else {
            debug!(
                "Sheet '{name}' is not one of [{}]",
                metadata.sheet_titles().collect::<Vec<_>>().join(", ")
            );
            Err(SyncError::SheetNotFound(name.to_string()))
        }
    }

    /// `true` when `name` exists. Any failure, including a transport failure, counts as absent.
    pub async fn exists(&self, name: &str, credential: &Credential) -> bool {
        match self.check(name, credential).await {
            Ok(()) => true,
            Err(SyncError::SheetNotFound(_)) => false,
            Err(e) => {
                warn!("Unable to verify that sheet '{name}' exists: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BearerToken, TestSheet, TRANSACTIONS, USERS};

    fn bearer() -> Credential {
        Credential::Bearer(BearerToken::new("t"))
    }

    #[test]
    fn test_metadata_deserialize() {
        let json = r#"{
            "spreadsheetId": "abc",
            "properties": {"title": "Kas Kamling", "locale": "id_ID"},
            "sheets": [
                {"properties": {"sheetId": 0, "title": "Users", "index": 0}},
                {"properties": {"sheetId": 1234, "title": "Transactions", "index": 1}}
            ]
        }"#;
        let m: SpreadsheetMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(m.properties.title, "Kas Kamling");
        assert_eq!(m.sheets[1].properties.sheet_id, 1234);
        assert!(m.has_sheet("Users"));
        assert!(!m.has_sheet("users"));
    }

    #[tokio::test]
    async fn test_exists() {
        let sheet = TestSheet::default();
        let guard = SheetSchemaGuard::new(&sheet);
        assert!(guard.exists(USERS, &bearer()).await);
        assert!(guard.exists(TRANSACTIONS, &bearer()).await);
        assert!(!guard.exists("Budget", &bearer()).await);
        assert_eq!(sheet.calls().metadata, 3);
    }

    #[tokio::test]
    async fn test_missing_sheet() {
        let sheet = TestSheet::default();
        sheet.remove_sheet(TRANSACTIONS);
        let guard = SheetSchemaGuard::new(&sheet);
        assert_eq!(
            guard.check(TRANSACTIONS, &bearer()).await,
            Err(SyncError::SheetNotFound(TRANSACTIONS.to_string()))
        );
    }

    #[tokio::test]
    async fn test_transport_failure_counts_as_absent() {
        let sheet = TestSheet::default();
        sheet.fail_metadata(SyncError::RemoteUnavailable("timed out".to_string()));
        let guard = SheetSchemaGuard::new(&sheet);
        assert!(!guard.exists(USERS, &bearer()).await);
        assert!(matches!(
            guard.check(USERS, &bearer()).await,
            Err(SyncError::RemoteUnavailable(_))
        ));
    }
}
