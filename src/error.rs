pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The result type returned by every remote sheet operation.
pub type SheetResult<T> = std::result::Result<T, SyncError>;

/// The kinds of failure the remote sheet layer reports. The sheet gateway and the auth flow
/// never swallow these; only `RecordStore` decides which of them turn into a fallback.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// A required setting, such as the OAuth client id or the spreadsheet id, is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote store answered 401 or 403.
    #[error("The sheet requires authorization (HTTP {status})")]
    AuthRequired { status: u16 },

    /// The schema guard could not find the named sheet.
    #[error("Sheet '{0}' does not exist in the spreadsheet")]
    SheetNotFound(String),

    /// The remote store answered 400, usually for a bad range.
    #[error("The sheet rejected the request: {message}")]
    MalformedRequest { message: String },

    /// Network failure, timeout, 5xx or any other unexpected answer.
    #[error("The sheet is unavailable: {0}")]
    RemoteUnavailable(String),
}

impl SyncError {
    /// Classifies a non-success HTTP status from the sheets API.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => SyncError::AuthRequired { status },
            400 => SyncError::MalformedRequest {
                message: server_message(body),
            },
            _ => SyncError::RemoteUnavailable(format!("HTTP {status}: {}", server_message(body))),
        }
    }
}

/// Pulls `error.message` out of a Google API error body, falling back to the raw body.
fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
