//! Implements the `Sheet` trait over the Google Sheets REST API (v4) using `reqwest`.

use crate::api::{BearerToken, Credential, Sheet, SpreadsheetMetadata};
use crate::error::{SheetResult, SyncError};
use crate::Result;
use anyhow::Context;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;
use url::Url;

const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// Talks to one spreadsheet. Holds no credentials: every call is authorized by the caller, and
/// every call is a single attempt bounded by the request timeout.
#[derive(Debug, Clone)]
pub struct GoogleSheet {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    timeout: Duration,
}

impl GoogleSheet {
    /// # Errors
    /// - `SyncError::Configuration` when `spreadsheet_id` is empty.
    /// - An error when `base_url` does not parse or the HTTP client cannot be built.
    pub fn new(base_url: &str, spreadsheet_id: &str, timeout: Duration) -> Result<Self> {
        if spreadsheet_id.trim().is_empty() {
            return Err(SyncError::Configuration(
                "The spreadsheet id is not configured, set 'sheet_url' in config.json".to_string(),
            )
            .into());
        }
        let base_url = Url::parse(base_url)
            .with_context(|| format!("The sheets API base URL '{base_url}' is not valid"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("The sheets API base URL '{base_url}' cannot be a base URL");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            timeout,
        })
    }

    /// `{base}/{spreadsheetId}` followed by `segments`, each percent-encoded as a single segment.
    fn url(&self, segments: &[&str]) -> SheetResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                SyncError::Configuration(format!("Cannot build a URL from {}", self.base_url))
            })?;
            path.pop_if_empty().push(&self.spreadsheet_id);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn values_url(&self, range: &str, action: Option<&str>) -> SheetResult<Url> {
        match action {
            Some(action) => self.url(&["values", &format!("{range}:{action}")]),
            None => self.url(&["values", range]),
        }
    }

    async fn send(&self, request: RequestBuilder) -> SheetResult<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        trace!("HTTP {status}: {body}");
        Err(SyncError::from_status(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SheetResult<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                SyncError::RemoteUnavailable(format!("Unexpected response from the sheets API: {e}"))
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::RemoteUnavailable(format!("No answer within {:?}", self.timeout))
        } else {
            SyncError::RemoteUnavailable(e.to_string())
        }
    }
}

/// Attaches `credential` as either the `key` query parameter or a bearer header.
fn authorize(
    mut url: Url,
    client: &Client,
    method: reqwest::Method,
    credential: &Credential,
) -> RequestBuilder {
    match credential {
        Credential::ApiKey(key) => {
            url.query_pairs_mut().append_pair("key", key);
            client.request(method, url)
        }
        Credential::Bearer(token) => client.request(method, url).bearer_auth(token.secret()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct ValuesBody<'a> {
    values: &'a [Vec<String>],
}

/// Formatted values come back as strings, but anything else is rendered as text.
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn read(&self, range: &str, credential: &Credential) -> SheetResult<Vec<Vec<String>>> {
        trace!("read {range}");
        let url = self.values_url(range, None)?;
        let request = authorize(url, &self.client, reqwest::Method::GET, credential);
        let value_range: ValueRange = self.send_json(request).await?;
        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn append(
        &self,
        range: &str,
        rows: &[Vec<String>],
        token: &BearerToken,
    ) -> SheetResult<()> {
        trace!("append {} rows to {range}", rows.len());
        let mut url = self.values_url(range, Some("append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION);
        let request = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(&ValuesBody { values: rows });
        self.send(request).await?;
        Ok(())
    }

    async fn update(
        &self,
        range: &str,
        rows: &[Vec<String>],
        token: &BearerToken,
    ) -> SheetResult<()> {
        trace!("update {range}");
        let mut url = self.values_url(range, None)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION);
        let request = self
            .client
            .put(url)
            .bearer_auth(token.secret())
            .json(&ValuesBody { values: rows });
        self.send(request).await?;
        Ok(())
    }

    async fn clear(&self, range: &str, token: &BearerToken) -> SheetResult<()> {
        trace!("clear {range}");
        let url = self.values_url(range, Some("clear"))?;
        let request = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(&serde_json::json!({}));
        self.send(request).await?;
        Ok(())
    }

    async fn metadata(&self, credential: &Credential) -> SheetResult<SpreadsheetMetadata> {
        trace!("metadata for {}", self.spreadsheet_id);
        let url = self.url(&[])?;
        let request = authorize(url, &self.client, reqwest::Method::GET, credential);
        self.send_json(request).await
    }
}
