//! OAuth 2.0 implicit-grant flow for the Google Sheets API.
//!
//! This module handles:
//! - Building the authorization URL and persisting the CSRF state that goes with it
//! - Validating the callback fragment and storing the token it carries in the `TokenStore`
//! - Deriving the authorization state that every write path checks
//!
//! There is no server-side exchange: the browser comes back with the access token in the URL
//! fragment, and whatever collects the fragment hands it to `AuthFlow::process_callback`.

use crate::api::files::{File, OAuthStateFile};
use crate::api::token::{AccessToken, TokenStore};
use crate::api::{AUTHORIZATION_URL, OAUTH_SCOPES};
use crate::error::SyncError;
use crate::{Config, Result};
use anyhow::Context;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

const STATE_BYTES: usize = 32;
const DEFAULT_EXPIRES_IN: i64 = 3600;
/// Google access tokens last an hour. Anything past a day is not a real token lifetime.
const MAX_EXPIRES_IN: i64 = 24 * 3600;

/// Where the ledger stands with respect to writing to the sheet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No OAuth client id is configured, so writes are never attempted.
    Unconfigured,
    /// A client id is configured but there is no token and no authorization in flight.
    Configured,
    /// An authorization URL was handed out and its callback has not arrived yet.
    PendingCallback,
    /// A token is stored and has not expired. The only state in which writes are attempted.
    Authenticated,
    /// A token is stored but it has expired.
    Expired,
}

serde_plain::derive_display_from_serialize!(AuthState);

/// Builds authorization URLs, validates callbacks, and fronts the `TokenStore`. Construct one at
/// startup and share it.
#[derive(Debug)]
pub struct AuthFlow {
    client_id: Option<String>,
    redirect_uri: String,
    auth_url: String,
    tokens: TokenStore,
    state_path: PathBuf,
    // check-and-consume of the pending state must not interleave
    state_lock: Mutex<()>,
}

impl AuthFlow {
    pub fn new(config: &Config) -> Self {
        Self::with_parts(
            config.client_id().map(str::to_string),
            config.redirect_uri(),
            TokenStore::new(config.token_path()),
            config.oauth_state_path(),
        )
    }

    pub fn with_parts(
        client_id: Option<String>,
        redirect_uri: impl Into<String>,
        tokens: TokenStore,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client_id: client_id.filter(|id| !id.trim().is_empty()),
            redirect_uri: redirect_uri.into(),
            auth_url: AUTHORIZATION_URL.to_string(),
            tokens,
            state_path: state_path.into(),
            state_lock: Mutex::new(()),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// `true` iff an OAuth client id is configured.
    pub fn is_configured(&self) -> bool {
        self.client_id.is_some()
    }

    /// Creates a fresh CSRF state, persists it as the pending state, and returns the URL that
    /// starts an implicit-grant authorization.
    ///
    /// # Errors
    /// - `SyncError::Configuration` when no client id is configured.
    /// - An I/O error when the pending state cannot be saved.
    pub async fn build_authorization_url(&self) -> Result<Url> {
        let client_id = self.client_id.as_deref().ok_or_else(|| {
            SyncError::Configuration("The OAuth client id is not configured".to_string())
        })?;

        let state = random_state();
        let auth_url = AuthUrl::new(self.auth_url.clone())
            .context("The authorization endpoint is not a valid URL")?;
        let redirect_url = RedirectUrl::new(self.redirect_uri.clone())
            .with_context(|| format!("The redirect URI '{}' is not valid", self.redirect_uri))?;

        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);
        let pending = state.clone();
        let (url, _) = client
            .authorize_url(move || CsrfToken::new(pending))
            .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .use_implicit_flow()
            .url();

        let _guard = self.state_lock.lock().await;
        File::new(
            &self.state_path,
            OAuthStateFile {
                state,
                created_at: Utc::now(),
            },
        )
        .save()
        .await
        .context("Unable to save the pending OAuth state")?;

        debug!("Built an authorization URL for redirect {}", self.redirect_uri);
        Ok(url)
    }

    /// Validates the callback `fragment` and stores the token it carries. Accepts the fragment
    /// with or without its leading `#`, or the whole redirect URL.
    ///
    /// Returns `false` when the state is absent or does not match the pending state, or when no
    /// access token is present. The pending state is consumed either way.
    pub async fn process_callback(&self, fragment: &str) -> Result<bool> {
        let params = Callback::parse(fragment);

        let pending = {
            let _guard = self.state_lock.lock().await;
            let pending = match File::<OAuthStateFile>::load(&self.state_path).await {
                Ok(file) => file.map(|f| f.into_data().state),
                Err(e) => {
                    warn!("Unable to read the pending OAuth state: {e:#}");
                    None
                }
            };
            File::<OAuthStateFile>::delete(&self.state_path).await?;
            pending
        };

        let state_matches = match (&params.state, &pending) {
            (Some(received), Some(expected)) => received == expected,
            _ => false,
        };
        if !state_matches {
            warn!("Rejected an OAuth callback whose state does not match the pending state");
            return Ok(false);
        }

        let Some(access_token) = params.access_token else {
            warn!("Rejected an OAuth callback without an access token");
            return Ok(false);
        };

        let expires_in = params.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        if !(1..=MAX_EXPIRES_IN).contains(&expires_in) {
            warn!("Rejected an OAuth callback with expires_in={expires_in}");
            return Ok(false);
        }
        let token = self.tokens.set(access_token, expires_in).await?;
        info!("Authorized, the access token expires at {}", token.expires_at());
        Ok(true)
    }

    /// `true` when a token is stored, expired or not.
    pub async fn is_authenticated(&self) -> bool {
        match self.tokens.get().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!("Unable to read the stored token: {e:#}");
                false
            }
        }
    }

    pub async fn is_token_expired(&self) -> bool {
        self.tokens.is_expired().await
    }

    /// The stored token if it has not expired.
    pub async fn valid_token(&self) -> Option<AccessToken> {
        match self.tokens.get().await {
            Ok(Some(token)) if !token.is_expired() => Some(token),
            Ok(Some(_)) => {
                debug!("The stored access token has expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Unable to read the stored token: {e:#}");
                None
            }
        }
    }

    /// Forgets the token and any pending CSRF state.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        self.tokens.clear().await?;
        File::<OAuthStateFile>::delete(&self.state_path).await?;
        info!("Logged out");
        Ok(())
    }

    pub async fn state(&self) -> AuthState {
        if !self.is_configured() {
            return AuthState::Unconfigured;
        }
        if let Ok(Some(token)) = self.tokens.get().await {
            return if token.is_expired() {
                AuthState::Expired
            } else {
                AuthState::Authenticated
            };
        }
        match File::<OAuthStateFile>::load(&self.state_path).await {
            Ok(Some(_)) => AuthState::PendingCallback,
            _ => AuthState::Configured,
        }
    }
}

/// Hex encoding of `STATE_BYTES` random bytes.
fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes);
    bytes.iter().fold(String::with_capacity(STATE_BYTES * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// The parameters of an implicit-grant callback fragment.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
struct Callback {
    access_token: Option<String>,
    expires_in: Option<i64>,
    state: Option<String>,
}

impl Callback {
    fn parse(input: &str) -> Self {
        let input = input.trim();
        let fragment = match input.split_once('#') {
            Some((_, fragment)) => fragment,
            None => input.trim_start_matches('?'),
        };
        let mut callback = Callback::default();
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "access_token" => callback.access_token = Some(value.into_owned()),
                "expires_in" => callback.expires_in = value.parse().ok(),
                "state" => callback.state = Some(value.into_owned()),
                _ => {}
            }
        }
        callback
    }
}
