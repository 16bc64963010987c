//! Authorization commands for the implicit OAuth flow.
//!
//! - `kamling auth url` - Prints the consent URL and records the pending state
//! - `kamling auth callback <fragment>` - Stores the token from the redirect fragment
//! - `kamling auth status` - Reports the current `AuthState`
//! - `kamling auth logout` - Forgets the stored token

use crate::api::{AuthFlow, AuthState};
use crate::commands::Out;
use crate::Result;
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What `kamling auth status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Builds the consent URL. The user opens it in a browser, and Google redirects to the configured
/// redirect URI with the token in the URL fragment.
///
/// # Errors
/// Returns an error if no OAuth client id is configured.
pub async fn auth_url(auth: &AuthFlow) -> Result<Out<String>> {
    let url = auth.build_authorization_url().await?;
    Ok(Out::new(
        format!("Open this URL in your browser to authorize kamling:\n\n{url}\n"),
        url.to_string(),
    ))
}

/// Processes the fragment (or the whole redirect URL) that Google sent back.
///
/// # Errors
/// Returns an error if the state does not match the pending one or no token is present.
pub async fn auth_callback(auth: &AuthFlow, fragment: &str) -> Result<Out<()>> {
    if !auth.process_callback(fragment).await? {
        bail!("The authorization callback was rejected, run 'kamling auth url' again");
    }
    Ok("Authorized, writes will now reach the sheet".into())
}

pub async fn auth_status(auth: &AuthFlow) -> Result<Out<AuthStatus>> {
    let state = auth.state().await;
    let expires_at = auth.tokens().get().await?.map(|t| t.expires_at());
    let message = match expires_at {
        Some(at) => format!("Authorization state: {state} (token expires at {at})"),
        None => format!("Authorization state: {state}"),
    };
    Ok(Out::new(message, AuthStatus { state, expires_at }))
}

pub async fn auth_logout(auth: &AuthFlow) -> Result<Out<()>> {
    auth.logout().await?;
    Ok("Logged out, the stored token has been removed".into())
}
