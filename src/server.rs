//! The JSON-over-HTTP surface that `kamling serve` exposes to the web front end.
//!
//! `route` maps one request to one response and holds all the behavior; `serve` only accepts
//! connections and feeds requests to it.

use crate::error::SyncError;
use crate::model::calendar::{night_of, short_date};
use crate::model::{next_transaction_id, phone_key, Transaction, TransactionType, User};
use crate::store::RecordStore;
use crate::Result;
use anyhow::Context;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS};
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Accepts connections on `addr` until the process is stopped.
pub async fn serve(store: Arc<RecordStore>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Unable to listen on {addr}"))?;
    let local = listener.local_addr().context("Unable to read the bound address")?;
    info!("Listening on http://{local}");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Unable to accept a connection")?;
        let store = store.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(store.clone(), req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection from {peer} ended with an error: {e}");
            }
        });
    }
}

async fn handle(
    store: Arc<RecordStore>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(error(StatusCode::BAD_REQUEST, format!("Unreadable body: {e}")));
        }
    };
    let response = route(&store, &method, &path, &query, &body).await;
    debug!("{method} {path} -> {}", response.status());
    Ok(response)
}

/// Answers one request.
pub async fn route(
    store: &RecordStore,
    method: &Method,
    path: &str,
    query: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    match (method, path.trim_end_matches('/')) {
        (&Method::OPTIONS, _) => finish(
            cors(Response::builder().status(StatusCode::NO_CONTENT)),
            Bytes::new(),
        ),
        (&Method::GET, "") => html(CALLBACK_PAGE),
        (&Method::GET, "/api/health") => ok(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
        })),
        (&Method::POST, "/api/users") => create_user(store, body).await,
        (&Method::GET, "/api/users") => get_users(store, params.get("phone")).await,
        (&Method::GET, "/api/transactions") => get_transactions(store, &params).await,
        (&Method::POST, "/api/transactions") => create_transaction(store, body).await,
        (&Method::GET, "/api/auth/status") => ok(json!({
            "configured": store.is_configured(),
            "authenticated": store.is_authenticated().await,
            "expired": store.is_token_expired().await,
            "state": store.auth_state().await,
        })),
        (&Method::GET, "/api/auth/url") => match store.build_authorization_url().await {
            Ok(url) => ok(json!({ "url": url.as_str() })),
            Err(e) => match e.downcast_ref::<SyncError>() {
                Some(SyncError::Configuration(message)) => {
                    error(StatusCode::BAD_REQUEST, message.clone())
                }
                _ => internal(e),
            },
        },
        (&Method::POST, "/api/auth/callback") => auth_callback(store, body).await,
        (&Method::POST, "/api/auth/logout") => match store.logout().await {
            Ok(()) => ok(json!({ "success": true })),
            Err(e) => internal(e),
        },
        _ => error(StatusCode::NOT_FOUND, format!("No route for {method} {path}")),
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

impl UserRequest {
    fn into_user(self) -> Option<User> {
        let name = self.name.filter(|s| !s.trim().is_empty())?;
        let phone = self.phone.filter(|s| !s.trim().is_empty())?;
        Some(User::new(name.trim(), phone.trim()))
    }
}

/// A transaction as the front end sends it. Missing `id`, `date`, `day` and `name` are filled in.
#[derive(Debug, Default, Deserialize)]
struct TransactionRequest {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    day: Option<String>,
    #[serde(default)]
    name: Option<String>,
    amount: u64,
    #[serde(rename = "type", default)]
    kind: TransactionType,
}

impl TransactionRequest {
    fn into_transaction(self, owner: &User) -> Transaction {
        let today = chrono::Local::now().date_naive();
        Transaction {
            id: self.id.unwrap_or_else(next_transaction_id),
            date: self.date.unwrap_or_else(|| short_date(today)),
            day: self.day.unwrap_or_else(|| night_of(today)),
            name: self.name.unwrap_or_else(|| owner.name.clone()),
            amount: self.amount,
            kind: self.kind,
            phone: Some(owner.phone.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    #[serde(default)]
    transaction: Option<TransactionRequest>,
    #[serde(default)]
    user: Option<UserRequest>,
}

#[derive(Debug, Deserialize)]
struct CallbackRequest {
    #[serde(default)]
    fragment: String,
}

async fn create_user(store: &RecordStore, body: &[u8]) -> Response<Full<Bytes>> {
    let request: UserRequest = match parse(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let Some(user) = request.into_user() else {
        return error(StatusCode::BAD_REQUEST, "Name and phone are required");
    };
    if store.initialize_user(&user).await {
        ok(json!({ "success": true, "message": "User initialized successfully" }))
    } else {
        respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "success": false, "message": "Failed to initialize user" }),
        )
    }
}

async fn get_users(store: &RecordStore, phone: Option<&String>) -> Response<Full<Bytes>> {
    let users = store.get_all_users().await;
    match phone.filter(|p| !p.trim().is_empty()) {
        None => ok(json!(users)),
        Some(phone) => {
            let key = phone_key(phone);
            match users.into_iter().find(|u| u.phone_key() == key) {
                Some(user) => ok(json!(user)),
                None => error(StatusCode::NOT_FOUND, "User not found"),
            }
        }
    }
}

async fn get_transactions(
    store: &RecordStore,
    params: &HashMap<String, String>,
) -> Response<Full<Bytes>> {
    let param = |name: &str| params.get(name).filter(|v| !v.trim().is_empty());
    let txs = match (param("phone"), param("name")) {
        (Some(phone), Some(name)) => {
            store
                .get_transactions_for_owner(&User::new(name.as_str(), phone.as_str()))
                .await
        }
        _ => store.get_all_transactions().await,
    };
    ok(json!(txs))
}

async fn create_transaction(store: &RecordStore, body: &[u8]) -> Response<Full<Bytes>> {
    let request: SaveRequest = match parse(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let owner = request.user.and_then(UserRequest::into_user);
    let (Some(tx), Some(owner)) = (request.transaction, owner) else {
        return error(StatusCode::BAD_REQUEST, "Transaction and user are required");
    };
    let tx = tx.into_transaction(&owner);
    if store.save_transaction(&tx, &owner).await {
        ok(json!({
            "success": true,
            "message": "Transaction saved successfully",
            "data": tx,
        }))
    } else {
        respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "success": false, "message": "Failed to save transaction" }),
        )
    }
}

async fn auth_callback(store: &RecordStore, body: &[u8]) -> Response<Full<Bytes>> {
    let request: CallbackRequest = match parse(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match store.process_callback(&request.fragment).await {
        Ok(success) => ok(json!({ "success": success })),
        Err(e) => internal(e),
    }
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, Response<Full<Bytes>>> {
    serde_json::from_slice(body)
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")))
}

fn cors(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
        .header(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        )
        .header(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        )
}

fn respond<T: Serialize>(status: StatusCode, body: T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    finish(
        cors(Response::builder().status(status))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json")),
        Bytes::from(bytes),
    )
}

fn finish(builder: hyper::http::response::Builder, body: Bytes) -> Response<Full<Bytes>> {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        warn!("Unable to build a response: {e}");
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn ok(body: Value) -> Response<Full<Bytes>> {
    respond(StatusCode::OK, body)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    respond(status, json!({ "error": message.into() }))
}

fn internal(e: crate::Error) -> Response<Full<Bytes>> {
    warn!("Request failed: {e:#}");
    error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn html(page: &'static str) -> Response<Full<Bytes>> {
    finish(
        cors(Response::builder().status(StatusCode::OK))
            .header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
        Bytes::from_static(page.as_bytes()),
    )
}

/// The OAuth redirect lands here. Browsers never send the fragment to the server, so the page
/// posts it back.
const CALLBACK_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>kamling</title></head>
<body>
<p id="status">Menghubungkan ke Google Sheets...</p>
<script>
  const status = document.getElementById("status");
  if (!window.location.hash) {
    status.textContent = "Tidak ada token di URL.";
  } else {
    fetch("/api/auth/callback", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ fragment: window.location.hash })
    })
      .then((r) => r.json())
      .then((r) => {
        status.textContent = r.success ? "Berhasil terhubung." : "Gagal terhubung.";
        history.replaceState(null, "", window.location.pathname);
      })
      .catch(() => { status.textContent = "Gagal terhubung."; });
  }
</script>
</body>
</html>
"#;
