use crate::commands::Out;
use crate::store::RecordStore;
use crate::{server, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::info;

/// Runs the HTTP API on localhost until the process is stopped.
pub async fn serve(store: RecordStore, port: u16) -> Result<Out<()>> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    info!("Authorization state: {}", store.auth_state().await);
    server::serve(Arc::new(store), addr).await?;
    Ok("The server has stopped".into())
}
