//! The persistence layer of the kamling ledger: users and their contributions kept in a shared
//! Google sheet, mirrored into a local SQLite cache.

pub mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
pub mod server;
mod store;
mod utils;

#[cfg(test)]
mod test;

pub use api::{AuthFlow, AuthState, Mode, Sheet, TokenStore};
pub use config::{Config, OwnerScope, Settings};
pub use db::LocalCache;
pub use error::{Error, Result, SheetResult, SyncError};
pub use store::RecordStore;
