//! Types that represent the ledger's data model: `User`, `Transaction`, and the fixed column
//! layout used to move them in and out of sheet rows.
pub mod calendar;
pub(crate) mod columns;
mod transaction;
mod user;

pub use transaction::{
    next_transaction_id, placeholder_transactions, Transaction, TransactionType,
};
pub(crate) use transaction::sort_newest_first;
pub use user::{phone_key, User};
