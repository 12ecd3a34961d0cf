//! Commit bookkeeping: lock table, prepare votes, transaction log, ledger.

pub mod error;
pub mod ledger;
pub mod store;

pub use error::{CommitError, CommitResult};
pub use ledger::{fold_balances, Balances};
pub use store::CommitStore;
