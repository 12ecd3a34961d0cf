//! # Atomic Commit Subsystem
//!
//! Sharded atomic commit on top of per-phase uniform consensus. A
//! transaction touches one shard (deposit, intra-shard transfer) or two
//! (cross-shard transfer); every touched shard decides a prepare vote, the
//! votes are exchanged between shards and each shard then decides the
//! accept outcome.
//!
//! ## Module Structure
//!
//! ```text
//! sc-03-atomic-commit/
//! ├── domain/
//! │   ├── store.rs   # Lock table, prepare votes, transaction log
//! │   ├── ledger.rs  # Balance fold
//! │   └── error.rs
//! ├── ports/
//! │   └── outbound.rs  # OutcomeSink (client boundary)
//! └── service/
//!     └── sbac.rs      # Phase transitions
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{fold_balances, Balances, CommitError, CommitResult, CommitStore};
pub use ports::{AllPrepared, ChannelOutcomeSink, OutcomeSink};
pub use service::SbacActor;
