//! Error types for the atomic commit subsystem.

use sc_02_consensus::ConsensusError;
use shared_bus::BrokerError;

/// Atomic commit error types
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The transaction does not declare the local shard.
    #[error("Transaction {tx} does not involve shard {shard}")]
    NotInvolved {
        /// Transaction id.
        tx: String,
        /// Local shard.
        shard: String,
    },

    /// The transaction was already finalized here.
    #[error("Transaction {0} already finalized")]
    AlreadyFinalized(String),

    /// Opening a consensus system failed.
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Subscribing the commit actor failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Result type for atomic commit operations
pub type CommitResult<T> = Result<T, CommitError>;
