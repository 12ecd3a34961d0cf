//! Error types for the consensus subsystem.

use shared_bus::BrokerError;

/// Consensus error types
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// The system already decided and was retired.
    #[error("Consensus system {0} already decided")]
    Decided(String),

    /// The system is already running.
    #[error("Consensus system {0} is already open")]
    AlreadyOpen(String),

    /// Unparseable quorum policy name.
    #[error("Unknown quorum policy: {0}")]
    UnknownQuorum(String),

    /// Configuration rejected by validation.
    #[error("Invalid consensus configuration: {0}")]
    InvalidConfig(String),

    /// Subscribing an actor failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
