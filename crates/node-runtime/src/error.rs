//! Runtime error type.

use crate::container::ConfigError;
use sc_03_atomic_commit::CommitError;
use shared_bus::{BrokerError, TransportError};
use shared_types::{CodecError, RegistryError};
use thiserror::Error;

/// Errors raised while starting or driving a node.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registration or membership failure.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// An actor could not be subscribed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The commit actor could not start.
    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    /// An inbound frame could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// An outbound send failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No known process owns a shard of the transaction.
    #[error("No process serves the shards of transaction {tx}")]
    Unroutable {
        /// Transaction id.
        tx: String,
    },

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
