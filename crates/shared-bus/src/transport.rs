//! # Transport Port
//!
//! Outbound point-to-point delivery. Implementations are fire-and-forget:
//! success means the frame was handed to the network, not that it arrived.

use shared_types::{Message, ProcessId};
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the destination.
    #[error("Peer unreachable: {peer}")]
    Unreachable { peer: String },

    /// The frame could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The transport was shut down.
    #[error("Transport closed")]
    Closed,
}

/// Outbound point-to-point send.
pub trait Transport: Send + Sync {
    /// Hand `message` to the network for `destination`.
    fn send(&self, destination: &ProcessId, message: &Message) -> Result<(), TransportError>;
}

/// Transport that refuses every send. Used by single-process setups where
/// only loopback delivery is expected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, destination: &ProcessId, _message: &Message) -> Result<(), TransportError> {
        Err(TransportError::Unreachable {
            peer: destination.to_string(),
        })
    }
}
