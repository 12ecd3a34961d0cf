//! # Error Types
//!
//! Errors shared across subsystems.

use thiserror::Error;

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Deserialization failed.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Message version not supported.
    #[error("Unsupported version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u16, supported: u16 },

    /// Frame larger than the accepted maximum.
    #[error("Frame too large: {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Frame shorter than its length prefix.
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Errors raised by the membership registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another process already holds this rank.
    #[error("Rank {rank} already assigned to {holder}")]
    DuplicateRank { rank: u32, holder: String },

    /// Ranks start at 1; 0 means unregistered.
    #[error("Process {process} has no rank assigned")]
    Unranked { process: String },

    /// Registration with the bootstrap collaborator failed.
    #[error("Registration failed: {0}")]
    Registration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::FrameTooLarge { len: 10, max: 5 };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::DuplicateRank {
            rank: 2,
            holder: "x-1".into(),
        };
        assert!(err.to_string().contains("Rank 2"));
    }
}
