//! Consensus configuration.

use crate::domain::{ConsensusError, QuorumPolicy};
use serde::{Deserialize, Serialize};

/// Tuning shared by every consensus system of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Added to the epoch timestamp each time this process leads a new epoch.
    pub epoch_increment: u64,
    /// Replies an epoch leader waits for.
    pub quorum: QuorumPolicy,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            epoch_increment: 1,
            quorum: QuorumPolicy::Majority,
        }
    }
}

impl ConsensusConfig {
    /// Reject settings that would stall epoch change.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.epoch_increment == 0 {
            return Err(ConsensusError::InvalidConfig(
                "epoch_increment must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_majority() {
        let config = ConsensusConfig::default();
        assert_eq!(config.quorum, QuorumPolicy::Majority);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_increment_rejected() {
        let config = ConsensusConfig {
            epoch_increment: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConsensusError::InvalidConfig(_))));
    }
}
