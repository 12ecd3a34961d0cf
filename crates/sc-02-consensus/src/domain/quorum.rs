//! How many replies an epoch leader waits for.

use super::ConsensusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quorum rule for the read and write rounds of an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuorumPolicy {
    /// More than half of the shard. Tolerates a minority of crashes.
    #[default]
    Majority,
    /// Every member of the shard. No crash tolerance.
    Unanimous,
}

impl QuorumPolicy {
    /// Replies needed out of `members`.
    pub fn threshold(self, members: usize) -> usize {
        match self {
            QuorumPolicy::Majority => members / 2 + 1,
            QuorumPolicy::Unanimous => members.max(1),
        }
    }
}

impl FromStr for QuorumPolicy {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "majority" => Ok(QuorumPolicy::Majority),
            "unanimous" | "all" => Ok(QuorumPolicy::Unanimous),
            other => Err(ConsensusError::UnknownQuorum(other.to_string())),
        }
    }
}

impl fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumPolicy::Majority => write!(f, "majority"),
            QuorumPolicy::Unanimous => write!(f, "unanimous"),
        }
    }
}
