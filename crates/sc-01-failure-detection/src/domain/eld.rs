//! # Eventual Leader Detector
//!
//! Leader = maximum-rank member of the shard that is not suspected. A
//! change is reported only when the chosen leader differs from the last
//! one reported.

use shared_types::ProcessId;
use std::collections::HashSet;

/// Leader election state of one process.
#[derive(Debug, Clone, Default)]
pub struct LeaderDetector {
    suspected: HashSet<ProcessId>,
    leader: Option<ProcessId>,
}

impl LeaderDetector {
    /// Start with no suspicion and no leader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `peer` suspected and recompute. Returns the new leader on change.
    pub fn suspect(&mut self, peer: ProcessId, members: &[ProcessId]) -> Option<ProcessId> {
        self.suspected.insert(peer);
        self.recompute(members)
    }

    /// Clear the suspicion on `peer` and recompute.
    pub fn restore(&mut self, peer: &ProcessId, members: &[ProcessId]) -> Option<ProcessId> {
        self.suspected.remove(peer);
        self.recompute(members)
    }

    /// Pick the max-rank unsuspected member.
    ///
    /// An empty eligible set leaves the leader unknown and publishes nothing.
    pub fn recompute(&mut self, members: &[ProcessId]) -> Option<ProcessId> {
        let candidate = members
            .iter()
            .filter(|p| !self.suspected.contains(*p))
            .max_by_key(|p| p.rank)
            .cloned();

        match candidate {
            None => {
                self.leader = None;
                None
            }
            Some(candidate) if self.leader.as_ref() != Some(&candidate) => {
                self.leader = Some(candidate.clone());
                Some(candidate)
            }
            Some(_) => None,
        }
    }

    /// Last reported leader.
    pub fn leader(&self) -> Option<&ProcessId> {
        self.leader.as_ref()
    }
}
