//! Uniform consensus.
//!
//! Chains epoch consensus instances: when epoch change reports a newer
//! epoch, the running instance is aborted and its state is carried into a
//! fresh instance for the new timestamp. The first instance to decide fixes
//! the outcome; anything after that is ignored.
//!
//! The first instance is keyed by the rank of the leader trusted at proposal
//! time, so processes that disagree about the initial leader never share an
//! instance. Every instance remembers its leader and only the local process
//! leading it starts the read round.

use shared_types::{EpochState, ProcessId, Value};

/// What the caller must do after a uniform-consensus input.
#[derive(Debug, Clone, PartialEq)]
pub enum UcAction {
    /// Create the epoch consensus instance `ets` led by `leader`, starting
    /// from `state`.
    SpawnEpoch {
        /// Epoch timestamp.
        ets: u64,
        /// Leader that installed the epoch, if any is known.
        leader: Option<ProcessId>,
        /// Starting state.
        state: EpochState,
    },
    /// Tell instance `ets` to start its read round (leader only).
    ProposeEpoch {
        /// Epoch timestamp.
        ets: u64,
    },
    /// Supersede instance `ets`.
    AbortEpoch {
        /// Epoch timestamp.
        ets: u64,
    },
    /// Instance `ets` handed over its state and can be stopped.
    RetireEpoch {
        /// Epoch timestamp.
        ets: u64,
    },
    /// The system decided.
    Decide(Value),
}

/// Uniform consensus state of one system at one process.
#[derive(Debug, Clone)]
pub struct UniformConsensus {
    local: ProcessId,
    ets: u64,
    leader: Option<ProcessId>,
    new_ts: u64,
    new_leader: Option<ProcessId>,
    started: bool,
    proposed: bool,
    decided: bool,
}

impl UniformConsensus {
    /// Fresh, not yet proposed, running at `local`.
    pub fn new(local: ProcessId) -> Self {
        Self {
            local,
            ets: 0,
            leader: None,
            new_ts: 0,
            new_leader: None,
            started: false,
            proposed: false,
            decided: false,
        }
    }

    /// Timestamp of the running epoch.
    pub fn ets(&self) -> u64 {
        self.ets
    }

    /// Leader of the running epoch.
    pub fn leader(&self) -> Option<&ProcessId> {
        self.leader.as_ref()
    }

    /// Whether a value was decided.
    pub fn is_decided(&self) -> bool {
        self.decided
    }

    fn spawn_current(&mut self, state: EpochState) -> Vec<UcAction> {
        let mut actions = vec![UcAction::SpawnEpoch {
            ets: self.ets,
            leader: self.leader.clone(),
            state,
        }];
        if self.leader.as_ref() == Some(&self.local) {
            self.proposed = true;
            actions.push(UcAction::ProposeEpoch { ets: self.ets });
        }
        actions
    }

    /// Propose the local vote while trusting `trusted`.
    ///
    /// The first instance starts at the newest epoch already announced, so
    /// an epoch accepted before the proposal arrives is not lost. Without
    /// one it starts at the rank of `trusted`.
    pub fn propose(&mut self, value: Value, trusted: Option<ProcessId>) -> Vec<UcAction> {
        if self.started || self.decided {
            return Vec::new();
        }
        self.started = true;
        if self.new_leader.is_some() {
            self.ets = self.new_ts;
            self.leader = self.new_leader.clone();
        } else {
            self.ets = trusted.as_ref().map_or(0, |p| u64::from(p.rank));
            self.leader = trusted;
            self.new_ts = self.ets;
        }
        self.spawn_current(EpochState::new(0, value))
    }

    /// Epoch change accepted `timestamp` announced by `leader`.
    pub fn on_start_epoch(&mut self, timestamp: u64, leader: ProcessId) -> Vec<UcAction> {
        if self.decided || timestamp <= self.new_ts.max(self.ets) {
            return Vec::new();
        }
        self.new_ts = timestamp;
        self.new_leader = Some(leader);
        if !self.started {
            return Vec::new();
        }
        vec![UcAction::AbortEpoch { ets: self.ets }]
    }

    /// Instance `epoch` aborted with `state`.
    pub fn on_aborted(&mut self, epoch: u64, state: EpochState) -> Vec<UcAction> {
        if self.decided || epoch != self.ets || self.new_ts <= self.ets {
            return Vec::new();
        }
        let old = self.ets;
        self.ets = self.new_ts;
        self.leader = self.new_leader.clone();
        self.proposed = false;
        let mut actions = vec![UcAction::RetireEpoch { ets: old }];
        actions.extend(self.spawn_current(state));
        actions
    }

    /// Instance `epoch` decided `value`.
    pub fn on_ep_decide(&mut self, epoch: u64, value: Value) -> Vec<UcAction> {
        if self.decided || epoch != self.ets {
            return Vec::new();
        }
        self.decided = true;
        vec![UcAction::Decide(value)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::epoch_timestamp;
    use shared_types::{Phase, Transaction, TransactionAction};

    fn member(rank: u32) -> ProcessId {
        ProcessId::new("127.0.0.1", 5000 + rank as u16, "x", rank).with_rank(rank)
    }

    fn value() -> Value {
        Value::for_phase(
            Phase::Prepare,
            TransactionAction::Commit,
            Transaction::deposit("alice", 5, "x").with_id("t1"),
        )
    }

    #[test]
    fn test_leader_proposes_first_epoch_at_its_rank() {
        let mut uc = UniformConsensus::new(member(3));
        let v = value();
        assert_eq!(
            uc.propose(v.clone(), Some(member(3))),
            vec![
                UcAction::SpawnEpoch {
                    ets: 3,
                    leader: Some(member(3)),
                    state: EpochState::new(0, v.clone())
                },
                UcAction::ProposeEpoch { ets: 3 }
            ]
        );
        assert_eq!(uc.leader(), Some(&member(3)));
        assert!(uc.propose(v, Some(member(3))).is_empty());
    }

    #[test]
    fn test_follower_only_spawns() {
        let mut uc = UniformConsensus::new(member(1));
        let actions = uc.propose(value(), Some(member(3)));
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            UcAction::SpawnEpoch { ets: 3, leader: Some(l), .. } if *l == member(3)
        ));
    }

    #[test]
    fn test_disagreeing_leaders_get_distinct_first_epochs() {
        let mut a = UniformConsensus::new(member(1));
        let mut b = UniformConsensus::new(member(2));
        a.propose(value(), Some(member(3)));
        b.propose(value(), Some(member(2)));
        assert_ne!(a.ets(), b.ets());
    }

    #[test]
    fn test_no_leader_known_spawns_leaderless_epoch() {
        let mut uc = UniformConsensus::new(member(1));
        let actions = uc.propose(value(), None);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], UcAction::SpawnEpoch { ets: 0, leader: None, .. }));
    }

    #[test]
    fn test_epoch_hand_over() {
        let mut uc = UniformConsensus::new(member(2));
        uc.propose(value(), Some(member(3)));

        let next = epoch_timestamp(1, 2);
        assert_eq!(uc.on_start_epoch(next, member(2)), vec![UcAction::AbortEpoch { ets: 3 }]);
        // Stale or repeated announcements are ignored.
        assert!(uc.on_start_epoch(next, member(2)).is_empty());
        assert!(uc.on_start_epoch(2, member(2)).is_empty());

        let carried = EpochState::new(0, value());
        let actions = uc.on_aborted(3, carried.clone());
        assert_eq!(
            actions,
            vec![
                UcAction::RetireEpoch { ets: 3 },
                UcAction::SpawnEpoch {
                    ets: next,
                    leader: Some(member(2)),
                    state: carried
                },
                UcAction::ProposeEpoch { ets: next }
            ]
        );
        assert_eq!(uc.ets(), next);
    }

    #[test]
    fn test_hand_over_to_remote_leader_does_not_propose() {
        let mut uc = UniformConsensus::new(member(1));
        uc.propose(value(), Some(member(3)));
        let next = epoch_timestamp(1, 2);
        uc.on_start_epoch(next, member(2));
        let actions = uc.on_aborted(3, EpochState::empty());
        assert!(!actions.iter().any(|a| matches!(a, UcAction::ProposeEpoch { .. })));
        assert_eq!(uc.leader(), Some(&member(2)));
    }

    #[test]
    fn test_abort_of_other_epoch_ignored() {
        let mut uc = UniformConsensus::new(member(1));
        uc.propose(value(), Some(member(3)));
        uc.on_start_epoch(epoch_timestamp(1, 3), member(3));
        assert!(uc.on_aborted(7, EpochState::empty()).is_empty());
        assert_eq!(uc.ets(), 3);
    }

    #[test]
    fn test_start_epoch_before_proposal() {
        let mut uc = UniformConsensus::new(member(1));
        let announced = epoch_timestamp(1, 2);
        assert!(uc.on_start_epoch(announced, member(2)).is_empty());
        let actions = uc.propose(value(), Some(member(3)));
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            UcAction::SpawnEpoch { ets, leader: Some(l), .. } if *ets == announced && *l == member(2)
        ));
    }

    #[test]
    fn test_single_decision() {
        let mut uc = UniformConsensus::new(member(3));
        uc.propose(value(), Some(member(3)));
        let v = value();
        assert_eq!(uc.on_ep_decide(3, v.clone()), vec![UcAction::Decide(v.clone())]);
        assert!(uc.is_decided());
        assert!(uc.on_ep_decide(3, v).is_empty());
        assert!(uc.on_start_epoch(epoch_timestamp(1, 3), member(3)).is_empty());
    }

    #[test]
    fn test_decision_from_stale_epoch_ignored() {
        let mut uc = UniformConsensus::new(member(1));
        uc.propose(value(), Some(member(3)));
        uc.on_start_epoch(epoch_timestamp(1, 2), member(2));
        uc.on_aborted(3, EpochState::empty());
        assert!(uc.on_ep_decide(3, value()).is_empty());
        assert!(!uc.is_decided());
    }
}
