//! Epoch consensus.
//!
//! One abortable instance per epoch timestamp. The epoch leader reads the
//! state of a quorum, writes the merged value to a quorum, then announces
//! the decision. Replicas answer reads with their state and adopt written
//! values. Once aborted an instance ignores every further input.
//!
//! `Read`, `Write` and `Decided` are only taken from the leader that
//! installed the epoch. Epoch timestamps are unique per leader (see
//! [`super::epoch_timestamp`]), and a second process claiming the same
//! epoch is dropped, so one replica never accepts two writes in one epoch.
//!
//! ## Write Stamps
//!
//! A value written by instance `ets` is stamped `ets + 1`. Initial votes
//! carry stamp `0`, so a value written in the very first epoch (ets `0`)
//! still outranks every unwritten vote.
//!
//! ## Merge Rule
//!
//! 1. If any collected state holds a written value (`value_timestamp > 0`),
//!    the value with the highest stamp wins.
//! 2. Otherwise the leader's own value is the template and its action is
//!    `Abort` if any replica has no value, a value of another phase or
//!    transaction, or an `Abort` vote; `Commit` otherwise.

use super::QuorumPolicy;
use shared_types::{EpochState, ProcessId, TransactionAction, Value};
use std::collections::{BTreeMap, BTreeSet};

/// What the caller must do after an epoch-consensus input.
#[derive(Debug, Clone, PartialEq)]
pub enum EpAction {
    /// Send `Read` to every shard member.
    BroadcastRead,
    /// Answer a read.
    SendState {
        /// The reader.
        to: ProcessId,
        /// Local state.
        state: EpochState,
    },
    /// Send `Write(value)` to every shard member.
    BroadcastWrite(Value),
    /// Acknowledge a write.
    SendAccept {
        /// The writer.
        to: ProcessId,
    },
    /// Send `Decided(value)` to every shard member.
    BroadcastDecided(Value),
    /// Report the decision to uniform consensus.
    Decide {
        /// Decided value.
        value: Value,
        /// This instance's timestamp.
        epoch: u64,
    },
    /// Report the abort to uniform consensus.
    Aborted {
        /// State carried into the next epoch.
        state: EpochState,
        /// This instance's timestamp.
        epoch: u64,
    },
}

/// One epoch consensus instance.
#[derive(Debug, Clone)]
pub struct EpochConsensus {
    ets: u64,
    leader: Option<ProcessId>,
    state: EpochState,
    members: usize,
    quorum: QuorumPolicy,
    states: BTreeMap<u32, EpochState>,
    accepted: BTreeSet<u32>,
    tmp_value: Option<Value>,
    proposed: bool,
    written: bool,
    announced: bool,
    decided: bool,
    aborted: bool,
}

impl EpochConsensus {
    /// Instance `ets` led by `leader`, starting from `state`, for a shard of
    /// `members` processes.
    pub fn new(
        ets: u64,
        leader: Option<ProcessId>,
        state: EpochState,
        members: usize,
        quorum: QuorumPolicy,
    ) -> Self {
        Self {
            ets,
            leader,
            state,
            members,
            quorum,
            states: BTreeMap::new(),
            accepted: BTreeSet::new(),
            tmp_value: None,
            proposed: false,
            written: false,
            announced: false,
            decided: false,
            aborted: false,
        }
    }

    /// Epoch timestamp.
    pub fn ets(&self) -> u64 {
        self.ets
    }

    /// Local replica state.
    pub fn state(&self) -> &EpochState {
        &self.state
    }

    /// Whether the instance was aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Leader that installed this epoch.
    pub fn leader(&self) -> Option<&ProcessId> {
        self.leader.as_ref()
    }

    fn accepts_from(&self, sender: &ProcessId) -> bool {
        !self.aborted && self.leader.as_ref() == Some(sender)
    }

    fn write_stamp(&self) -> u64 {
        self.ets.saturating_add(1)
    }

    fn threshold(&self) -> usize {
        self.quorum.threshold(self.members)
    }

    /// Leader starts the read round.
    pub fn propose(&mut self) -> Vec<EpAction> {
        if self.aborted || self.proposed {
            return Vec::new();
        }
        self.proposed = true;
        vec![EpAction::BroadcastRead]
    }

    /// `from` asked for the local state.
    pub fn on_read(&mut self, from: ProcessId) -> Vec<EpAction> {
        if !self.accepts_from(&from) {
            return Vec::new();
        }
        vec![EpAction::SendState {
            to: from,
            state: self.state.clone(),
        }]
    }

    /// Leader collects the state of the replica ranked `rank`.
    pub fn on_state(&mut self, rank: u32, state: EpochState) -> Vec<EpAction> {
        if self.aborted || self.written {
            return Vec::new();
        }
        self.states.insert(rank, state);
        if self.states.len() < self.threshold() {
            return Vec::new();
        }
        let Some(value) = self.merge() else {
            // No value anywhere yet: wait for more replies.
            return Vec::new();
        };
        self.states.clear();
        self.written = true;
        self.tmp_value = Some(value.clone());
        vec![EpAction::BroadcastWrite(value)]
    }

    /// `from` wrote `value` in this epoch.
    pub fn on_write(&mut self, from: ProcessId, value: Value) -> Vec<EpAction> {
        if !self.accepts_from(&from) {
            return Vec::new();
        }
        self.state = EpochState::new(self.write_stamp(), value);
        vec![EpAction::SendAccept { to: from }]
    }

    /// Leader counts the accept of the replica ranked `rank`.
    pub fn on_accept(&mut self, rank: u32) -> Vec<EpAction> {
        if self.aborted || self.announced {
            return Vec::new();
        }
        self.accepted.insert(rank);
        if self.accepted.len() < self.threshold() {
            return Vec::new();
        }
        match self.tmp_value.clone() {
            Some(value) => {
                self.announced = true;
                vec![EpAction::BroadcastDecided(value)]
            }
            None => Vec::new(),
        }
    }

    /// `from` announced the decision.
    pub fn on_decided(&mut self, from: &ProcessId, value: Value) -> Vec<EpAction> {
        if !self.accepts_from(from) || self.decided {
            return Vec::new();
        }
        self.decided = true;
        vec![EpAction::Decide {
            value,
            epoch: self.ets,
        }]
    }

    /// Uniform consensus supersedes this epoch.
    pub fn abort(&mut self) -> Vec<EpAction> {
        if self.aborted {
            return Vec::new();
        }
        self.aborted = true;
        vec![EpAction::Aborted {
            state: self.state.clone(),
            epoch: self.ets,
        }]
    }

    fn merge(&self) -> Option<Value> {
        let written = self
            .states
            .values()
            .filter(|s| s.value_timestamp > 0)
            .filter_map(|s| s.value.as_ref().map(|v| (s.value_timestamp, v)))
            .max_by_key(|(ts, _)| *ts);
        if let Some((_, value)) = written {
            return Some(value.clone());
        }

        let template = self
            .state
            .value
            .as_ref()
            .or_else(|| self.states.values().find_map(|s| s.value.as_ref()))?;

        let abort = self.states.values().any(|s| match &s.value {
            None => true,
            Some(v) => {
                v.kind() != template.kind()
                    || v.transaction().id != template.transaction().id
                    || v.action().is_abort()
            }
        }) || template.action().is_abort();

        let action = if abort {
            TransactionAction::Abort
        } else {
            TransactionAction::Commit
        };
        Some(template.with_action(action))
    }
}
