//! Epoch change.
//!
//! Each process keeps the last epoch it accepted (`last_ts`) and the
//! round of the timestamp it would announce as leader (`round`).
//!
//! ## Timestamps
//!
//! A timestamp is `round << 32 | rank`. The round starts at `0` and grows
//! by the configured increment on every announcement; the low half is the
//! announcer's rank. Ranks are unique, so two leaders never announce the
//! same timestamp, and the round-0 timestamp of a process is its rank,
//! which is what the first epoch of a system uses.

use shared_types::ProcessId;

const RANK_BITS: u32 = 32;

/// Timestamp of `round` announced by the process ranked `rank`.
pub fn epoch_timestamp(round: u64, rank: u32) -> u64 {
    (round << RANK_BITS) | u64::from(rank)
}

/// What the caller must do after an epoch-change input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcAction {
    /// Announce `NewEpoch{timestamp}` to every shard member, self included.
    Broadcast {
        /// The announced timestamp.
        timestamp: u64,
    },
    /// Refuse the announcement of `to`.
    Nack {
        /// The announcer.
        to: ProcessId,
        /// The refused timestamp.
        timestamp: u64,
    },
    /// Tell uniform consensus to switch epochs.
    StartEpoch {
        /// The accepted timestamp.
        timestamp: u64,
        /// The process that announced it and leads the epoch.
        leader: ProcessId,
    },
}

/// Epoch-change state of one consensus system at one process.
#[derive(Debug, Clone)]
pub struct EpochChange {
    local: ProcessId,
    trusted: Option<ProcessId>,
    last_ts: u64,
    round: u64,
    increment: u64,
}

impl EpochChange {
    /// Start trusting `trusted`, the shard leader known when the system opened.
    pub fn new(local: ProcessId, trusted: Option<ProcessId>, increment: u64) -> Self {
        Self {
            local,
            trusted,
            last_ts: 0,
            round: 0,
            increment: increment.max(1),
        }
    }

    /// Currently trusted leader.
    pub fn trusted(&self) -> Option<&ProcessId> {
        self.trusted.as_ref()
    }

    /// Last accepted epoch timestamp.
    pub fn last_ts(&self) -> u64 {
        self.last_ts
    }

    /// Timestamp this process would announce next.
    pub fn ts(&self) -> u64 {
        epoch_timestamp(self.round, self.local.rank)
    }

    fn next_round(&mut self) -> EcAction {
        self.round = self.round.saturating_add(self.increment);
        EcAction::Broadcast {
            timestamp: self.ts(),
        }
    }

    fn leads(&self) -> bool {
        self.trusted.as_ref() == Some(&self.local)
    }

    /// The leader detector trusts `leader`.
    ///
    /// A follower whose trust moves refuses the round-0 epoch of the new
    /// leader. That leader may have opened the system already trusting
    /// itself and would otherwise never announce an epoch this follower
    /// can join.
    pub fn on_trust(&mut self, leader: ProcessId) -> Option<EcAction> {
        let moved = self.trusted.as_ref() != Some(&leader);
        self.trusted = Some(leader);
        if self.leads() {
            return Some(self.next_round());
        }
        match &self.trusted {
            Some(leader) if moved => Some(EcAction::Nack {
                to: leader.clone(),
                timestamp: epoch_timestamp(0, leader.rank),
            }),
            _ => None,
        }
    }

    /// `sender` announced an epoch.
    pub fn on_new_epoch(&mut self, sender: ProcessId, timestamp: u64) -> EcAction {
        if self.trusted.as_ref() == Some(&sender) && timestamp > self.last_ts {
            self.last_ts = timestamp;
            EcAction::StartEpoch {
                timestamp,
                leader: sender,
            }
        } else {
            EcAction::Nack {
                to: sender,
                timestamp,
            }
        }
    }

    /// A member refused `timestamp`.
    ///
    /// Only a refusal of the timestamp currently announced by this leader
    /// triggers a retry; stale refusals are dropped.
    pub fn on_nack(&mut self, timestamp: u64) -> Option<EcAction> {
        if self.leads() && timestamp == self.ts() {
            return Some(self.next_round());
        }
        None
    }
}
