//! # Membership Registry
//!
//! Tracks known processes per shard, the leader this process trusts for its
//! own shard and the leaders announced by other shards.
//!
//! Read by nearly every actor, written only by registration and leader
//! detection. Reads take a shared lock; writes are serialized.

use crate::entities::{ProcessId, ShardId};
use crate::errors::RegistryError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Default)]
struct MembershipState {
    /// Processes per shard, kept sorted by rank.
    shards: HashMap<ShardId, Vec<ProcessId>>,
    /// Leader of the local shard as output by leader detection.
    local_leader: Option<ProcessId>,
    /// Leaders announced by other shards.
    external_leaders: HashMap<ShardId, ProcessId>,
}

/// Process/shard registry shared by all actors of one process.
pub struct Membership {
    local: ProcessId,
    state: RwLock<MembershipState>,
}

impl Membership {
    /// Create a registry containing only the local process.
    pub fn new(local: ProcessId) -> Result<Self, RegistryError> {
        if local.rank == 0 {
            return Err(RegistryError::Unranked {
                process: local.to_string(),
            });
        }
        let membership = Self {
            local: local.clone(),
            state: RwLock::new(MembershipState::default()),
        };
        membership.add_process(local)?;
        Ok(membership)
    }

    /// The local process.
    pub fn local(&self) -> &ProcessId {
        &self.local
    }

    /// The local shard alias.
    pub fn local_shard(&self) -> &str {
        &self.local.owner
    }

    /// Add a process. Returns `true` if it was not known before.
    pub fn add_process(&self, process: ProcessId) -> Result<bool, RegistryError> {
        if process.rank == 0 {
            return Err(RegistryError::Unranked {
                process: process.to_string(),
            });
        }

        let mut state = self.state.write();
        if let Some(holder) = state
            .shards
            .values()
            .flatten()
            .find(|p| p.rank == process.rank && **p != process)
        {
            return Err(RegistryError::DuplicateRank {
                rank: process.rank,
                holder: holder.to_string(),
            });
        }

        let members = state.shards.entry(process.owner.clone()).or_default();
        if members.contains(&process) {
            debug!("[membership] {} already known", process);
            return Ok(false);
        }

        info!("[membership] Added {}", process);
        members.push(process);
        members.sort_by_key(|p| p.rank);
        Ok(true)
    }

    /// Add many processes, skipping the ones already known.
    pub fn add_processes(
        &self,
        processes: impl IntoIterator<Item = ProcessId>,
    ) -> Result<usize, RegistryError> {
        let mut added = 0;
        for process in processes {
            if self.add_process(process)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Processes of `shard`, sorted by rank.
    pub fn shard_nodes(&self, shard: &str) -> Vec<ProcessId> {
        self.state.read().shards.get(shard).cloned().unwrap_or_default()
    }

    /// Processes of the local shard, the local process included.
    pub fn local_shard_nodes(&self) -> Vec<ProcessId> {
        self.shard_nodes(self.local_shard())
    }

    /// Processes of the local shard, the local process excluded.
    pub fn peers(&self) -> Vec<ProcessId> {
        self.local_shard_nodes()
            .into_iter()
            .filter(|p| *p != self.local)
            .collect()
    }

    /// Every known process in every shard other than the local one.
    pub fn remote_nodes(&self) -> Vec<ProcessId> {
        let state = self.state.read();
        let mut nodes: Vec<ProcessId> = state
            .shards
            .iter()
            .filter(|(shard, _)| shard.as_str() != self.local_shard())
            .flat_map(|(_, members)| members.iter().cloned())
            .collect();
        nodes.sort_by_key(|p| p.rank);
        nodes
    }

    /// Known shard aliases.
    pub fn shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = self.state.read().shards.keys().cloned().collect();
        shards.sort();
        shards
    }

    /// Look up a known process, returning the registered copy with its rank.
    pub fn resolve(&self, process: &ProcessId) -> Option<ProcessId> {
        self.state
            .read()
            .shards
            .get(&process.owner)
            .and_then(|members| members.iter().find(|p| *p == process).cloned())
    }

    /// Leader currently trusted for the local shard.
    pub fn local_leader(&self) -> Option<ProcessId> {
        self.state.read().local_leader.clone()
    }

    /// Record the leader of the local shard.
    pub fn set_local_leader(&self, leader: Option<ProcessId>) {
        self.state.write().local_leader = leader;
    }

    /// Whether this process currently leads its shard.
    pub fn is_local_leader(&self) -> bool {
        self.state.read().local_leader.as_ref() == Some(&self.local)
    }

    /// Leader last announced by `shard`.
    pub fn external_leader(&self, shard: &str) -> Option<ProcessId> {
        self.state.read().external_leaders.get(shard).cloned()
    }

    /// Record a leader announced by another shard.
    pub fn set_external_leader(&self, leader: ProcessId) {
        info!("[membership] Shard {} is led by {}", leader.owner, leader);
        self.state
            .write()
            .external_leaders
            .insert(leader.owner.clone(), leader);
    }
}
