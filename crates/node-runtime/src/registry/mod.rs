//! # Registration
//!
//! A process learns its rank and the current membership by registering.
//!
//! - [`InMemoryRegistrar`]: hub for in-process clusters. Ranks are assigned
//!   in registration order and running nodes are told about later joins.
//! - [`StaticRegistrar`]: ranks and peers come from the node configuration.

use crate::container::config::PeerConfig;
use parking_lot::Mutex;
use shared_bus::Link;
use shared_types::{AbstractionId, Message, Payload, ProcessId, RegistryError, Scope};
use tracing::{debug, info};

/// Result of registering one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The registered process, rank included.
    pub local: ProcessId,
    /// Every other known process.
    pub peers: Vec<ProcessId>,
}

/// Registration port.
pub trait Registrar: Send + Sync {
    /// Register `(owner, index, host, port)` and return its rank and peers.
    fn register_self(
        &self,
        owner: &str,
        index: u32,
        host: &str,
        port: u16,
    ) -> Result<Registration, RegistryError>;

    /// The node of `link` is running; registrars that learn about later
    /// joins forward them to it.
    fn watch(&self, _link: Link) {}
}

#[derive(Default)]
struct HubState {
    processes: Vec<ProcessId>,
    watchers: Vec<Link>,
}

/// Registration hub shared by the nodes of one process.
#[derive(Default)]
pub struct InMemoryRegistrar {
    state: Mutex<HubState>,
}

impl InMemoryRegistrar {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registered process in registration order.
    pub fn processes(&self) -> Vec<ProcessId> {
        self.state.lock().processes.clone()
    }
}

impl Registrar for InMemoryRegistrar {
    fn register_self(
        &self,
        owner: &str,
        index: u32,
        host: &str,
        port: u16,
    ) -> Result<Registration, RegistryError> {
        let candidate = ProcessId::new(host, port, owner, index);
        let mut state = self.state.lock();

        let local = match state.processes.iter().find(|p| **p == candidate) {
            Some(existing) => {
                debug!("[registry] {} registered again", existing);
                existing.clone()
            }
            None => {
                let rank = u32::try_from(state.processes.len() + 1)
                    .map_err(|_| RegistryError::Registration("rank space exhausted".into()))?;
                let local = candidate.with_rank(rank);
                state.processes.push(local.clone());
                info!("[registry] Registered {}", local);

                let joined =
                    Message::new(Scope::Process, AbstractionId::Eld, Payload::PeerJoined(local.clone()))
                        .from(local.clone());
                for watcher in &state.watchers {
                    watcher.deliver(joined.clone());
                }
                local
            }
        };

        let peers = state
            .processes
            .iter()
            .filter(|p| **p != local)
            .cloned()
            .collect();
        Ok(Registration { local, peers })
    }

    fn watch(&self, link: Link) {
        self.state.lock().watchers.push(link);
    }
}

/// Membership fixed by configuration.
#[derive(Debug, Clone)]
pub struct StaticRegistrar {
    peers: Vec<PeerConfig>,
}

impl StaticRegistrar {
    /// Registrar over the configured peer list.
    pub fn new(peers: Vec<PeerConfig>) -> Self {
        Self { peers }
    }
}

impl Registrar for StaticRegistrar {
    fn register_self(
        &self,
        owner: &str,
        index: u32,
        host: &str,
        port: u16,
    ) -> Result<Registration, RegistryError> {
        let candidate = ProcessId::new(host, port, owner, index);
        let processes: Vec<ProcessId> = self.peers.iter().map(PeerConfig::process_id).collect();
        let local = processes
            .iter()
            .find(|p| **p == candidate)
            .cloned()
            .ok_or_else(|| RegistryError::Unranked {
                process: candidate.to_string(),
            })?;
        let peers = processes.into_iter().filter(|p| *p != local).collect();
        Ok(Registration { local, peers })
    }
}
