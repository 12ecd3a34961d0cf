//! In-process network.

use parking_lot::{Mutex, RwLock};
use sc_telemetry::MESSAGES_DROPPED;
use shared_bus::{Link, Transport, TransportError};
use shared_types::{codec, Message, ProcessId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Connects every node attached to it.
///
/// Messages are encoded and decoded on the way, so anything that would not
/// survive the wire does not survive here either. Delivered frames are
/// counted per sender, destination and payload.
#[derive(Default)]
pub struct InMemoryNetwork {
    nodes: RwLock<HashMap<ProcessId, Link>>,
    crashed: RwLock<HashSet<ProcessId>>,
    traffic: Mutex<HashMap<(ProcessId, ProcessId, &'static str), usize>>,
}

impl InMemoryNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the node of `link` reachable.
    pub fn attach(&self, link: Link) {
        self.nodes.write().insert(link.local().clone(), link);
    }

    /// Crash `process`: its actors stop and every frame to or from it is
    /// dropped from now on.
    pub fn crash(&self, process: &ProcessId) {
        self.crashed.write().insert(process.clone());
        if let Some(link) = self.nodes.read().get(process) {
            link.broker().shutdown();
        }
        info!("[network] Crashed {}", process);
    }

    /// Whether `process` was crashed.
    pub fn is_crashed(&self, process: &ProcessId) -> bool {
        self.crashed.read().contains(process)
    }

    /// Attached processes.
    pub fn processes(&self) -> Vec<ProcessId> {
        let mut processes: Vec<ProcessId> = self.nodes.read().keys().cloned().collect();
        processes.sort_by_key(|p| p.rank);
        processes
    }

    /// Delivered frames carrying `payload`, as `(sender, destination, count)`
    /// sorted by sender then destination rank.
    pub fn traffic(&self, payload: &str) -> Vec<(ProcessId, ProcessId, usize)> {
        let mut frames: Vec<(ProcessId, ProcessId, usize)> = self
            .traffic
            .lock()
            .iter()
            .filter(|((_, _, name), _)| *name == payload)
            .map(|((from, to, _), count)| (from.clone(), to.clone(), *count))
            .collect();
        frames.sort_by_key(|(from, to, _)| (from.rank, to.rank));
        frames
    }

    fn record(&self, destination: &ProcessId, message: &Message) {
        if let Some(sender) = &message.sender {
            *self
                .traffic
                .lock()
                .entry((sender.clone(), destination.clone(), message.payload.name()))
                .or_default() += 1;
        }
    }
}

impl Transport for InMemoryNetwork {
    fn send(&self, destination: &ProcessId, message: &Message) -> Result<(), TransportError> {
        let from_crashed = message
            .sender
            .as_ref()
            .is_some_and(|sender| self.is_crashed(sender));
        if from_crashed || self.is_crashed(destination) {
            MESSAGES_DROPPED.with_label_values(&["crashed"]).inc();
            return Err(TransportError::Unreachable {
                peer: destination.to_string(),
            });
        }

        let link = self
            .nodes
            .read()
            .get(destination)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable {
                peer: destination.to_string(),
            })?;

        let frame = codec::encode_frame(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        match codec::decode_frame(&frame) {
            Ok(decoded) => {
                if link.deliver(decoded).is_some() {
                    self.record(destination, message);
                }
                Ok(())
            }
            Err(e) => {
                debug!("[network] Frame to {} rejected: {}", destination, e);
                Err(TransportError::Encode(e.to_string()))
            }
        }
    }
}
