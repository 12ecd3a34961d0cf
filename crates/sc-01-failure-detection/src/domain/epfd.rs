//! # Eventually Perfect Failure Detector
//!
//! Round-based suspicion bookkeeping. Pure state: the service layer owns
//! the timer and the network.
//!
//! ```text
//!            no reply in round                reply while suspected
//!  [trusted] ─────────────────► [suspected] ─────────────────────► [trusted]
//!               emit Suspect                  emit Restore, delay += inc
//! ```

use shared_types::ProcessId;
use std::collections::HashSet;
use std::time::Duration;

/// Round timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Round length before any false suspicion.
    pub initial_delay: Duration,
    /// Added to the round length each time a suspected peer proves alive.
    pub delay_increment: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            delay_increment: Duration::from_millis(100),
        }
    }
}

/// A change in the suspected set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspicionEvent {
    /// Peer newly suspected.
    Suspect(ProcessId),
    /// Peer no longer suspected.
    Restore(ProcessId),
}

/// Result of closing a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Suspicion changes, in peer order.
    pub events: Vec<SuspicionEvent>,
    /// Peers to send a heartbeat request to.
    pub ping: Vec<ProcessId>,
    /// Length of the next round.
    pub delay: Duration,
    /// Whether this round grew the delay.
    pub delay_increased: bool,
}

/// Suspicion state of one process.
#[derive(Debug, Clone)]
pub struct FailureDetector {
    alive: HashSet<ProcessId>,
    suspected: HashSet<ProcessId>,
    known: HashSet<ProcessId>,
    delay: Duration,
    increment: Duration,
}

impl FailureDetector {
    /// Start with every peer considered alive for the first round.
    pub fn new(peers: &[ProcessId], config: DetectorConfig) -> Self {
        let peers: HashSet<ProcessId> = peers.iter().cloned().collect();
        Self {
            alive: peers.clone(),
            suspected: HashSet::new(),
            known: peers,
            delay: config.initial_delay,
            increment: config.delay_increment,
        }
    }

    /// Record a heartbeat reply. Returns `false` if already recorded this round.
    pub fn record_reply(&mut self, from: &ProcessId) -> bool {
        self.alive.insert(from.clone())
    }

    /// Close the current round over `peers` and open the next one.
    ///
    /// Peers seen for the first time get one grace round before they can
    /// be suspected.
    pub fn close_round(&mut self, peers: &[ProcessId]) -> RoundOutcome {
        let delay_increased = !self.alive.is_disjoint(&self.suspected);
        if delay_increased {
            self.delay += self.increment;
        }

        for peer in peers {
            if self.known.insert(peer.clone()) {
                self.alive.insert(peer.clone());
            }
        }

        let mut events = Vec::new();
        for peer in peers {
            let alive = self.alive.contains(peer);
            if !alive && !self.suspected.contains(peer) {
                self.suspected.insert(peer.clone());
                events.push(SuspicionEvent::Suspect(peer.clone()));
            } else if alive && self.suspected.remove(peer) {
                events.push(SuspicionEvent::Restore(peer.clone()));
            }
        }

        self.alive.clear();
        RoundOutcome {
            events,
            ping: peers.to_vec(),
            delay: self.delay,
            delay_increased,
        }
    }

    /// Current round length.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether `peer` is currently suspected.
    pub fn is_suspected(&self, peer: &ProcessId) -> bool {
        self.suspected.contains(peer)
    }

    /// Number of suspected peers.
    pub fn suspected_count(&self) -> usize {
        self.suspected.len()
    }
}
