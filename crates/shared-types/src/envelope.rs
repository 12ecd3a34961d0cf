//! # Message Envelope
//!
//! Every message routed between actors, locally or across the network, is a
//! [`Message`]: a unique id, a scope (process-wide or one consensus system),
//! the abstraction it is addressed to, the sender and a discriminated payload.
//!
//! ## Routing Key
//!
//! ```text
//!   (Scope::Process,       Epfd | Eld | Sbac)
//!   (Scope::System("t-prepare"), Ec | Uc | Ep(ets))
//! ```

use crate::entities::{
    EpochState, Phase, ProcessId, ShardId, SystemId, Transaction, TransactionAction, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a message lives: the whole process or a single consensus system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Process-wide actors (failure detector, leader detector, atomic commit).
    Process,
    /// One consensus system, keyed by its id.
    System(SystemId),
}

impl Scope {
    /// Scope of a consensus system.
    pub fn system(id: impl Into<SystemId>) -> Self {
        Scope::System(id.into())
    }

    /// The system id, if this is a system scope.
    pub fn system_id(&self) -> Option<&str> {
        match self {
            Scope::Process => None,
            Scope::System(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Process => write!(f, "process"),
            Scope::System(id) => write!(f, "{id}"),
        }
    }
}

/// The closed set of abstractions a message can be addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractionId {
    /// Eventually perfect failure detector.
    Epfd,
    /// Eventual leader detector.
    Eld,
    /// Epoch change.
    Ec,
    /// Uniform consensus.
    Uc,
    /// Epoch consensus instance for the given epoch timestamp.
    Ep(u64),
    /// Sharded atomic commit.
    Sbac,
}

impl fmt::Display for AbstractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractionId::Epfd => write!(f, "epfd"),
            AbstractionId::Eld => write!(f, "eld"),
            AbstractionId::Ec => write!(f, "ec"),
            AbstractionId::Uc => write!(f, "uc"),
            AbstractionId::Ep(ets) => write!(f, "ep{ets}"),
            AbstractionId::Sbac => write!(f, "sbac"),
        }
    }
}

/// What a uniform consensus system is asked to decide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Prepare or accept.
    pub phase: Phase,
    /// The transaction under decision.
    pub transaction: Transaction,
}

/// Discriminated message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    // =========================================================================
    // FAILURE & LEADER DETECTION
    // =========================================================================
    /// Round timer fired.
    EpfdTimeout,
    /// Ping.
    HeartbeatRequest,
    /// Pong.
    HeartbeatReply,
    /// The peer is believed crashed.
    Suspect(ProcessId),
    /// The peer is no longer suspected.
    Restore(ProcessId),
    /// A peer registered after this process started.
    PeerJoined(ProcessId),
    /// The given process is trusted as leader of its shard.
    Trust(ProcessId),

    // =========================================================================
    // EPOCH CHANGE
    // =========================================================================
    /// A leader announces a new epoch timestamp.
    NewEpoch {
        /// Candidate epoch timestamp.
        timestamp: u64,
    },
    /// The announced epoch was refused.
    Nack {
        /// The refused timestamp.
        timestamp: u64,
    },
    /// Epoch accepted locally; uniform consensus must switch to it.
    StartEpoch {
        /// New epoch timestamp.
        timestamp: u64,
        /// Leader that announced the epoch.
        leader: ProcessId,
    },

    // =========================================================================
    // EPOCH CONSENSUS
    // =========================================================================
    /// Start the read phase (leader only).
    EpPropose,
    /// Leader asks for replica states.
    Read,
    /// Replica state reply.
    State(EpochState),
    /// Leader asks replicas to adopt a value.
    Write(Value),
    /// Replica adopted the written value.
    Accept,
    /// Leader announces the decision.
    Decided(Value),
    /// Supersede the epoch.
    EpAbort,
    /// The epoch aborted with this carried state.
    Aborted {
        /// State to carry into the next epoch.
        state: EpochState,
        /// Epoch that aborted.
        epoch: u64,
    },
    /// The epoch decided.
    EpDecide {
        /// Decided value.
        value: Value,
        /// Epoch that decided.
        epoch: u64,
    },

    // =========================================================================
    // UNIFORM CONSENSUS
    // =========================================================================
    /// Start deciding.
    UcPropose(Proposal),
    /// The system decided.
    UcDecide(Value),

    // =========================================================================
    // ATOMIC COMMIT
    // =========================================================================
    /// Client asks this process to run the commit for a transaction.
    SbacPrepare(Transaction),
    /// A shard's decided prepare vote, sent to the other shard.
    SbacLocalPrepared {
        /// Decided vote.
        action: TransactionAction,
        /// The transaction.
        transaction: Transaction,
        /// Shard that decided the vote.
        shard: ShardId,
    },
}

impl Payload {
    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::EpfdTimeout => "epfd_timeout",
            Payload::HeartbeatRequest => "heartbeat_request",
            Payload::HeartbeatReply => "heartbeat_reply",
            Payload::Suspect(_) => "suspect",
            Payload::Restore(_) => "restore",
            Payload::PeerJoined(_) => "peer_joined",
            Payload::Trust(_) => "trust",
            Payload::NewEpoch { .. } => "new_epoch",
            Payload::Nack { .. } => "nack",
            Payload::StartEpoch { .. } => "start_epoch",
            Payload::EpPropose => "ep_propose",
            Payload::Read => "read",
            Payload::State(_) => "state",
            Payload::Write(_) => "write",
            Payload::Accept => "accept",
            Payload::Decided(_) => "decided",
            Payload::EpAbort => "ep_abort",
            Payload::Aborted { .. } => "aborted",
            Payload::EpDecide { .. } => "ep_decide",
            Payload::UcPropose(_) => "uc_propose",
            Payload::UcDecide(_) => "uc_decide",
            Payload::SbacPrepare(_) => "sbac_prepare",
            Payload::SbacLocalPrepared { .. } => "sbac_local_prepared",
        }
    }
}

/// The message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version, checked on decode.
    pub version: u16,
    /// Unique message id.
    pub id: Uuid,
    /// Process-wide or one consensus system.
    pub scope: Scope,
    /// Addressed abstraction.
    pub abstraction: AbstractionId,
    /// Originating process; `None` for locally generated events.
    pub sender: Option<ProcessId>,
    /// The payload.
    pub payload: Payload,
}

impl Message {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Create a locally originated message.
    pub fn new(scope: Scope, abstraction: AbstractionId, payload: Payload) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            id: Uuid::new_v4(),
            scope,
            abstraction,
            sender: None,
            payload,
        }
    }

    /// Stamp the sender.
    #[must_use]
    pub fn from(mut self, sender: ProcessId) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Copy addressed to a different route, keeping the id and sender.
    #[must_use]
    pub fn readdressed(&self, scope: Scope, abstraction: AbstractionId) -> Self {
        Self {
            scope,
            abstraction,
            ..self.clone()
        }
    }
}
