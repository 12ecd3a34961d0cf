//! Opening consensus systems.
//!
//! A system is the set of actors `(System(id), Uc | Ec | Ep(*))` deciding
//! one phase of one transaction. Opening registers uniform consensus first
//! and queues the proposal on it, then registers epoch change, whose parked
//! `NewEpoch`/`Trust` traffic is flushed on subscription. Uniform consensus
//! therefore always sees the proposal before any `StartEpoch`.

use super::actors::{EcActor, SystemContext, UcActor};
use crate::config::ConsensusConfig;
use crate::domain::{ConsensusError, ConsensusResult};
use crate::ports::VoteSource;
use sc_telemetry::OPEN_SYSTEMS;
use shared_bus::Link;
use shared_types::{AbstractionId, Membership, Message, Payload, Proposal, Scope, SystemId};
use std::sync::Arc;
use tracing::{debug, info};

/// Factory for the consensus systems of one process.
#[derive(Clone)]
pub struct ConsensusSystems {
    link: Link,
    membership: Arc<Membership>,
    votes: Arc<dyn VoteSource>,
    config: ConsensusConfig,
}

impl ConsensusSystems {
    /// Create the factory.
    pub fn new(
        link: Link,
        membership: Arc<Membership>,
        votes: Arc<dyn VoteSource>,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            link,
            membership,
            votes,
            config,
        }
    }

    /// Open the system for `proposal` and propose into it.
    ///
    /// Returns the system id. Opening a system that is already running or
    /// already decided is an error and leaves it untouched.
    pub fn open(&self, proposal: Proposal) -> ConsensusResult<SystemId> {
        let system_id = proposal.phase.system_id(&proposal.transaction.id);
        let scope = Scope::system(system_id.clone());
        let broker = self.link.broker();

        if broker.is_retired(&scope) {
            return Err(ConsensusError::Decided(system_id));
        }
        if broker.is_subscribed(&scope, AbstractionId::Uc) {
            debug!("[uc] {} already exists", system_id);
            return Err(ConsensusError::AlreadyOpen(system_id));
        }

        let ctx = SystemContext {
            scope: scope.clone(),
            link: self.link.clone(),
            membership: self.membership.clone(),
            votes: self.votes.clone(),
            config: self.config,
        };

        UcActor::spawn(ctx.clone())?;
        self.link.trigger(Message::new(
            scope,
            AbstractionId::Uc,
            Payload::UcPropose(proposal),
        ));
        EcActor::spawn(ctx)?;

        OPEN_SYSTEMS.inc();
        info!("[uc] Opened {}", system_id);
        Ok(system_id)
    }

    /// Whether `system_id` already decided here.
    pub fn is_decided(&self, system_id: &str) -> bool {
        self.link.broker().is_retired(&Scope::system(system_id))
    }

    /// Whether `system_id` is currently running here.
    pub fn is_open(&self, system_id: &str) -> bool {
        self.link
            .broker()
            .is_subscribed(&Scope::system(system_id), AbstractionId::Uc)
    }
}
