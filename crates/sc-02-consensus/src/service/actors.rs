//! Broker-facing wrappers of the consensus state machines.
//!
//! Every actor of one system shares a [`SystemContext`]; the domain
//! machine decides, the actor performs the resulting sends and triggers.

use crate::config::ConsensusConfig;
use crate::domain::{EcAction, EpAction, EpochChange, EpochConsensus, UcAction, UniformConsensus};
use crate::ports::VoteSource;
use sc_telemetry::{CONSENSUS_DECISIONS, EPOCHS_ABORTED, EPOCHS_STARTED, EPOCH_NACKS, OPEN_SYSTEMS};
use shared_bus::{BrokerError, Handled, Handler, Link};
use shared_types::{
    AbstractionId, EpochState, Membership, Message, Payload, ProcessId, Scope, Value, ValueKind,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything an actor of one consensus system needs.
#[derive(Clone)]
pub struct SystemContext {
    /// `Scope::System(id)` of the system.
    pub scope: Scope,
    /// Messaging facade.
    pub link: Link,
    /// Process registry.
    pub membership: Arc<Membership>,
    /// Local vote per proposal.
    pub votes: Arc<dyn VoteSource>,
    /// Tuning.
    pub config: ConsensusConfig,
}

impl SystemContext {
    fn message(&self, abstraction: AbstractionId, payload: Payload) -> Message {
        Message::new(self.scope.clone(), abstraction, payload)
    }

    fn system_id(&self) -> &str {
        self.scope.system_id().unwrap_or("process")
    }

    fn is_local(&self, process: &ProcessId) -> bool {
        process.owner == self.membership.local_shard()
    }
}

// =============================================================================
// EPOCH CHANGE
// =============================================================================

/// Epoch change of one system.
pub struct EcActor {
    ec: EpochChange,
    ctx: SystemContext,
}

impl EcActor {
    /// Subscribe `(scope, Ec)`, trusting the leader currently registered.
    pub fn spawn(ctx: SystemContext) -> Result<(), BrokerError> {
        let ec = EpochChange::new(
            ctx.link.local().clone(),
            ctx.membership.local_leader(),
            ctx.config.epoch_increment,
        );
        let broker = ctx.link.broker().clone();
        let scope = ctx.scope.clone();
        broker.subscribe(scope, AbstractionId::Ec, Self { ec, ctx })
    }

    fn apply(&self, action: EcAction) {
        match action {
            EcAction::Broadcast { timestamp } => {
                debug!("[ec] {} announcing epoch {}", self.ctx.system_id(), timestamp);
                self.ctx.link.broadcast(
                    &self.ctx.membership.local_shard_nodes(),
                    self.ctx
                        .message(AbstractionId::Ec, Payload::NewEpoch { timestamp }),
                );
            }
            EcAction::Nack { to, timestamp } => {
                debug!("[ec] {} refusing epoch {} from {}", self.ctx.system_id(), timestamp, to);
                EPOCH_NACKS.inc();
                let _ = self.ctx.link.send_to(
                    &to,
                    self.ctx.message(AbstractionId::Ec, Payload::Nack { timestamp }),
                );
            }
            EcAction::StartEpoch { timestamp, leader } => {
                info!(
                    "[ec] {} starting epoch {} led by {}",
                    self.ctx.system_id(),
                    timestamp,
                    leader
                );
                EPOCHS_STARTED.inc();
                self.ctx.link.trigger(
                    self.ctx
                        .message(AbstractionId::Uc, Payload::StartEpoch { timestamp, leader }),
                );
            }
        }
    }
}

impl Handler for EcActor {
    fn handle(&mut self, message: Message) -> Handled {
        match (message.payload, message.sender) {
            (Payload::Trust(leader), _) if self.ctx.is_local(&leader) => {
                if let Some(action) = self.ec.on_trust(leader) {
                    self.apply(action);
                }
                Handled::Consumed
            }
            (Payload::NewEpoch { timestamp }, Some(sender)) => {
                let action = self.ec.on_new_epoch(sender, timestamp);
                self.apply(action);
                Handled::Consumed
            }
            (Payload::Nack { timestamp }, _) => match self.ec.on_nack(timestamp) {
                Some(action) => {
                    self.apply(action);
                    Handled::Consumed
                }
                None => Handled::Ignored,
            },
            _ => Handled::Ignored,
        }
    }
}

// =============================================================================
// EPOCH CONSENSUS
// =============================================================================

/// One epoch consensus instance of one system.
pub struct EpActor {
    ep: EpochConsensus,
    members: Vec<ProcessId>,
    ctx: SystemContext,
}

impl EpActor {
    /// Subscribe `(scope, Ep(ets))` led by `leader` over the current shard
    /// membership.
    pub fn spawn(
        ctx: SystemContext,
        ets: u64,
        leader: Option<ProcessId>,
        state: EpochState,
    ) -> Result<(), BrokerError> {
        let members = ctx.membership.local_shard_nodes();
        let ep = EpochConsensus::new(ets, leader, state, members.len(), ctx.config.quorum);
        let broker = ctx.link.broker().clone();
        let scope = ctx.scope.clone();
        broker.subscribe(scope, AbstractionId::Ep(ets), Self { ep, members, ctx })
    }

    fn abstraction(&self) -> AbstractionId {
        AbstractionId::Ep(self.ep.ets())
    }

    fn rank_of(&self, sender: &ProcessId) -> u32 {
        self.ctx
            .membership
            .resolve(sender)
            .map_or(sender.rank, |p| p.rank)
    }

    fn broadcast(&self, payload: Payload) {
        self.ctx
            .link
            .broadcast(&self.members, self.ctx.message(self.abstraction(), payload));
    }

    fn apply(&self, actions: Vec<EpAction>) -> Handled {
        if actions.is_empty() {
            return Handled::Ignored;
        }
        for action in actions {
            match action {
                EpAction::BroadcastRead => self.broadcast(Payload::Read),
                EpAction::SendState { to, state } => {
                    let _ = self
                        .ctx
                        .link
                        .send_to(&to, self.ctx.message(self.abstraction(), Payload::State(state)));
                }
                EpAction::BroadcastWrite(value) => {
                    debug!(
                        "[ep] {} epoch {} writing {}",
                        self.ctx.system_id(),
                        self.ep.ets(),
                        value.action()
                    );
                    self.broadcast(Payload::Write(value));
                }
                EpAction::SendAccept { to } => {
                    let _ = self
                        .ctx
                        .link
                        .send_to(&to, self.ctx.message(self.abstraction(), Payload::Accept));
                }
                EpAction::BroadcastDecided(value) => self.broadcast(Payload::Decided(value)),
                EpAction::Decide { value, epoch } => {
                    self.ctx.link.trigger(
                        self.ctx
                            .message(AbstractionId::Uc, Payload::EpDecide { value, epoch }),
                    );
                }
                EpAction::Aborted { state, epoch } => {
                    debug!("[ep] {} epoch {} aborted", self.ctx.system_id(), epoch);
                    EPOCHS_ABORTED.inc();
                    self.ctx.link.trigger(
                        self.ctx
                            .message(AbstractionId::Uc, Payload::Aborted { state, epoch }),
                    );
                }
            }
        }
        Handled::Consumed
    }
}

impl Handler for EpActor {
    fn handle(&mut self, message: Message) -> Handled {
        let actions = match (message.payload, message.sender) {
            (Payload::EpPropose, _) => self.ep.propose(),
            (Payload::Read, Some(sender)) => self.ep.on_read(sender),
            (Payload::State(state), Some(sender)) => {
                let rank = self.rank_of(&sender);
                self.ep.on_state(rank, state)
            }
            (Payload::Write(value), Some(sender)) => self.ep.on_write(sender, value),
            (Payload::Accept, Some(sender)) => {
                let rank = self.rank_of(&sender);
                self.ep.on_accept(rank)
            }
            (Payload::Decided(value), Some(sender)) => self.ep.on_decided(&sender, value),
            (Payload::EpAbort, _) => self.ep.abort(),
            _ => Vec::new(),
        };
        self.apply(actions)
    }
}

// =============================================================================
// UNIFORM CONSENSUS
// =============================================================================

/// Uniform consensus of one system.
pub struct UcActor {
    uc: UniformConsensus,
    ctx: SystemContext,
}

impl UcActor {
    /// Subscribe `(scope, Uc)`.
    pub fn spawn(ctx: SystemContext) -> Result<(), BrokerError> {
        let broker = ctx.link.broker().clone();
        let scope = ctx.scope.clone();
        broker.subscribe(
            scope,
            AbstractionId::Uc,
            Self {
                uc: UniformConsensus::new(ctx.link.local().clone()),
                ctx,
            },
        )
    }

    fn apply(&self, actions: Vec<UcAction>) -> Handled {
        if actions.is_empty() {
            return Handled::Ignored;
        }
        for action in actions {
            match action {
                UcAction::SpawnEpoch { ets, leader, state } => {
                    if let Err(e) = EpActor::spawn(self.ctx.clone(), ets, leader, state) {
                        warn!("[uc] {} could not start epoch {}: {}", self.ctx.system_id(), ets, e);
                    }
                }
                UcAction::ProposeEpoch { ets } => {
                    self.ctx
                        .link
                        .trigger(self.ctx.message(AbstractionId::Ep(ets), Payload::EpPropose));
                }
                UcAction::AbortEpoch { ets } => {
                    self.ctx
                        .link
                        .trigger(self.ctx.message(AbstractionId::Ep(ets), Payload::EpAbort));
                }
                UcAction::RetireEpoch { ets } => {
                    self.ctx
                        .link
                        .broker()
                        .unsubscribe(&self.ctx.scope, AbstractionId::Ep(ets));
                }
                UcAction::Decide(value) => self.decide(value),
            }
        }
        Handled::Consumed
    }

    fn decide(&self, value: Value) {
        let phase = match value.kind() {
            ValueKind::Prepared => "prepare",
            ValueKind::Accept => "accept",
        };
        CONSENSUS_DECISIONS.with_label_values(&[phase]).inc();
        info!(
            "[uc] {} decided {} (epoch {})",
            self.ctx.system_id(),
            value.action(),
            self.uc.ets()
        );

        self.ctx.link.trigger(Message::new(
            Scope::Process,
            AbstractionId::Sbac,
            Payload::UcDecide(value),
        ));
        self.ctx.link.broker().retire_scope(&self.ctx.scope);
        OPEN_SYSTEMS.dec();
    }
}

impl Handler for UcActor {
    fn handle(&mut self, message: Message) -> Handled {
        let actions = match message.payload {
            Payload::UcPropose(proposal) => {
                let action = self.ctx.votes.vote(&proposal);
                debug!("[uc] {} local vote {}", self.ctx.system_id(), action);
                let value = Value::for_phase(proposal.phase, action, proposal.transaction);
                self.uc.propose(value, self.ctx.membership.local_leader())
            }
            Payload::StartEpoch { timestamp, leader } => self.uc.on_start_epoch(timestamp, leader),
            Payload::Aborted { state, epoch } => self.uc.on_aborted(epoch, state),
            Payload::EpDecide { value, epoch } => self.uc.on_ep_decide(epoch, value),
            _ => Vec::new(),
        };
        self.apply(actions)
    }
}
