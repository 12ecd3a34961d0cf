//! A running shard-commit process.

use crate::container::config::NodeConfig;
use crate::error::RuntimeError;
use crate::registry::Registrar;
use parking_lot::Mutex;
use sc_01_failure_detection::{EldActor, EpfdActor};
use sc_02_consensus::ConsensusSystems;
use sc_03_atomic_commit::{AllPrepared, Balances, ChannelOutcomeSink, CommitStore, SbacActor};
use shared_bus::{Delivery, Link, MessageBroker, Transport};
use shared_types::{
    codec, AbstractionId, Membership, Message, Payload, ProcessId, Scope, Transaction,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Node bootstrap.
pub struct Node;

impl Node {
    /// Register, build the registry and the broker, and start every actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &NodeConfig,
        registrar: &dyn Registrar,
        transport: Arc<dyn Transport>,
    ) -> Result<NodeHandle, RuntimeError> {
        config.validate()?;
        let registration = registrar.register_self(
            &config.node.alias,
            config.node.index,
            &config.node.host,
            config.node.port,
        )?;
        let local = registration.local;

        let membership = Arc::new(Membership::new(local.clone())?);
        membership.add_processes(registration.peers)?;

        let broker = Arc::new(MessageBroker::with_config(config.broker.into()));
        let link = Link::new(local.clone(), broker, transport);

        EldActor::spawn(link.clone(), membership.clone())?;
        EpfdActor::spawn(link.clone(), membership.clone(), config.detector.into())?;

        let store = Arc::new(CommitStore::new(local.owner.clone()));
        let systems = ConsensusSystems::new(
            link.clone(),
            membership.clone(),
            store.clone(),
            config.consensus,
        );
        let (sink, outcomes) = ChannelOutcomeSink::channel();
        SbacActor::spawn(
            link.clone(),
            membership.clone(),
            store.clone(),
            systems.clone(),
            Arc::new(sink),
        )?;

        registrar.watch(link.clone());
        info!(
            "[node] {} started with rank {} ({} peers, shards {:?})",
            local,
            local.rank,
            membership.peers().len() + membership.remote_nodes().len(),
            membership.shards()
        );

        Ok(NodeHandle {
            link,
            membership,
            store,
            systems,
            outcomes: Mutex::new(Some(outcomes)),
        })
    }
}

/// Control surface of a running node.
pub struct NodeHandle {
    link: Link,
    membership: Arc<Membership>,
    store: Arc<CommitStore>,
    systems: ConsensusSystems,
    outcomes: Mutex<Option<mpsc::UnboundedReceiver<AllPrepared>>>,
}

impl NodeHandle {
    /// This process.
    pub fn process(&self) -> &ProcessId {
        self.link.local()
    }

    /// Messaging handle (inbound delivery for transports).
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Process registry.
    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    /// Leader of this process's shard as currently trusted.
    pub fn leader(&self) -> Option<ProcessId> {
        self.membership.local_leader()
    }

    /// Ask this process to run the commit of `transaction`.
    pub fn request_prepare(&self, transaction: Transaction) {
        self.link.trigger(Message::new(
            Scope::Process,
            AbstractionId::Sbac,
            Payload::SbacPrepare(transaction),
        ));
    }

    /// A process registered after this one started.
    pub fn on_peer_joined(&self, peer: ProcessId) {
        self.link.trigger(Message::new(
            Scope::Process,
            AbstractionId::Eld,
            Payload::PeerJoined(peer),
        ));
    }

    /// Balances of the accounts owned by this shard.
    pub fn balances(&self) -> Balances {
        self.store.balances()
    }

    /// Finalized transactions in decision order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.store.transactions()
    }

    /// Whether consensus system `system_id` is running here.
    pub fn is_open(&self, system_id: &str) -> bool {
        self.systems.is_open(system_id)
    }

    /// Whether consensus system `system_id` already decided here.
    pub fn is_decided(&self, system_id: &str) -> bool {
        self.systems.is_decided(system_id)
    }

    /// Decode an inbound frame and route it.
    pub fn deliver(&self, frame: &[u8]) -> Result<Delivery, RuntimeError> {
        let message = codec::decode_frame(frame)?;
        Ok(self.link.broker().send(message)?)
    }

    /// Outcome stream. Can be taken once.
    pub fn outcomes(&self) -> Option<mpsc::UnboundedReceiver<AllPrepared>> {
        self.outcomes.lock().take()
    }

    /// Stop every actor of this node.
    pub fn shutdown(&self) {
        self.link.broker().shutdown();
        info!("[node] {} stopped", self.link.local());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistrar;
    use shared_bus::NullTransport;
    use shared_types::{TransactionAction, TransactionStatus};
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_single_node_deposit() {
        let registrar = InMemoryRegistrar::new();
        let node = Node::start(&NodeConfig::default(), &registrar, Arc::new(NullTransport)).unwrap();
        assert_eq!(node.leader(), Some(node.process().clone()));

        let mut outcomes = node.outcomes().unwrap();
        assert!(node.outcomes().is_none());

        let deposit = Transaction::deposit("A", 100, "x");
        let id = deposit.id.clone();
        node.request_prepare(deposit);
        let outcome = timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.action, TransactionAction::Commit);
        assert_eq!(node.balances().get("A"), Some(&100));
        assert_eq!(node.transactions()[0].status, TransactionStatus::Accepted);
        for phase in ["prepare", "accept"] {
            let system = format!("{id}-{phase}");
            assert!(node.is_decided(&system), "{system} not decided");
            assert!(!node.is_open(&system), "{system} still open");
        }
        node.shutdown();
    }

    #[tokio::test]
    async fn test_deliver_decodes_frames() {
        let registrar = InMemoryRegistrar::new();
        let node = Node::start(&NodeConfig::default(), &registrar, Arc::new(NullTransport)).unwrap();
        let frame = codec::encode_frame(&Message::new(
            Scope::Process,
            AbstractionId::Epfd,
            Payload::HeartbeatReply,
        ))
        .unwrap();
        assert_eq!(node.deliver(&frame).unwrap(), Delivery::Enqueued);
        assert!(matches!(node.deliver(&frame[..2]), Err(RuntimeError::Codec(_))));
        node.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let registrar = InMemoryRegistrar::new();
        let mut config = NodeConfig::default();
        config.node.alias.clear();
        assert!(matches!(
            Node::start(&config, &registrar, Arc::new(NullTransport)),
            Err(RuntimeError::Config(_))
        ));
    }
}
