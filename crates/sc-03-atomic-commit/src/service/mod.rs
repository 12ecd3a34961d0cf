//! Commit actor wired to the broker.

pub mod sbac;

pub use sbac::SbacActor;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommitStore;
    use crate::ports::{AllPrepared, ChannelOutcomeSink};
    use parking_lot::Mutex;
    use sc_02_consensus::{ConsensusConfig, ConsensusSystems};
    use shared_bus::{Link, MessageBroker, Transport, TransportError};
    use shared_types::{
        AbstractionId, Membership, Message, Payload, ProcessId, Scope, Transaction,
        TransactionAction, TransactionStatus,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{timeout, Duration};

    #[derive(Default)]
    struct Mesh {
        brokers: Mutex<HashMap<ProcessId, Arc<MessageBroker>>>,
    }

    impl Transport for Mesh {
        fn send(&self, destination: &ProcessId, message: &Message) -> Result<(), TransportError> {
            let broker = self.brokers.lock().get(destination).cloned();
            match broker {
                Some(broker) => {
                    let _ = broker.send(message.clone());
                    Ok(())
                }
                None => Err(TransportError::Unreachable {
                    peer: destination.to_string(),
                }),
            }
        }
    }

    struct Node {
        link: Link,
        store: Arc<CommitStore>,
        outcomes: UnboundedReceiver<AllPrepared>,
    }

    impl Node {
        fn request_prepare(&self, tx: &Transaction) {
            self.link.trigger(Message::new(
                Scope::Process,
                AbstractionId::Sbac,
                Payload::SbacPrepare(tx.clone()),
            ));
        }

        async fn outcome(&mut self) -> AllPrepared {
            timeout(Duration::from_secs(5), self.outcomes.recv())
                .await
                .expect("timeout waiting for outcome")
                .expect("outcome channel closed")
        }
    }

    /// One process in each of the shards `x` and `y`.
    fn two_shards() -> (Node, Node) {
        let mesh = Arc::new(Mesh::default());
        let x = ProcessId::new("127.0.0.1", 7001, "x", 1).with_rank(1);
        let y = ProcessId::new("127.0.0.1", 7002, "y", 1).with_rank(2);
        let everyone = vec![x.clone(), y.clone()];

        let mut nodes = everyone.iter().map(|local| {
            let membership = Arc::new(Membership::new(local.clone()).unwrap());
            membership.add_processes(everyone.clone()).unwrap();
            membership.set_local_leader(Some(local.clone()));

            let broker = Arc::new(MessageBroker::new());
            mesh.brokers.lock().insert(local.clone(), broker.clone());
            let link = Link::new(local.clone(), broker, mesh.clone());

            let store = Arc::new(CommitStore::new(local.owner.clone()));
            let systems = ConsensusSystems::new(
                link.clone(),
                membership.clone(),
                store.clone(),
                ConsensusConfig::default(),
            );
            let (sink, outcomes) = ChannelOutcomeSink::channel();
            SbacActor::spawn(link.clone(), membership, store.clone(), systems, Arc::new(sink))
                .unwrap();
            Node {
                link,
                store,
                outcomes,
            }
        });
        let x = nodes.next().unwrap();
        let y = nodes.next().unwrap();
        (x, y)
    }

    #[tokio::test]
    async fn test_deposit_accepted() {
        let (mut x, _y) = two_shards();
        let tx = Transaction::deposit("A", 100, "x");
        x.request_prepare(&tx);

        let outcome = x.outcome().await;
        assert_eq!(outcome.action, TransactionAction::Commit);
        assert_eq!(outcome.transaction.status, TransactionStatus::Accepted);
        assert_eq!(x.store.balances().get("A"), Some(&100));
        assert_eq!(x.store.lock_holder("A"), None);
    }

    #[tokio::test]
    async fn test_overdraft_rejected() {
        let (mut x, _y) = two_shards();
        let deposit = Transaction::deposit("A", 10, "x");
        x.request_prepare(&deposit);
        x.outcome().await;

        let transfer = Transaction::transfer("A", "B", 40, "x", "x");
        x.request_prepare(&transfer);
        let outcome = x.outcome().await;
        assert_eq!(outcome.action, TransactionAction::Abort);
        assert_eq!(outcome.transaction.status, TransactionStatus::Rejected);
        assert_eq!(x.store.balances().get("A"), Some(&10));
    }

    #[tokio::test]
    async fn test_cross_shard_transfer() {
        let (mut x, mut y) = two_shards();
        x.request_prepare(&Transaction::deposit("A", 50, "x"));
        x.outcome().await;

        let transfer = Transaction::transfer("A", "C", 20, "x", "y");
        x.request_prepare(&transfer);
        y.request_prepare(&transfer);

        let (on_x, on_y) = (x.outcome().await, y.outcome().await);
        assert_eq!(on_x.action, TransactionAction::Commit);
        assert_eq!(on_y.action, TransactionAction::Commit);
        assert_eq!(x.store.balances().get("A"), Some(&30));
        assert_eq!(y.store.balances().get("C"), Some(&20));
    }

    #[tokio::test]
    async fn test_cross_shard_abort_propagates() {
        let (mut x, mut y) = two_shards();
        // "A" holds nothing on x: x votes Abort, y would commit.
        let transfer = Transaction::transfer("A", "C", 20, "x", "y");
        x.request_prepare(&transfer);
        y.request_prepare(&transfer);

        assert_eq!(x.outcome().await.action, TransactionAction::Abort);
        assert_eq!(y.outcome().await.action, TransactionAction::Abort);
        assert_eq!(y.store.lock_holder("C"), None);
        assert!(y.store.balances().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_prepare_finalizes_once() {
        let (mut x, _y) = two_shards();
        let tx = Transaction::deposit("A", 5, "x");
        x.request_prepare(&tx);
        x.request_prepare(&tx);
        x.outcome().await;
        x.request_prepare(&tx);

        assert!(timeout(Duration::from_millis(200), x.outcomes.recv())
            .await
            .is_err());
        assert_eq!(x.store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_transaction_ignored() {
        let (mut x, _y) = two_shards();
        x.request_prepare(&Transaction::deposit("Z", 5, "y"));
        assert!(timeout(Duration::from_millis(200), x.outcomes.recv())
            .await
            .is_err());
    }
}
