//! Leader detector actor.
//!
//! Publishes `Trust(leader)` to the epoch-change actor of every open
//! consensus system and, when this process becomes leader, announces it
//! to every process of the other shards.

use crate::domain::LeaderDetector;
use sc_telemetry::LEADER_CHANGES;
use shared_bus::{BrokerError, Handled, Handler, Link};
use shared_types::{AbstractionId, Membership, Message, Payload, ProcessId, Scope};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Leader detector bound to the process scope.
pub struct EldActor {
    detector: LeaderDetector,
    link: Link,
    membership: Arc<Membership>,
}

impl EldActor {
    /// Elect the initial leader and subscribe.
    pub fn spawn(link: Link, membership: Arc<Membership>) -> Result<(), BrokerError> {
        let mut actor = Self {
            detector: LeaderDetector::new(),
            link: link.clone(),
            membership,
        };
        actor.recompute();
        link.broker()
            .subscribe(Scope::Process, AbstractionId::Eld, actor)
    }

    fn recompute(&mut self) {
        let members = self.membership.local_shard_nodes();
        if let Some(leader) = self.detector.recompute(&members) {
            self.publish(leader);
        }
    }

    fn publish(&self, leader: ProcessId) {
        // Registry first: systems opened from now on read the new leader.
        self.membership.set_local_leader(Some(leader.clone()));
        LEADER_CHANGES.inc();
        info!("[eld] Trusting {}", leader);

        for scope in self.link.broker().scopes_with(AbstractionId::Ec) {
            self.link.trigger(Message::new(
                scope,
                AbstractionId::Ec,
                Payload::Trust(leader.clone()),
            ));
        }

        if leader == *self.link.local() {
            let remote = self.membership.remote_nodes();
            if !remote.is_empty() {
                self.link.broadcast(
                    &remote,
                    Message::new(Scope::Process, AbstractionId::Eld, Payload::Trust(leader)),
                );
            }
        }
    }

    fn on_peer_joined(&mut self, peer: ProcessId) -> Handled {
        match self.membership.add_process(peer.clone()) {
            Ok(true) => {}
            Ok(false) => return Handled::Ignored,
            Err(e) => {
                warn!("[eld] Rejected peer {}: {}", peer, e);
                return Handled::Ignored;
            }
        }

        if peer.owner == self.membership.local_shard() {
            self.recompute();
        } else if self.membership.is_local_leader() {
            // The newcomer has not heard our announcement yet.
            let _ = self.link.send_to(
                &peer,
                Message::new(
                    Scope::Process,
                    AbstractionId::Eld,
                    Payload::Trust(self.link.local().clone()),
                ),
            );
        }
        Handled::Consumed
    }
}

impl Handler for EldActor {
    fn handle(&mut self, message: Message) -> Handled {
        let local_shard = self.membership.local_shard().to_string();
        match message.payload {
            Payload::Suspect(peer) => {
                let members = self.membership.local_shard_nodes();
                if let Some(leader) = self.detector.suspect(peer, &members) {
                    self.publish(leader);
                }
                Handled::Consumed
            }
            Payload::Restore(peer) => {
                let members = self.membership.local_shard_nodes();
                if let Some(leader) = self.detector.restore(&peer, &members) {
                    self.publish(leader);
                }
                Handled::Consumed
            }
            Payload::PeerJoined(peer) => self.on_peer_joined(peer),
            Payload::Trust(leader) if leader.owner != local_shard => {
                let leader = self.membership.resolve(&leader).unwrap_or(leader);
                self.membership.set_external_leader(leader);
                Handled::Consumed
            }
            other => {
                debug!("[eld] Ignoring {}", other.name());
                Handled::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{cluster_member, CapturingTransport};
    use shared_bus::{MessageBroker, RecordingHandler};
    use tokio::time::{sleep, timeout, Duration};

    struct Fixture {
        link: Link,
        membership: Arc<Membership>,
        transport: Arc<CapturingTransport>,
    }

    fn fixture(local_index: u32) -> Fixture {
        let local = cluster_member("x", local_index);
        let membership = Arc::new(Membership::new(local.clone()).unwrap());
        membership
            .add_processes((1..=3).map(|i| cluster_member("x", i)))
            .unwrap();
        membership
            .add_processes((1..=2).map(|i| cluster_member("y", i)))
            .unwrap();
        let transport = Arc::new(CapturingTransport::default());
        let link = Link::new(local, Arc::new(MessageBroker::new()), transport.clone());
        Fixture {
            link,
            membership,
            transport,
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_leader_announced_to_other_shards() {
        let f = fixture(3);
        EldActor::spawn(f.link.clone(), f.membership.clone()).unwrap();

        assert!(f.membership.is_local_leader());
        assert_eq!(
            f.transport.destinations(Payload::Trust(cluster_member("x", 3)).name()),
            vec![cluster_member("y", 1), cluster_member("y", 2)]
        );
    }

    #[tokio::test]
    async fn test_follower_does_not_announce() {
        let f = fixture(1);
        EldActor::spawn(f.link.clone(), f.membership.clone()).unwrap();

        assert_eq!(f.membership.local_leader(), Some(cluster_member("x", 3)));
        assert_eq!(f.transport.count("trust"), 0);
    }

    #[tokio::test]
    async fn test_suspect_republishes_to_open_systems() {
        let f = fixture(1);
        let scope = Scope::system("t1-prepare");
        let (ec, mut ec_rx) = RecordingHandler::channel();
        f.link
            .broker()
            .subscribe(scope.clone(), AbstractionId::Ec, ec)
            .unwrap();
        EldActor::spawn(f.link.clone(), f.membership.clone()).unwrap();

        // Initial election already published to the open system.
        let first = timeout(Duration::from_secs(1), ec_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.payload, Payload::Trust(cluster_member("x", 3)));

        f.link.trigger(Message::new(
            Scope::Process,
            AbstractionId::Eld,
            Payload::Suspect(cluster_member("x", 3)),
        ));
        let second = timeout(Duration::from_secs(1), ec_rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.payload, Payload::Trust(cluster_member("x", 2)));
        assert_eq!(f.membership.local_leader(), Some(cluster_member("x", 2)));
    }

    #[tokio::test]
    async fn test_external_trust_recorded() {
        let f = fixture(1);
        EldActor::spawn(f.link.clone(), f.membership.clone()).unwrap();

        f.link.deliver(
            Message::new(
                Scope::Process,
                AbstractionId::Eld,
                Payload::Trust(cluster_member("y", 2)),
            )
            .from(cluster_member("y", 2)),
        );
        let membership = f.membership.clone();
        eventually(move || membership.external_leader("y") == Some(cluster_member("y", 2))).await;
    }

    #[tokio::test]
    async fn test_higher_rank_join_takes_leadership() {
        let f = fixture(3);
        EldActor::spawn(f.link.clone(), f.membership.clone()).unwrap();
        assert!(f.membership.is_local_leader());

        f.link.trigger(Message::new(
            Scope::Process,
            AbstractionId::Eld,
            Payload::PeerJoined(cluster_member("x", 4)),
        ));
        let membership = f.membership.clone();
        eventually(move || membership.local_leader() == Some(cluster_member("x", 4))).await;
    }
}
