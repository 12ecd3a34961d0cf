//! Failure detector actor.
//!
//! Owns the round timer: each `EpfdTimeout` closes a round, forwards
//! suspicion changes to the leader detector, pings every shard peer and
//! re-arms the timer with the current delay. Once the route is stopped the
//! timer is no longer re-armed.

use crate::domain::{DetectorConfig, FailureDetector, SuspicionEvent};
use sc_telemetry::{RESTORES, SUSPICIONS};
use shared_bus::{BrokerError, Handled, Handler, Link};
use shared_types::{AbstractionId, Membership, Message, Payload, Scope};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Failure detector bound to the process scope.
pub struct EpfdActor {
    detector: FailureDetector,
    link: Link,
    membership: Arc<Membership>,
}

impl EpfdActor {
    /// Subscribe the detector and arm its first round.
    pub fn spawn(
        link: Link,
        membership: Arc<Membership>,
        config: DetectorConfig,
    ) -> Result<(), BrokerError> {
        let detector = FailureDetector::new(&membership.peers(), config);
        let delay = detector.delay();
        let actor = Self {
            detector,
            link: link.clone(),
            membership,
        };
        link.broker()
            .subscribe(Scope::Process, AbstractionId::Epfd, actor)?;
        arm_timer(&link, delay);
        info!("[epfd] Started with round delay {:?}", delay);
        Ok(())
    }

    fn on_timeout(&mut self) -> Handled {
        let peers = self.membership.peers();
        let outcome = self.detector.close_round(&peers);
        if outcome.delay_increased {
            info!("[epfd] False suspicion detected, round delay now {:?}", outcome.delay);
        }

        for event in outcome.events {
            let payload = match event {
                SuspicionEvent::Suspect(peer) => {
                    info!("[epfd] Suspecting {}", peer);
                    SUSPICIONS.inc();
                    Payload::Suspect(peer)
                }
                SuspicionEvent::Restore(peer) => {
                    info!("[epfd] Restoring {}", peer);
                    RESTORES.inc();
                    Payload::Restore(peer)
                }
            };
            self.link
                .trigger(Message::new(Scope::Process, AbstractionId::Eld, payload));
        }

        for peer in &outcome.ping {
            let request =
                Message::new(Scope::Process, AbstractionId::Epfd, Payload::HeartbeatRequest);
            // Send failures surface as missing replies next round.
            let _ = self.link.send_to(peer, request);
        }

        arm_timer(&self.link, outcome.delay);
        Handled::Consumed
    }
}

impl Handler for EpfdActor {
    fn handle(&mut self, message: Message) -> Handled {
        match (message.payload, message.sender) {
            (Payload::EpfdTimeout, _) => self.on_timeout(),
            (Payload::HeartbeatRequest, Some(sender)) => {
                let reply =
                    Message::new(Scope::Process, AbstractionId::Epfd, Payload::HeartbeatReply);
                let _ = self.link.send_to(&sender, reply);
                Handled::Consumed
            }
            (Payload::HeartbeatReply, Some(sender)) => {
                match self.membership.resolve(&sender) {
                    Some(peer) if peer.owner == self.membership.local_shard() => {
                        self.detector.record_reply(&peer);
                        Handled::Consumed
                    }
                    _ => {
                        debug!("[epfd] Reply from unknown peer {}", sender);
                        Handled::Ignored
                    }
                }
            }
            _ => Handled::Ignored,
        }
    }
}

/// Schedule the next round.
fn arm_timer(link: &Link, delay: Duration) {
    let link = link.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if link
            .broker()
            .is_subscribed(&Scope::Process, AbstractionId::Epfd)
        {
            link.trigger(Message::new(
                Scope::Process,
                AbstractionId::Epfd,
                Payload::EpfdTimeout,
            ));
        }
    });
}
