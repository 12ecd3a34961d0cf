//! # Links
//!
//! Point-to-point send, best-effort broadcast and local delivery on top of
//! the broker and a [`Transport`].
//!
//! Sends to the local process never touch the transport; they are looped
//! back into the broker.

use crate::broker::{BrokerError, Delivery, MessageBroker};
use crate::transport::{Transport, TransportError};
use sc_telemetry::MESSAGES_DROPPED;
use shared_types::{Message, ProcessId};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Messaging handle shared by every actor of a process.
#[derive(Clone)]
pub struct Link {
    local: ProcessId,
    broker: Arc<MessageBroker>,
    transport: Arc<dyn Transport>,
}

impl Link {
    /// Create a link for `local`.
    pub fn new(local: ProcessId, broker: Arc<MessageBroker>, transport: Arc<dyn Transport>) -> Self {
        Self {
            local,
            broker,
            transport,
        }
    }

    /// The local process.
    pub fn local(&self) -> &ProcessId {
        &self.local
    }

    /// The local broker.
    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    /// Enqueue a message for a local actor.
    pub fn trigger(&self, mut message: Message) {
        if message.sender.is_none() {
            message.sender = Some(self.local.clone());
        }
        self.deliver(message);
    }

    /// Hand an inbound message to the broker.
    pub fn deliver(&self, message: Message) -> Option<Delivery> {
        self.try_deliver(message).ok()
    }

    /// Hand an inbound message to the broker, reporting why it was refused.
    pub fn try_deliver(&self, message: Message) -> Result<Delivery, BrokerError> {
        let payload = message.payload.name();
        self.broker.send(message).map_err(|e| {
            match &e {
                BrokerError::Closed => debug!(payload, "Broker closed, message discarded"),
                _ => error!(payload, error = %e, "Failed to enqueue message"),
            }
            e
        })
    }

    /// Send to one process. Failures are reported, not retried.
    pub fn send_to(&self, destination: &ProcessId, message: Message) -> Result<(), TransportError> {
        let message = message.from(self.local.clone());
        if *destination == self.local {
            self.deliver(message);
            return Ok(());
        }

        self.transport.send(destination, &message).map_err(|e| {
            warn!(
                peer = %destination,
                payload = message.payload.name(),
                error = %e,
                "Point-to-point send failed"
            );
            MESSAGES_DROPPED.with_label_values(&["transport"]).inc();
            e
        })
    }

    /// Best-effort fan-out to `targets`. Each copy gets its own message id.
    ///
    /// Returns the number of sends handed to the network or looped back.
    pub fn broadcast(&self, targets: &[ProcessId], message: Message) -> usize {
        let mut sent = 0;
        for target in targets {
            let mut copy = message.clone();
            copy.id = Uuid::new_v4();
            if self.send_to(target, copy).is_ok() {
                sent += 1;
            }
        }
        debug!(
            payload = message.payload.name(),
            targets = targets.len(),
            sent,
            "Broadcast"
        );
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RecordingHandler;
    use parking_lot::Mutex;
    use shared_types::{AbstractionId, Payload, Scope};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct CapturingTransport {
        sent: Mutex<Vec<(ProcessId, Message)>>,
    }

    impl Transport for CapturingTransport {
        fn send(&self, destination: &ProcessId, message: &Message) -> Result<(), TransportError> {
            if destination.index == 99 {
                return Err(TransportError::Unreachable {
                    peer: destination.to_string(),
                });
            }
            self.sent.lock().push((destination.clone(), message.clone()));
            Ok(())
        }
    }

    fn process(index: u32) -> ProcessId {
        ProcessId::new("127.0.0.1", 5000 + index as u16, "x", index).with_rank(index)
    }

    #[tokio::test]
    async fn test_loopback_skips_transport() {
        let broker = Arc::new(MessageBroker::new());
        let transport = Arc::new(CapturingTransport::default());
        let link = Link::new(process(1), broker.clone(), transport.clone());

        let (handler, mut rx) = RecordingHandler::channel();
        broker.subscribe(Scope::Process, AbstractionId::Epfd, handler).unwrap();

        let msg = Message::new(Scope::Process, AbstractionId::Epfd, Payload::HeartbeatRequest);
        link.send_to(&process(1), msg).unwrap();

        let received = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.sender, Some(process(1)));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_counts_successful_sends() {
        let broker = Arc::new(MessageBroker::new());
        let transport = Arc::new(CapturingTransport::default());
        let link = Link::new(process(1), broker, transport.clone());

        let targets = vec![process(2), process(3), process(99)];
        let msg = Message::new(Scope::system("t"), AbstractionId::Ep(0), Payload::Read);
        assert_eq!(link.broadcast(&targets, msg), 2);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].1.id, sent[1].1.id);
        assert!(sent.iter().all(|(_, m)| m.sender == Some(process(1))));
    }
}
