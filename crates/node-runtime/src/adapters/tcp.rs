//! TCP transport.
//!
//! Each destination gets one lazily opened outbound stream fed by a
//! writer task. A failed connect or write ends that task; the next send
//! opens a fresh one. Frames are `u32` big-endian length + bincode body.

use parking_lot::Mutex;
use sc_telemetry::MESSAGES_DROPPED;
use shared_bus::{BrokerError, Link, Transport, TransportError};
use shared_types::{codec, Message, ProcessId};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound half of the TCP network.
pub struct TcpTransport {
    runtime: Handle,
    writers: Mutex<HashMap<ProcessId, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl TcpTransport {
    /// Transport bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Transport spawning its writers on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            writers: Mutex::new(HashMap::new()),
        }
    }

    fn writer_for(&self, destination: &ProcessId) -> mpsc::UnboundedSender<Vec<u8>> {
        let mut writers = self.writers.lock();
        if let Some(writer) = writers.get(destination) {
            if !writer.is_closed() {
                return writer.clone();
            }
        }
        let (writer, frames) = mpsc::unbounded_channel();
        self.runtime.spawn(write_loop(destination.clone(), frames));
        writers.insert(destination.clone(), writer.clone());
        writer
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn send(&self, destination: &ProcessId, message: &Message) -> Result<(), TransportError> {
        let frame =
            codec::encode_frame(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        if self.writer_for(destination).send(frame).is_err() {
            MESSAGES_DROPPED.with_label_values(&["transport"]).inc();
            return Err(TransportError::Unreachable {
                peer: destination.to_string(),
            });
        }
        Ok(())
    }
}

async fn write_loop(peer: ProcessId, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) {
    let mut stream = match TcpStream::connect((peer.host.as_str(), peer.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("[tcp] Connect to {} failed: {}", peer, e);
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    while let Some(frame) = frames.recv().await {
        if let Err(e) = stream.write_all(&frame).await {
            warn!("[tcp] Write to {} failed: {}", peer, e);
            return;
        }
    }
}

/// Accept inbound connections and hand every decoded frame to `link`.
pub fn spawn_listener(listener: TcpListener, link: Link) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(read_loop(stream, addr, link.clone()));
                }
                Err(e) => {
                    warn!("[tcp] Accept failed: {}", e);
                    break;
                }
            }
        }
    })
}

async fn read_loop(mut stream: TcpStream, addr: SocketAddr, link: Link) {
    debug!("[tcp] Connection from {}", addr);
    let mut header = [0u8; codec::FRAME_HEADER_LEN];
    loop {
        if stream.read_exact(&mut header).await.is_err() {
            break;
        }
        let len = match codec::frame_len(header) {
            Ok(len) => len,
            Err(e) => {
                warn!("[tcp] Bad frame from {}: {}", addr, e);
                break;
            }
        };
        let mut body = vec![0u8; len];
        if stream.read_exact(&mut body).await.is_err() {
            break;
        }
        match codec::decode(&body) {
            Ok(message) => match link.try_deliver(message) {
                Ok(_) => {}
                Err(BrokerError::Closed) => break,
                // One saturated actor must not cost the rest of the stream.
                Err(e) => debug!("[tcp] Frame from {} not delivered: {}", addr, e),
            },
            Err(e) => warn!("[tcp] Undecodable frame from {}: {}", addr, e),
        }
    }
    info!("[tcp] Connection from {} closed", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{BrokerConfig, Handled, Handler, MessageBroker, NullTransport, RecordingHandler};
    use shared_types::{AbstractionId, Payload, Scope, Transaction};
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_frames_cross_a_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = ProcessId::new("127.0.0.1", port, "x", 1).with_rank(1);

        let broker = Arc::new(MessageBroker::new());
        let (handler, mut rx) = RecordingHandler::channel();
        broker
            .subscribe(Scope::Process, AbstractionId::Sbac, handler)
            .unwrap();
        let inbound = Link::new(receiver.clone(), broker, Arc::new(NullTransport));
        spawn_listener(listener, inbound);

        let transport = TcpTransport::new();
        let tx = Transaction::deposit("A", 3, "x");
        for _ in 0..2 {
            transport
                .send(
                    &receiver,
                    &Message::new(
                        Scope::Process,
                        AbstractionId::Sbac,
                        Payload::SbacPrepare(tx.clone()),
                    ),
                )
                .unwrap();
        }

        for _ in 0..2 {
            let got = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            assert_eq!(got.payload, Payload::SbacPrepare(tx.clone()));
        }
    }

    /// Blocks on its first message until the gate is dropped.
    struct GatedHandler {
        gate: Option<std::sync::mpsc::Receiver<()>>,
        seen: tokio::sync::mpsc::UnboundedSender<Message>,
    }

    impl Handler for GatedHandler {
        fn handle(&mut self, message: Message) -> Handled {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            let _ = self.seen.send(message);
            Handled::Consumed
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_keeps_connection_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = ProcessId::new("127.0.0.1", port, "x", 1).with_rank(1);

        let broker = Arc::new(MessageBroker::with_config(BrokerConfig {
            queue_capacity: 1,
            ..Default::default()
        }));
        let (release, gate) = std::sync::mpsc::channel();
        let (seen, mut rx) = tokio::sync::mpsc::unbounded_channel();
        broker
            .subscribe(
                Scope::Process,
                AbstractionId::Sbac,
                GatedHandler {
                    gate: Some(gate),
                    seen,
                },
            )
            .unwrap();
        let inbound = Link::new(receiver.clone(), broker.clone(), Arc::new(NullTransport));
        spawn_listener(listener, inbound);

        let transport = TcpTransport::new();
        let frame = |id: &str| {
            Message::new(
                Scope::Process,
                AbstractionId::Sbac,
                Payload::SbacPrepare(Transaction::deposit("A", 3, "x").with_id(id)),
            )
        };
        // The handler holds the first, the queue holds one more; the rest overflow.
        for i in 0..4 {
            transport.send(&receiver, &frame(&format!("t{i}"))).unwrap();
        }
        timeout(Duration::from_secs(2), async {
            while broker.messages_dropped() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("no frame overflowed the queue");

        drop(release);
        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first.payload, Payload::SbacPrepare(_)));
        // Let the actor drain what was queued behind the first frame.
        tokio::time::sleep(Duration::from_millis(100)).await;
        transport.send(&receiver, &frame("after")).unwrap();

        let arrived = timeout(Duration::from_secs(2), async {
            loop {
                let got = rx.recv().await.unwrap();
                if let Payload::SbacPrepare(tx) = got.payload {
                    if tx.id == "after" {
                        return;
                    }
                }
            }
        })
        .await;
        assert!(arrived.is_ok(), "frame after the overflow was lost");
    }
}
