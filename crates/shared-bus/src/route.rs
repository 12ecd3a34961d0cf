//! # Routes
//!
//! A route is one `(scope, abstraction)` queue drained by one actor. The
//! actor owns a [`Handler`] and runs each message through it in FIFO order.

use shared_types::{AbstractionId, Message, Scope};
use std::fmt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Routing key of an actor queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    /// Process-wide or a consensus system.
    pub scope: Scope,
    /// Addressed abstraction.
    pub abstraction: AbstractionId,
}

impl RouteKey {
    /// Create a key.
    pub fn new(scope: Scope, abstraction: AbstractionId) -> Self {
        Self { scope, abstraction }
    }

    /// Key of the route a message is addressed to.
    pub fn of(message: &Message) -> Self {
        Self::new(message.scope.clone(), message.abstraction)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.abstraction)
    }
}

/// Whether a handler acted on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The message was processed.
    Consumed,
    /// Stale, superseded or not applicable; dropped.
    Ignored,
}

/// A state machine driven by its route's messages.
pub trait Handler: Send + 'static {
    /// Process one message.
    fn handle(&mut self, message: Message) -> Handled;
}

/// Drain a route until its queue closes or its scope is cancelled.
///
/// Cancellation is observed between messages, never mid-handler.
pub(crate) async fn run_route(
    key: RouteKey,
    mut handler: Box<dyn Handler>,
    mut queue: mpsc::Receiver<Message>,
    mut cancel: watch::Receiver<bool>,
) {
    debug!(route = %key, "Route started");
    loop {
        if *cancel.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            next = queue.recv() => {
                let Some(message) = next else { break };
                let kind = message.payload.name();
                if handler.handle(message) == Handled::Ignored {
                    trace!(route = %key, payload = kind, "Message ignored");
                }
            }
        }
    }
    debug!(route = %key, "Route stopped");
}

// =============================================================================
// Recording Handler for Testing
// =============================================================================

/// Handler that forwards every message to a channel.
///
/// Useful for tests that observe what an actor emits.
pub struct RecordingHandler {
    sink: mpsc::UnboundedSender<Message>,
}

impl RecordingHandler {
    /// Create the handler and the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sink, rx) = mpsc::unbounded_channel();
        (Self { sink }, rx)
    }
}

impl Handler for RecordingHandler {
    fn handle(&mut self, message: Message) -> Handled {
        match self.sink.send(message) {
            Ok(()) => Handled::Consumed,
            Err(_) => Handled::Ignored,
        }
    }
}
