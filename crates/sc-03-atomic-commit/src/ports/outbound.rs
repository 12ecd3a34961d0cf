//! Driven ports (Outbound dependencies)

use shared_types::{ProcessId, Transaction, TransactionAction};
use tokio::sync::mpsc;
use tracing::debug;

/// Final outcome of a transaction as reported by one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllPrepared {
    /// Decided accept vote.
    pub action: TransactionAction,
    /// The transaction with its final status.
    pub transaction: Transaction,
    /// Process that finalized it.
    pub reporter: ProcessId,
}

/// Client-facing boundary receiving final outcomes.
pub trait OutcomeSink: Send + Sync {
    /// Called exactly once per finalized transaction.
    fn on_outcome(&self, outcome: AllPrepared);
}

/// Forwards outcomes into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelOutcomeSink {
    sender: mpsc::UnboundedSender<AllPrepared>,
}

impl ChannelOutcomeSink {
    /// Create the sink and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AllPrepared>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl OutcomeSink for ChannelOutcomeSink {
    fn on_outcome(&self, outcome: AllPrepared) {
        if self.sender.send(outcome).is_err() {
            debug!("[sbac] Outcome receiver dropped");
        }
    }
}
