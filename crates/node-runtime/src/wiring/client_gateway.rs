//! Client boundary: transaction submission and outcome collection.

use crate::error::RuntimeError;
use parking_lot::{Mutex, RwLock};
use sc_03_atomic_commit::AllPrepared;
use shared_bus::{Transport, TransportError};
use shared_types::{AbstractionId, Message, Payload, ProcessId, Scope, Transaction, TxId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Submits transactions and gathers the outcomes reported by the nodes.
pub struct ClientGateway {
    transport: Arc<dyn Transport>,
    directory: RwLock<Vec<ProcessId>>,
    outcomes: Mutex<HashMap<TxId, Vec<AllPrepared>>>,
    notify: Notify,
}

impl ClientGateway {
    /// Gateway sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            directory: RwLock::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        })
    }

    /// Make `process` a submission target.
    pub fn add_process(&self, process: ProcessId) {
        let mut directory = self.directory.write();
        if !directory.contains(&process) {
            directory.push(process);
        }
    }

    /// Submission targets of `transaction`: every known process of its shards.
    pub fn targets(&self, transaction: &Transaction) -> Vec<ProcessId> {
        self.directory
            .read()
            .iter()
            .filter(|p| transaction.touches(&p.owner))
            .cloned()
            .collect()
    }

    /// Ask every process of the transaction's shards to prepare it.
    ///
    /// Returns the number of processes reached. Fails only when none was.
    pub fn submit(&self, transaction: &Transaction) -> Result<usize, RuntimeError> {
        let targets = self.targets(transaction);
        if targets.is_empty() {
            return Err(RuntimeError::Unroutable {
                tx: transaction.id.clone(),
            });
        }

        let mut reached = 0;
        let mut last_error: Option<TransportError> = None;
        for target in &targets {
            let request = Message::new(
                Scope::Process,
                AbstractionId::Sbac,
                Payload::SbacPrepare(transaction.clone()),
            );
            match self.transport.send(target, &request) {
                Ok(()) => reached += 1,
                Err(e) => {
                    debug!("[gateway] {} unreachable: {}", target, e);
                    last_error = Some(e);
                }
            }
        }

        match (reached, last_error) {
            (0, Some(e)) => Err(e.into()),
            _ => {
                info!(
                    "[gateway] Submitted {} to {}/{} processes",
                    transaction.id,
                    reached,
                    targets.len()
                );
                Ok(reached)
            }
        }
    }

    /// Record outcomes from a node's stream until it closes.
    pub fn attach(self: &Arc<Self>, mut outcomes: mpsc::UnboundedReceiver<AllPrepared>) {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(outcome) = outcomes.recv().await {
                gateway.record(outcome);
            }
        });
    }

    /// Record one reported outcome.
    pub fn record(&self, outcome: AllPrepared) {
        {
            let mut outcomes = self.outcomes.lock();
            let reports = outcomes.entry(outcome.transaction.id.clone()).or_default();
            if let Some(first) = reports.first() {
                if first.action != outcome.action {
                    warn!(
                        "[gateway] {} reported {:?} after {:?}",
                        outcome.reporter, outcome.action, first.action
                    );
                }
            }
            reports.push(outcome);
        }
        self.notify.notify_waiters();
    }

    /// Outcomes reported so far for `tx_id`.
    pub fn outcome(&self, tx_id: &str) -> Vec<AllPrepared> {
        self.outcomes.lock().get(tx_id).cloned().unwrap_or_default()
    }

    /// Wait until `reporters` processes have reported `tx_id`.
    ///
    /// Returns `None` on timeout.
    pub async fn wait_for_outcome(
        &self,
        tx_id: &str,
        reporters: usize,
        wait: Duration,
    ) -> Option<Vec<AllPrepared>> {
        tokio::time::timeout(wait, async {
            loop {
                let notified = self.notify.notified();
                let reports = self.outcome(tx_id);
                if reports.len() >= reporters {
                    return reports;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }
}
