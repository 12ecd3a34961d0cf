//! Sharded atomic commit actor.
//!
//! Drives every transaction through `Prepare -> Accept -> Finalized`:
//!
//! ```text
//! SbacPrepare(tx) ──► open "{tx}-prepare" ──UcDecide(Prepared)──► record vote ─┐
//!                                             (leader) SbacLocalPrepared ──► other shard
//! SbacLocalPrepared ─────────────────────────────────────────► record vote ─┤
//!                                                                            ▼
//!                 all shards voted, or any Abort ──► open "{tx}-accept" (once)
//!                                                          │
//!                         UcDecide(Accept) ──► release locks, log, report outcome
//! ```

use crate::domain::{CommitError, CommitResult, CommitStore};
use crate::ports::{AllPrepared, OutcomeSink};
use sc_02_consensus::ConsensusSystems;
use sc_telemetry::{DUPLICATE_FINALIZATIONS, TRANSACTIONS_FINALIZED};
use shared_bus::{Handled, Handler, Link};
use shared_types::{
    AbstractionId, Membership, Message, Payload, Phase, Proposal, Scope, SystemId, Transaction,
    TransactionAction, TransactionStatus, Value,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Atomic commit bound to the process scope.
pub struct SbacActor {
    store: Arc<CommitStore>,
    systems: ConsensusSystems,
    link: Link,
    membership: Arc<Membership>,
    outcomes: Arc<dyn OutcomeSink>,
}

impl SbacActor {
    /// Subscribe `(Process, Sbac)`.
    pub fn spawn(
        link: Link,
        membership: Arc<Membership>,
        store: Arc<CommitStore>,
        systems: ConsensusSystems,
        outcomes: Arc<dyn OutcomeSink>,
    ) -> CommitResult<()> {
        let actor = Self {
            store,
            systems,
            link: link.clone(),
            membership,
            outcomes,
        };
        link.broker()
            .subscribe(Scope::Process, AbstractionId::Sbac, actor)?;
        Ok(())
    }

    fn local_shard(&self) -> &str {
        self.membership.local_shard()
    }

    fn open(&self, phase: Phase, transaction: Transaction) -> CommitResult<SystemId> {
        let system = self.systems.open(Proposal { phase, transaction })?;
        Ok(system)
    }

    fn on_prepare(&mut self, transaction: Transaction) -> CommitResult<SystemId> {
        if !transaction.touches(self.local_shard()) {
            return Err(CommitError::NotInvolved {
                tx: transaction.id,
                shard: self.local_shard().to_string(),
            });
        }
        if self.store.is_finalized(&transaction.id) {
            return Err(CommitError::AlreadyFinalized(transaction.id));
        }
        self.open(Phase::Prepare, transaction)
    }

    fn on_local_prepared(&mut self, action: TransactionAction, transaction: Transaction) {
        let local = self.local_shard().to_string();
        if !self.store.record_prepared(&transaction.id, &local, action) {
            debug!("[sbac] {} prepare vote of {} already recorded", transaction.id, local);
            return;
        }
        info!("[sbac] {} prepared {} on shard {}", transaction.id, action, local);

        if self.membership.is_local_leader() {
            if let Some(other) = transaction.other_shard(&local) {
                let nodes = self.membership.shard_nodes(other);
                self.link.broadcast(
                    &nodes,
                    Message::new(
                        Scope::Process,
                        AbstractionId::Sbac,
                        Payload::SbacLocalPrepared {
                            action,
                            transaction: transaction.clone(),
                            shard: local,
                        },
                    ),
                );
            }
        }
        self.check_all_prepared(transaction);
    }

    fn on_remote_prepared(&mut self, action: TransactionAction, transaction: Transaction, shard: String) {
        if shard == self.local_shard() || !transaction.touches(&shard) {
            debug!("[sbac] Ignoring prepare vote of {} for {}", shard, transaction.id);
            return;
        }
        if self.store.record_prepared(&transaction.id, &shard, action) {
            debug!("[sbac] {} prepared {} on shard {}", transaction.id, action, shard);
            self.check_all_prepared(transaction);
        }
    }

    fn check_all_prepared(&mut self, transaction: Transaction) {
        if !self.store.claim_accept(&transaction) {
            return;
        }
        let id = transaction.id.clone();
        if let Err(e) = self.open(Phase::Accept, transaction) {
            warn!("[sbac] {} could not open accept phase: {}", id, e);
        }
    }

    fn on_accepted(&mut self, action: TransactionAction, transaction: Transaction) {
        let Some(finalized) = self.store.finalize(&transaction, action) else {
            DUPLICATE_FINALIZATIONS.inc();
            warn!("[sbac] {} already finalized, decision ignored", transaction.id);
            return;
        };

        let status = match finalized.status {
            TransactionStatus::Accepted => "accepted",
            _ => "rejected",
        };
        TRANSACTIONS_FINALIZED.with_label_values(&[status]).inc();
        info!("[sbac] {} finalized as {}", finalized.id, status);
        info!(
            "[sbac] Ledger of shard {}: {:?}",
            self.local_shard(),
            self.store.balances()
        );
        info!(
            "[sbac] Transactions of shard {}: {:?}",
            self.local_shard(),
            self.store
                .transactions()
                .iter()
                .map(|t| (t.id.as_str(), t.status))
                .collect::<Vec<_>>()
        );

        self.outcomes.on_outcome(AllPrepared {
            action,
            transaction: finalized,
            reporter: self.link.local().clone(),
        });
    }
}

impl Handler for SbacActor {
    fn handle(&mut self, message: Message) -> Handled {
        match message.payload {
            Payload::SbacPrepare(transaction) => match self.on_prepare(transaction) {
                Ok(system) => {
                    debug!("[sbac] Opened {}", system);
                    Handled::Consumed
                }
                Err(e) => {
                    debug!("[sbac] Prepare request ignored: {}", e);
                    Handled::Ignored
                }
            },
            Payload::UcDecide(Value::Prepared {
                action,
                transaction,
                ..
            }) => {
                self.on_local_prepared(action, transaction);
                Handled::Consumed
            }
            Payload::UcDecide(Value::Accept {
                action,
                transaction,
            }) => {
                self.on_accepted(action, transaction);
                Handled::Consumed
            }
            Payload::SbacLocalPrepared {
                action,
                transaction,
                shard,
            } => {
                self.on_remote_prepared(action, transaction, shard);
                Handled::Consumed
            }
            _ => Handled::Ignored,
        }
    }
}
