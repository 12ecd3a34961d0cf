//! Per-process commit state.
//!
//! The lock table, the prepare votes, the transaction log and the set of
//! opened accept phases live behind one mutex. Every actor that touches
//! them (uniform consensus computing a vote, the commit actor recording
//! decisions) goes through this store.

use super::ledger::{fold_balances, Balances};
use parking_lot::Mutex;
use sc_02_consensus::VoteSource;
use shared_types::{
    AccountId, Phase, Proposal, ShardId, Transaction, TransactionAction, TransactionStatus, TxId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    /// Account -> transaction holding it.
    locks: HashMap<AccountId, TxId>,
    /// Finalized transactions in decision order.
    log: Vec<Transaction>,
    finalized: HashSet<TxId>,
    /// Decided prepare vote per shard, per transaction.
    prepared: HashMap<TxId, BTreeMap<ShardId, TransactionAction>>,
    accept_opened: HashSet<TxId>,
}

impl StoreState {
    fn try_lock_all(&mut self, tx: &TxId, accounts: &[&AccountId]) -> bool {
        let free = accounts
            .iter()
            .all(|a| self.locks.get(*a).map_or(true, |holder| holder == tx));
        if free {
            for account in accounts {
                self.locks.insert((*account).clone(), tx.clone());
            }
        }
        free
    }

    fn release(&mut self, tx: &TxId) {
        self.locks.retain(|_, holder| holder != tx);
    }
}

/// Commit state of one process.
#[derive(Debug)]
pub struct CommitStore {
    shard: ShardId,
    state: Mutex<StoreState>,
}

impl CommitStore {
    /// Empty store for a process of `shard`.
    pub fn new(shard: impl Into<ShardId>) -> Self {
        Self {
            shard: shard.into(),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Shard this store belongs to.
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Local prepare vote; locks the accounts this shard owns on `Commit`.
    ///
    /// - not one of the declared shards: `Abort`
    /// - already finalized here: `Abort`, nothing locked
    /// - deposit: `Commit`, `to` locked when free
    /// - transfer: every account this shard owns must be free (all or
    ///   nothing) and, on the debiting shard, the balance of `from` must
    ///   cover the amount
    pub fn prepared_action(&self, tx: &Transaction) -> TransactionAction {
        if !tx.touches(&self.shard) {
            return TransactionAction::Abort;
        }
        let mut state = self.state.lock();
        if state.finalized.contains(&tx.id) {
            return TransactionAction::Abort;
        }

        let Some(from) = &tx.from else {
            let to = tx.to.clone();
            state.try_lock_all(&tx.id, &[&to]);
            return TransactionAction::Commit;
        };

        let debits = tx.shard_out == self.shard;
        if debits {
            let balances = fold_balances(&self.shard, &state.log);
            let balance = balances.get(from).copied().unwrap_or(0);
            if balance < i64::try_from(tx.amount).unwrap_or(i64::MAX) {
                debug!("[sbac] {} insufficient funds on {} ({})", tx.id, from, balance);
                return TransactionAction::Abort;
            }
        }

        let mut owned: Vec<&AccountId> = Vec::with_capacity(2);
        if debits {
            owned.push(from);
        }
        if tx.shard_in == self.shard {
            owned.push(&tx.to);
        }
        if state.try_lock_all(&tx.id, &owned) {
            TransactionAction::Commit
        } else {
            debug!("[sbac] {} blocked by a held lock", tx.id);
            TransactionAction::Abort
        }
    }

    /// Merged vote: `Abort` if any recorded prepare vote is `Abort`.
    pub fn accept_action(&self, tx_id: &str) -> TransactionAction {
        let state = self.state.lock();
        let abort = state
            .prepared
            .get(tx_id)
            .map_or(true, |votes| votes.is_empty() || votes.values().any(|a| a.is_abort()));
        if abort {
            TransactionAction::Abort
        } else {
            TransactionAction::Commit
        }
    }

    /// Record the decided prepare vote of `shard`. Returns `false` if that
    /// shard's vote was already known.
    pub fn record_prepared(&self, tx_id: &str, shard: &str, action: TransactionAction) -> bool {
        let mut state = self.state.lock();
        if state.finalized.contains(tx_id) {
            return false;
        }
        let votes = state.prepared.entry(tx_id.to_string()).or_default();
        if votes.contains_key(shard) {
            return false;
        }
        votes.insert(shard.to_string(), action);
        true
    }

    /// Whether the accept phase of `tx` should open now. True exactly once:
    /// when every declared shard voted or any vote is `Abort`.
    pub fn claim_accept(&self, tx: &Transaction) -> bool {
        let mut state = self.state.lock();
        if state.finalized.contains(&tx.id) || state.accept_opened.contains(&tx.id) {
            return false;
        }
        let ready = state.prepared.get(&tx.id).is_some_and(|votes| {
            votes.values().any(|a| a.is_abort()) || votes.len() >= tx.required_votes()
        });
        if ready {
            state.accept_opened.insert(tx.id.clone());
        }
        ready
    }

    /// Apply the accept decision. Returns the finalized transaction, or
    /// `None` if it was already finalized.
    pub fn finalize(&self, tx: &Transaction, action: TransactionAction) -> Option<Transaction> {
        let mut state = self.state.lock();
        state.release(&tx.id);
        if !state.finalized.insert(tx.id.clone()) {
            return None;
        }
        state.prepared.remove(&tx.id);
        state.accept_opened.remove(&tx.id);

        let mut finalized = tx.clone();
        finalized.status = match action {
            TransactionAction::Commit => TransactionStatus::Accepted,
            TransactionAction::Abort => TransactionStatus::Rejected,
        };
        state.log.push(finalized.clone());
        Some(finalized)
    }

    /// Whether `tx_id` was finalized here.
    pub fn is_finalized(&self, tx_id: &str) -> bool {
        self.state.lock().finalized.contains(tx_id)
    }

    /// Transaction currently holding `account`.
    pub fn lock_holder(&self, account: &str) -> Option<TxId> {
        self.state.lock().locks.get(account).cloned()
    }

    /// Finalized transactions in decision order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().log.clone()
    }

    /// Balances of the accounts owned by this shard.
    pub fn balances(&self) -> Balances {
        fold_balances(&self.shard, &self.state.lock().log)
    }
}

impl VoteSource for CommitStore {
    fn vote(&self, proposal: &Proposal) -> TransactionAction {
        match proposal.phase {
            Phase::Prepare => self.prepared_action(&proposal.transaction),
            Phase::Accept => self.accept_action(&proposal.transaction.id),
        }
    }
}
