//! # Core Entities
//!
//! Process identities, transactions and the values consensus instances
//! agree on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Shard alias (the `owner` of a process).
pub type ShardId = String;

/// Account name in the ledger.
pub type AccountId = String;

/// Transaction identifier.
pub type TxId = String;

/// Identifier of a consensus system, e.g. `"<txId>-prepare"`.
pub type SystemId = String;

// =============================================================================
// PROCESS IDENTITY
// =============================================================================

/// Identity of a process in the cluster.
///
/// Equality and hashing use `(host, port, owner, index)` only. The rank is a
/// registration-order tiebreaker and does not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessId {
    /// Host the process listens on.
    pub host: String,
    /// Port the process listens on.
    pub port: u16,
    /// Shard alias this process belongs to.
    pub owner: ShardId,
    /// Index of the process inside its shard.
    pub index: u32,
    /// Registration-order rank, unique across the cluster.
    pub rank: u32,
}

impl ProcessId {
    /// Create an unranked process identity.
    pub fn new(host: impl Into<String>, port: u16, owner: impl Into<ShardId>, index: u32) -> Self {
        Self {
            host: host.into(),
            port,
            owner: owner.into(),
            index,
            rank: 0,
        }
    }

    /// Return the same identity carrying the given rank.
    #[must_use]
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    /// Whether this process belongs to `shard`.
    pub fn is_in(&self, shard: &str) -> bool {
        self.owner == shard
    }
}

impl PartialEq for ProcessId {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.owner == other.owner
            && self.index == other.index
    }
}

impl Eq for ProcessId {}

impl Hash for ProcessId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.owner.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}@{}:{} (rank {})",
            self.owner, self.index, self.host, self.port, self.rank
        )
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionStatus {
    /// Not yet finalized.
    #[default]
    Pending,
    /// Committed and visible in the ledger.
    Accepted,
    /// Aborted by the atomic commit.
    Rejected,
}

/// A deposit or transfer between accounts.
///
/// `shard_out` owns `from` (the debited account) and `shard_in` owns `to`
/// (the credited account). Both are equal for intra-shard transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction id.
    pub id: TxId,
    /// Source account; `None` for deposits.
    pub from: Option<AccountId>,
    /// Destination account.
    pub to: AccountId,
    /// Amount moved.
    pub amount: u64,
    /// Shard owning `to`.
    pub shard_in: ShardId,
    /// Shard owning `from`.
    pub shard_out: ShardId,
    /// Lifecycle status.
    pub status: TransactionStatus,
}

impl Transaction {
    /// Create a deposit of `amount` into `to` on `shard`.
    pub fn deposit(to: impl Into<AccountId>, amount: u64, shard: impl Into<ShardId>) -> Self {
        let shard = shard.into();
        Self {
            id: Uuid::new_v4().to_string(),
            from: None,
            to: to.into(),
            amount,
            shard_in: shard.clone(),
            shard_out: shard,
            status: TransactionStatus::Pending,
        }
    }

    /// Create a transfer from `from` (on `shard_out`) to `to` (on `shard_in`).
    pub fn transfer(
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: u64,
        shard_out: impl Into<ShardId>,
        shard_in: impl Into<ShardId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: Some(from.into()),
            to: to.into(),
            amount,
            shard_in: shard_in.into(),
            shard_out: shard_out.into(),
            status: TransactionStatus::Pending,
        }
    }

    /// Replace the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<TxId>) -> Self {
        self.id = id.into();
        self
    }

    /// A deposit has no source account and takes no source lock.
    pub fn is_deposit(&self) -> bool {
        self.from.is_none()
    }

    /// Whether the transaction spans two shards.
    pub fn is_cross_shard(&self) -> bool {
        self.shard_in != self.shard_out
    }

    /// Whether `shard` is one of the declared shards.
    pub fn touches(&self, shard: &str) -> bool {
        self.shard_in == shard || self.shard_out == shard
    }

    /// The declared shard that is not `local`, if the transaction is cross-shard.
    pub fn other_shard(&self, local: &str) -> Option<&str> {
        if !self.is_cross_shard() {
            return None;
        }
        if self.shard_in == local {
            Some(&self.shard_out)
        } else if self.shard_out == local {
            Some(&self.shard_in)
        } else {
            None
        }
    }

    /// Declared shards without duplicates.
    pub fn shards(&self) -> Vec<&str> {
        if self.is_cross_shard() {
            vec![self.shard_out.as_str(), self.shard_in.as_str()]
        } else {
            vec![self.shard_in.as_str()]
        }
    }

    /// Number of distinct shards whose prepare vote is required.
    pub fn required_votes(&self) -> usize {
        if self.is_cross_shard() {
            2
        } else {
            1
        }
    }
}

// =============================================================================
// CONSENSUS VALUES
// =============================================================================

/// A commit/abort vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionAction {
    /// The transaction may proceed.
    Commit,
    /// The transaction must be rejected.
    Abort,
}

impl TransactionAction {
    /// Whether this is an `Abort` vote.
    pub fn is_abort(self) -> bool {
        matches!(self, TransactionAction::Abort)
    }
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionAction::Commit => write!(f, "commit"),
            TransactionAction::Abort => write!(f, "abort"),
        }
    }
}

/// The two sequential consensus rounds of the atomic commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Per-shard tentative vote.
    Prepare,
    /// Global final action.
    Accept,
}

impl Phase {
    /// Consensus system id for this phase of `tx_id`.
    pub fn system_id(self, tx_id: &str) -> SystemId {
        match self {
            Phase::Prepare => format!("{tx_id}-prepare"),
            Phase::Accept => format!("{tx_id}-accept"),
        }
    }
}

/// Discriminant of a [`Value`], used by the epoch merge rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A prepare-phase value.
    Prepared,
    /// An accept-phase value.
    Accept,
}

/// Payload a consensus instance agrees on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// A shard's prepare vote.
    Prepared {
        /// The vote.
        action: TransactionAction,
        /// The transaction voted on.
        transaction: Transaction,
        /// Correlates the vote across the shard.
        correlation_id: Uuid,
    },
    /// The merged final action.
    Accept {
        /// The final action.
        action: TransactionAction,
        /// The transaction decided.
        transaction: Transaction,
    },
}

impl Value {
    /// Build the value proposed for `phase`.
    pub fn for_phase(phase: Phase, action: TransactionAction, transaction: Transaction) -> Self {
        match phase {
            Phase::Prepare => Value::Prepared {
                action,
                transaction,
                correlation_id: Uuid::new_v4(),
            },
            Phase::Accept => Value::Accept {
                action,
                transaction,
            },
        }
    }

    /// The carried vote.
    pub fn action(&self) -> TransactionAction {
        match self {
            Value::Prepared { action, .. } | Value::Accept { action, .. } => *action,
        }
    }

    /// The carried transaction.
    pub fn transaction(&self) -> &Transaction {
        match self {
            Value::Prepared { transaction, .. } | Value::Accept { transaction, .. } => transaction,
        }
    }

    /// Which phase the value belongs to.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Prepared { .. } => ValueKind::Prepared,
            Value::Accept { .. } => ValueKind::Accept,
        }
    }

    /// Same value with a different action.
    #[must_use]
    pub fn with_action(&self, action: TransactionAction) -> Self {
        match self {
            Value::Prepared {
                transaction,
                correlation_id,
                ..
            } => Value::Prepared {
                action,
                transaction: transaction.clone(),
                correlation_id: *correlation_id,
            },
            Value::Accept { transaction, .. } => Value::Accept {
                action,
                transaction: transaction.clone(),
            },
        }
    }
}

/// The highest-timestamped value a replica has witnessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EpochState {
    /// `1 +` the epoch in which `value` was written; `0` if never written.
    pub value_timestamp: u64,
    /// The value, undefined at start.
    pub value: Option<Value>,
}

impl EpochState {
    /// State with a value.
    pub fn new(value_timestamp: u64, value: Value) -> Self {
        Self {
            value_timestamp,
            value: Some(value),
        }
    }

    /// Starting state.
    pub fn empty() -> Self {
        Self::default()
    }
}
