//! Account balances derived from the transaction log.

use shared_types::{AccountId, Transaction, TransactionStatus};
use std::collections::BTreeMap;

/// Balance per account, ordered by account id.
///
/// Signed so that the fold is order independent; accepted transfers never
/// overdraw, so balances of a consistent log are non-negative.
pub type Balances = BTreeMap<AccountId, i64>;

/// Fold the accepted transactions of `log` into the balances of `shard`.
///
/// `shard_out` owns (and debits) `from`; `shard_in` owns (and credits) `to`.
/// Each transaction touches at most its two accounts once, so the result
/// only depends on the accepted set.
pub fn fold_balances(shard: &str, log: &[Transaction]) -> Balances {
    let mut balances = Balances::new();
    for tx in log
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Accepted)
    {
        if let Some(from) = &tx.from {
            if tx.shard_out == shard {
                *balances.entry(from.clone()).or_insert(0) -= signed(tx.amount);
            }
        }
        if tx.shard_in == shard {
            *balances.entry(tx.to.clone()).or_insert(0) += signed(tx.amount);
        }
    }
    balances
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}
