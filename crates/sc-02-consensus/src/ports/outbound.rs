//! Driven ports (Outbound dependencies)

use shared_types::{Proposal, TransactionAction};

/// Local vote for a proposal.
///
/// Called once per system at each process, when its proposal reaches uniform
/// consensus. Implementations may take side effects (lock acquisition for a
/// prepare vote); they must be synchronous and must not block on the broker.
pub trait VoteSource: Send + Sync {
    /// The vote this process proposes for `proposal`.
    fn vote(&self, proposal: &Proposal) -> TransactionAction;
}
