//! # Shared Types Crate
//!
//! Domain entities, the message envelope, the wire codec and the membership
//! registry shared by every subsystem of a shard-commit node.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Closed Routing Set**: Messages are addressed by `(Scope, AbstractionId)`,
//!   a closed variant set, never by free-form strings.
//! - **Identity Without Rank**: `ProcessId` equality ignores the rank, which
//!   is only a leader-election tiebreaker.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod codec;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod membership;

pub use entities::*;
pub use envelope::{AbstractionId, Message, Payload, Proposal, Scope};
pub use errors::*;
pub use membership::Membership;
