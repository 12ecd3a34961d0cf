//! # Consensus Subsystem
//!
//! Crash-tolerant uniform consensus built from epoch change (EC) and a chain
//! of abortable epoch consensus (EP) instances. One consensus *system* is
//! opened per transaction phase (`{tx}-prepare`, `{tx}-accept`); each system
//! decides exactly one value and is then retired.
//!
//! ## Layering
//!
//! ```text
//!   ELD ──Trust──► EC ──StartEpoch──► UC ──EpAbort──► EP(ets)
//!                                     ▲                 │
//!                                     └──Aborted/EpDecide
//!                                     │
//!                                     └──UcDecide──► SBAC (process scope)
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! sc-02-consensus/
//! ├── config.rs            # Epoch increment, quorum policy
//! ├── domain/
//! │   ├── epoch_change.rs  # Timestamps, NACK handling
//! │   ├── epoch.rs         # Read/write/accept rounds, merge rule
//! │   ├── uniform.rs       # Epoch hand-over, single decision
//! │   ├── quorum.rs
//! │   └── error.rs
//! ├── ports/
//! │   └── outbound.rs      # VoteSource (local vote per phase)
//! └── service/
//!     ├── actors.rs        # Broker-facing wrappers of the domain machines
//!     └── systems.rs       # Opening a consensus system
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::ConsensusConfig;
pub use domain::{
    ConsensusError, ConsensusResult, EcAction, EpAction, EpochChange, EpochConsensus,
    QuorumPolicy, UcAction, UniformConsensus,
};
pub use ports::VoteSource;
pub use service::ConsensusSystems;
