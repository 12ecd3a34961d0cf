//! # Failure Detection Subsystem
//!
//! Eventually perfect failure detector (EPFD) and eventual leader detector
//! (ELD) for one shard.
//!
//! ## Signal Flow
//!
//! ```text
//!  HeartbeatRequest/Reply ──► EPFD ──Suspect/Restore──► ELD ──Trust──► EC (every open system)
//!                              ▲                         │
//!                         EpfdTimeout                    └──Trust──► other shards (leader only)
//!                        (re-armed each round)
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! sc-01-failure-detection/
//! ├── domain/
//! │   ├── epfd.rs     # Suspicion rounds, adaptive delay
//! │   └── eld.rs      # Max-rank unsuspected leader
//! └── service/
//!     ├── epfd.rs     # Round timer + heartbeats
//!     └── eld.rs      # Trust publication
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod service;

pub use domain::{DetectorConfig, FailureDetector, LeaderDetector, RoundOutcome, SuspicionEvent};
pub use service::{EldActor, EpfdActor};
