//! # Node Runtime Library
//!
//! Assembles the failure detection, consensus and atomic commit subsystems
//! into a running process. The `sc-node` binary is the main entry point;
//! this library exposes the pieces for in-process clusters and tests.
//!
//! ## Architectural Patterns
//!
//! - **Actors**: every abstraction instance owns its state and runs on its
//!   own broker route
//! - **Hexagonal Architecture**: subsystems define ports (`Transport`,
//!   `VoteSource`, `OutcomeSink`, `Registrar`); this crate provides the
//!   adapters
//!
//! ## Modules
//!
//! - `container/` - configuration and node bootstrap
//! - `registry/` - rank assignment and membership discovery
//! - `adapters/` - TCP and in-memory transports
//! - `wiring/` - client gateway and in-process clusters

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod error;
pub mod registry;
pub mod wiring;

pub use container::{Node, NodeConfig, NodeHandle};
pub use error::RuntimeError;
pub use registry::{InMemoryRegistrar, Registrar, Registration, StaticRegistrar};
pub use wiring::{ClientGateway, InMemoryCluster};
