//! # Node Container
//!
//! Configuration and the running node holding every subsystem of one
//! process.
//!
//! ## Startup Order
//!
//! ```text
//! register ──► membership ──► broker/link ──► ELD ──► EPFD ──► SBAC
//! ```
//!
//! The leader detector starts first so that the initial leader is in the
//! registry before any consensus system can open.

pub mod config;
pub mod node;

pub use config::{ConfigError, NodeConfig, PeerConfig};
pub use node::{Node, NodeHandle};
