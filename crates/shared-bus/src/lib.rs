//! # Shared Bus - Actor Routing for Shard-Commit Nodes
//!
//! Every abstraction instance (failure detector, leader detector, epoch
//! change, uniform consensus, each epoch consensus, atomic commit) is an
//! actor with its own FIFO queue. All communication between them is message
//! passing through the broker.
//!
//! ```text
//! ┌──────────────┐   send(scope, abstraction, msg)   ┌──────────────┐
//! │  Actor A     │ ───────────┐                      │  Actor B     │
//! └──────────────┘            ▼                      └──────────────┘
//!                     ┌───────────────┐                     ↑
//!   Transport ──────► │ MessageBroker │ ── queue(B) ────────┘
//!   (deliver)         └───────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - FIFO per route for locally enqueued messages
//! - Early messages are parked until their route subscribes
//! - Retiring a scope stops its actors between messages

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod link;
pub mod route;
pub mod transport;

// Re-export main types
pub use broker::{BrokerConfig, BrokerError, Delivery, MessageBroker};
pub use link::Link;
pub use route::{Handled, Handler, RecordingHandler, RouteKey};
pub use transport::{NullTransport, Transport, TransportError};

/// Default capacity of each actor queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of routes allowed to hold parked messages.
pub const DEFAULT_MAX_PARKED_ROUTES: usize = 4096;

/// Default number of retired scopes remembered.
pub const DEFAULT_MAX_RETIRED_SCOPES: usize = 65_536;
