//! Transport adapters.
//!
//! - [`InMemoryNetwork`]: every node of the cluster lives in this process;
//!   frames go through the wire codec and straight into the destination's
//!   broker. Supports crash injection.
//! - [`TcpTransport`]: length-prefixed frames over TCP.

pub mod in_memory_network;
pub mod tcp;

pub use in_memory_network::InMemoryNetwork;
pub use tcp::{spawn_listener, TcpTransport};
