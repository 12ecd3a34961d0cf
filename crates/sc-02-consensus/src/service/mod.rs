//! Consensus actors wired to the broker.

pub mod actors;
pub mod systems;

pub use actors::{EcActor, EpActor, SystemContext, UcActor};
pub use systems::ConsensusSystems;
