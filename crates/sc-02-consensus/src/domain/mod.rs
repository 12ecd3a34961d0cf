//! Pure consensus state machines.
//!
//! Each machine consumes one input at a time and returns the actions the
//! caller must perform. None of them touches the broker or the network.

pub mod epoch;
pub mod epoch_change;
pub mod error;
pub mod quorum;
pub mod uniform;

pub use epoch::{EpAction, EpochConsensus};
pub use epoch_change::{epoch_timestamp, EcAction, EpochChange};
pub use error::{ConsensusError, ConsensusResult};
pub use quorum::QuorumPolicy;
pub use uniform::{UcAction, UniformConsensus};
