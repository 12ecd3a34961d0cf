//! Pure detection state machines.

pub mod eld;
pub mod epfd;

pub use eld::LeaderDetector;
pub use epfd::{DetectorConfig, FailureDetector, RoundOutcome, SuspicionEvent};
