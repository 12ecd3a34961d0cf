//! Detection actors wired to the broker.

pub mod eld;
pub mod epfd;

pub use eld::EldActor;
pub use epfd::EpfdActor;
