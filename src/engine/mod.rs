//! Engine link: wire protocol and transport

pub mod link;
#[cfg(test)]
pub mod mock;
pub mod protocol;

pub use link::{EngineLink, LinkError};
pub use protocol::{Command, EngineId, ProtocolError, Signal, Skin};
