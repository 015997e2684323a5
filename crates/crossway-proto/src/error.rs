//! Error types for the protocol.

use thiserror::Error;

/// Protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Lane index outside `0..4`.
    #[error("lane index out of range: {0}")]
    LaneOutOfRange(u8),

    /// Line is not a recognised actuator command.
    #[error("unknown actuator command: {0:?}")]
    UnknownCommand(String),
}
