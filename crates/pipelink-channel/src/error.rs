use pipelink_transport::TransportError;

use crate::channel::Role;

/// Errors returned by channel operations.
///
/// Only [`ChannelError::Transport`] is recorded as the channel's last error;
/// argument and state checks fail before any OS call is made.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// An argument was rejected before reaching the OS.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is only valid for the other role.
    #[error("operation requires a {0} channel")]
    WrongRole(Role),

    /// The channel has no open endpoint (construction failed or it was released).
    #[error("channel endpoint is not open")]
    EndpointInvalid,

    /// The underlying endpoint reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChannelError {
    /// Whether this error was captured as the channel's last error.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
