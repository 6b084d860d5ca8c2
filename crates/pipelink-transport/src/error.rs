/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create a listening endpoint under the given name.
    #[error("failed to create channel {name}: {source}")]
    Create {
        name: String,
        source: std::io::Error,
    },

    /// Failed to attach to the named endpoint.
    #[error("failed to connect to {name}: {source}")]
    Connect {
        name: String,
        source: std::io::Error,
    },

    /// Waiting for a peer failed for a reason other than the deadline.
    #[error("failed waiting for peer: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on a connected endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The short name cannot address a single endpoint.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The socket path is too long for the platform.
    #[error("channel path too long ({len} bytes, max {max}): {name}")]
    PathTooLong {
        name: String,
        len: usize,
        max: usize,
    },

    /// The operation needs a connected peer and there is none.
    #[error("no peer is connected")]
    NotConnected,

    /// Only server endpoints can wait for or drop a peer.
    #[error("operation requires a server endpoint")]
    NotServer,
}

pub type Result<T> = std::result::Result<T, TransportError>;
