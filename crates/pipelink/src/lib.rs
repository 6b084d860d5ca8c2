//! Named duplex channels for local inter-process communication.
//!
//! One process creates the server end of a channel by name and waits for a
//! client; another attaches by the same name. Both ends then exchange raw
//! bytes or newline-delimited text. Unix builds use Unix domain sockets under
//! `/tmp`, Windows builds use message-mode named pipes.
//!
//! ```no_run
//! use pipelink::{make_channel_name, Channel};
//!
//! let name = make_channel_name("demo")?;
//! let mut server = Channel::create_server(&name);
//! if server.wait_for_connection(5_000) {
//!     if let Some(line) = server.read_line_string(256)? {
//!         server.write_line(&line)?;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Crate Structure
//!
//! - [`transport`]: channel naming, endpoint configuration and OS endpoints
//! - [`channel`]: the [`Channel`] state machine with per-instance error capture

/// Re-export transport types.
pub mod transport {
    pub use pipelink_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use pipelink_channel::*;
}

pub use pipelink_channel::{
    Channel, ChannelError, ConnectionState, EndpointConfig, Lifecycle, Role, WaitOutcome,
};
pub use pipelink_transport::{is_channel_name, make_channel_name, TransportError};
