//! Named duplex channel state machine for local IPC.
//!
//! This is the "just works" layer. Create a server or attach a client by
//! name, wait for a peer with or without a deadline, move raw bytes and
//! newline-delimited lines, and read the last captured failure from the
//! channel itself instead of a process-wide error slot.

pub mod channel;
pub mod error;

pub use channel::{Channel, ConnectionState, Lifecycle, Role, WaitOutcome};
pub use error::{ChannelError, Result};
pub use pipelink_transport::{make_channel_name, EndpointConfig};
