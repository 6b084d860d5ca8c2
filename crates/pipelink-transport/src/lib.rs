//! Named local endpoints for pipelink.
//!
//! Provides one duplex endpoint type over the platform's local transport:
//! - Unix domain sockets (Linux/macOS)
//! - Message-mode named pipes (Windows)
//!
//! This is the lowest layer of pipelink. The channel state machine in
//! `pipelink-channel` builds on the [`Endpoint`] type provided here.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod naming;

#[cfg(unix)]
pub mod uds;

#[cfg(windows)]
pub mod named_pipe;

pub use config::{EndpointConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_INSTANCES};
pub use endpoint::{Endpoint, PeerWait};
pub use error::{Result, TransportError};
pub use naming::{is_channel_name, make_channel_name, CHANNEL_NAMESPACE};

#[cfg(unix)]
pub use uds::UdsServer;

#[cfg(windows)]
pub use named_pipe::NamedPipe;
