use std::fmt;
use std::time::Duration;

use pipelink_transport::{Endpoint, EndpointConfig, PeerWait, TransportError};
use tracing::{debug, warn};

use crate::error::{ChannelError, Result};

/// Which end of the channel this object is. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
}

/// The three phases a channel moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NeverConnected,
    Connected,
    Disconnected,
}

/// Result of waiting for a peer on a server channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A peer is attached.
    Connected,
    /// The deadline elapsed first. Not an error; nothing is recorded.
    TimedOut,
    /// The wait could not be performed. The reason is also the channel's last
    /// error when it came from the OS.
    Failed(String),
}

impl WaitOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// How a line read ended.
enum LineEnd {
    Newline,
    Full,
    Closed,
    Failed(ChannelError),
}

/// One end of a named duplex channel.
///
/// Construction never fails outright: a channel whose endpoint could not be
/// created or attached is still returned, unconnected, with the OS message in
/// [`Channel::last_error`]. Dropping (or [`Channel::close`]) releases the
/// endpoint, disconnecting a connected server peer gracefully first.
///
/// All mutating operations take `&mut self`; share a channel across threads
/// by moving it or guarding it externally.
pub struct Channel {
    endpoint: Option<Endpoint>,
    role: Role,
    state: ConnectionState,
    ever_connected: bool,
    last_error: Option<String>,
    name: String,
}

impl Channel {
    /// Create the listening end of a channel with the default endpoint config.
    pub fn create_server(name: impl Into<String>) -> Self {
        Self::create_server_with_config(name, &EndpointConfig::default())
    }

    /// Create the listening end of a channel.
    pub fn create_server_with_config(name: impl Into<String>, config: &EndpointConfig) -> Self {
        let mut channel = Self::unopened(name.into(), Role::Server);
        match Endpoint::create_server(&channel.name, config) {
            Ok(endpoint) => channel.endpoint = Some(endpoint),
            Err(err) => {
                channel.record(err);
            }
        }
        channel
    }

    /// Attach to a listening channel by its full name.
    pub fn connect_client(name: impl Into<String>) -> Self {
        let mut channel = Self::unopened(name.into(), Role::Client);
        match Endpoint::connect_client(&channel.name) {
            Ok(endpoint) => {
                channel.endpoint = Some(endpoint);
                channel.mark_connected();
            }
            Err(err) => {
                channel.record(err);
            }
        }
        channel
    }

    fn unopened(name: String, role: Role) -> Self {
        Self {
            endpoint: None,
            role,
            state: ConnectionState::Unconnected,
            ever_connected: false,
            last_error: None,
            name,
        }
    }

    /// Wait for a peer to attach. `None` blocks until one does.
    ///
    /// Only valid on a server whose endpoint was created; otherwise returns
    /// [`WaitOutcome::Failed`] without touching the endpoint or last error.
    pub fn wait_for_peer(&mut self, timeout: Option<Duration>) -> WaitOutcome {
        if self.role != Role::Server {
            return WaitOutcome::Failed(ChannelError::WrongRole(Role::Server).to_string());
        }
        let Some(endpoint) = self.endpoint.as_mut() else {
            return WaitOutcome::Failed(ChannelError::EndpointInvalid.to_string());
        };
        if self.state == ConnectionState::Connected {
            return WaitOutcome::Connected;
        }

        match endpoint.wait_for_peer(timeout) {
            Ok(PeerWait::Connected | PeerWait::AlreadyConnected) => {
                self.mark_connected();
                WaitOutcome::Connected
            }
            Ok(PeerWait::TimedOut) => {
                debug!(channel = %self.name, ?timeout, "no peer before deadline");
                WaitOutcome::TimedOut
            }
            Err(err) => WaitOutcome::Failed(self.record(err).to_string()),
        }
    }

    /// Millisecond form of [`Channel::wait_for_peer`]: `timeout_ms <= 0` blocks.
    pub fn wait_for_connection(&mut self, timeout_ms: i64) -> bool {
        let timeout = u64::try_from(timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        self.wait_for_peer(timeout).is_connected()
    }

    /// Flush and drop the connected peer, keeping the endpoint for the next
    /// [`Channel::wait_for_peer`].
    pub fn disconnect(&mut self) -> bool {
        if self.role != Role::Server || self.state != ConnectionState::Connected {
            return false;
        }
        let Some(endpoint) = self.endpoint.as_mut() else {
            return false;
        };

        match endpoint.disconnect_peer() {
            Ok(()) => {
                self.state = ConnectionState::Unconnected;
                debug!(channel = %self.name, "peer disconnected");
                true
            }
            Err(err) => {
                self.record(err);
                false
            }
        }
    }

    /// One read into `buf`. Returns the bytes obtained; 0 means the peer closed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let endpoint = self.endpoint.as_mut().ok_or(ChannelError::EndpointInvalid)?;
        match endpoint.read(buf) {
            Ok(n) => Ok(n),
            Err(err) => Err(self.record(err)),
        }
    }

    /// One write of `data`. Returns the bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let endpoint = self.endpoint.as_mut().ok_or(ChannelError::EndpointInvalid)?;
        match endpoint.write(data) {
            Ok(n) => Ok(n),
            Err(err) => Err(self.record(err)),
        }
    }

    /// Read one line into `buf`, NUL-terminated.
    ///
    /// Reads a byte at a time until a newline (consumed, not stored), until
    /// `buf.len() - 1` bytes are stored, or until the peer closes or a read
    /// fails. Carriage returns are dropped. A failed read ends the line early;
    /// the failure is recorded and the bytes gathered so far are returned.
    pub fn read_line(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "line buffer needs room for the terminator",
            ));
        }

        let (line, _end) = self.fill_line(buf.len() - 1)?;
        buf[..line.len()].copy_from_slice(&line);
        buf[line.len()] = 0;
        Ok(line.len())
    }

    /// Read one line of at most `capacity - 1` bytes into an owned string.
    ///
    /// Returns `None` when the peer closed before any byte of a new line
    /// arrived. Invalid UTF-8 is replaced.
    pub fn read_line_string(&mut self, capacity: usize) -> Result<Option<String>> {
        if capacity == 0 {
            return Err(ChannelError::InvalidArgument(
                "line capacity needs room for the terminator",
            ));
        }

        let (line, end) = self.fill_line(capacity - 1)?;
        if line.is_empty() {
            match end {
                LineEnd::Closed => return Ok(None),
                LineEnd::Failed(err) => return Err(err),
                LineEnd::Newline | LineEnd::Full => {}
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn fill_line(&mut self, limit: usize) -> Result<(Vec<u8>, LineEnd)> {
        let endpoint = self.endpoint.as_mut().ok_or(ChannelError::EndpointInvalid)?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        let end = loop {
            if line.len() >= limit {
                break Ok(LineEnd::Full);
            }
            match endpoint.read(&mut byte) {
                Ok(0) => break Ok(LineEnd::Closed),
                Ok(_) => match byte[0] {
                    b'\n' => break Ok(LineEnd::Newline),
                    b'\r' => {}
                    other => line.push(other),
                },
                Err(err) => break Err(err),
            }
        };

        let end = match end {
            Ok(end) => end,
            Err(err) => LineEnd::Failed(self.record(err)),
        };
        Ok((line, end))
    }

    /// Write the bytes of `text`. No newline is appended.
    pub fn write_string(&mut self, text: &str) -> Result<usize> {
        self.write(text.as_bytes())
    }

    /// Write `text` followed by a newline in a single write.
    pub fn write_line(&mut self, text: &str) -> Result<usize> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.write(&line)
    }

    /// Whether any bytes are queued for reading, without blocking.
    pub fn data_available(&mut self) -> Result<bool> {
        let endpoint = self.endpoint.as_ref().ok_or(ChannelError::EndpointInvalid)?;
        match endpoint.bytes_available() {
            Ok(n) => Ok(n > 0),
            Err(err) => Err(self.record(err)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match (self.state, self.ever_connected) {
            (ConnectionState::Connected, _) => Lifecycle::Connected,
            (ConnectionState::Unconnected, true) => Lifecycle::Disconnected,
            (ConnectionState::Unconnected, false) => Lifecycle::NeverConnected,
        }
    }

    /// Most recent OS-level failure on this channel, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Full channel name this object was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the OS endpoint is open.
    pub fn has_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Transport name for diagnostics, if the endpoint is open.
    pub fn transport_name(&self) -> Option<&'static str> {
        self.endpoint.as_ref().map(Endpoint::transport_name)
    }

    /// Release the channel. Equivalent to dropping it.
    pub fn close(self) {
        drop(self);
    }

    fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.ever_connected = true;
        debug!(channel = %self.name, role = %self.role, "channel connected");
    }

    fn record(&mut self, err: TransportError) -> ChannelError {
        let message = err.to_string();
        warn!(channel = %self.name, role = %self.role, error = %message, "channel operation failed");
        self.last_error = Some(message);
        ChannelError::Transport(err)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let Some(mut endpoint) = self.endpoint.take() else {
            return;
        };
        if self.role == Role::Server && self.state == ConnectionState::Connected {
            if let Err(err) = endpoint.disconnect_peer() {
                debug!(channel = %self.name, error = %err, "disconnect on close failed");
            }
        }
        debug!(channel = %self.name, "channel closed");
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}
