use std::time::Duration;

use crate::config::EndpointConfig;
use crate::error::{Result, TransportError};

/// Result of waiting for a peer on a server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerWait {
    /// A peer attached while we were waiting.
    Connected,
    /// A peer was already attached when the wait was issued.
    AlreadyConnected,
    /// The deadline elapsed; the pending wait has been canceled.
    TimedOut,
}

/// One end of a named duplex channel.
///
/// On Unix, this wraps a Unix domain socket (listener plus accepted peer on
/// the server side, a connected stream on the client side).
/// On Windows, this wraps a message-mode named pipe handle.
pub struct Endpoint {
    inner: EndpointInner,
    name: String,
}

enum EndpointInner {
    #[cfg(unix)]
    UnixServer(crate::uds::UdsServer),
    #[cfg(unix)]
    UnixClient(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    Pipe(crate::named_pipe::NamedPipe),
}

impl Endpoint {
    /// Create a listening endpoint under the full channel name.
    pub fn create_server(name: &str, config: &EndpointConfig) -> Result<Self> {
        #[cfg(unix)]
        let inner = EndpointInner::UnixServer(crate::uds::UdsServer::bind(name, config)?);
        #[cfg(windows)]
        let inner = EndpointInner::Pipe(crate::named_pipe::NamedPipe::create_server(name, config)?);

        Ok(Self {
            inner,
            name: name.to_string(),
        })
    }

    /// Attach to an existing listening endpoint.
    pub fn connect_client(name: &str) -> Result<Self> {
        #[cfg(unix)]
        let inner = EndpointInner::UnixClient(crate::uds::connect(name)?);
        #[cfg(windows)]
        let inner = EndpointInner::Pipe(crate::named_pipe::NamedPipe::connect(name)?);

        Ok(Self {
            inner,
            name: name.to_string(),
        })
    }

    /// Wait for a peer to attach. `None` blocks until one does.
    pub fn wait_for_peer(&mut self, timeout: Option<Duration>) -> Result<PeerWait> {
        match &mut self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(server) => server.wait_for_peer(timeout),
            #[cfg(unix)]
            EndpointInner::UnixClient(_) => Err(TransportError::NotServer),
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => pipe.wait_for_peer(timeout),
        }
    }

    /// Flush pending output and sever the current peer.
    ///
    /// The endpoint stays allocated and can wait for the next peer.
    pub fn disconnect_peer(&mut self) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(server) => server.disconnect_peer(),
            #[cfg(unix)]
            EndpointInner::UnixClient(_) => Err(TransportError::NotServer),
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => pipe.disconnect_peer(),
        }
    }

    /// Perform exactly one read. A partially delivered message is not an error.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(server) => {
                Ok(crate::uds::read_once(server.peer_mut()?, buf)?)
            }
            #[cfg(unix)]
            EndpointInner::UnixClient(stream) => Ok(crate::uds::read_once(stream, buf)?),
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => Ok(pipe.read(buf)?),
        }
    }

    /// Perform exactly one write.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(server) => {
                Ok(crate::uds::write_once(server.peer_mut()?, data)?)
            }
            #[cfg(unix)]
            EndpointInner::UnixClient(stream) => Ok(crate::uds::write_once(stream, data)?),
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => Ok(pipe.write(data)?),
        }
    }

    /// Number of bytes queued for reading, without consuming them.
    pub fn bytes_available(&self) -> Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(server) => Ok(crate::uds::bytes_available(server.peer()?)?),
            #[cfg(unix)]
            EndpointInner::UnixClient(stream) => Ok(crate::uds::bytes_available(stream)?),
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => Ok(pipe.bytes_available()?),
        }
    }

    /// Whether this endpoint was created in the listening role.
    pub fn is_server(&self) -> bool {
        match &self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(_) => true,
            #[cfg(unix)]
            EndpointInner::UnixClient(_) => false,
            #[cfg(windows)]
            EndpointInner::Pipe(pipe) => pipe.is_server(),
        }
    }

    /// Full channel name this endpoint was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            EndpointInner::UnixServer(_) | EndpointInner::UnixClient(_) => "unix-domain-socket",
            #[cfg(windows)]
            EndpointInner::Pipe(_) => "named-pipe",
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("type", &self.transport_name())
            .field("server", &self.is_server())
            .finish()
    }
}
