use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::endpoint::PeerWait;
use crate::error::{Result, TransportError};

/// Server side of a channel on a filesystem-path Unix domain socket.
///
/// Owns the listening socket plus at most one accepted peer. The peer can be
/// dropped and a new one accepted on the same listener any number of times.
/// The socket file is removed on `Drop` if it still is the one we created.
pub struct UdsServer {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    peer: Option<UnixStream>,
}

impl UdsServer {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `name`.
    ///
    /// A stale socket left at the path is replaced; any other kind of file is
    /// left alone and reported as an error.
    pub fn bind(name: &str, config: &EndpointConfig) -> Result<Self> {
        let path = PathBuf::from(name);
        let create_err = |source: io::Error| TransportError::Create {
            name: name.to_string(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                name: name.to_string(),
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(create_err(io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            ensure_stale(&path).map_err(create_err)?;
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(create_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(create_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(config.socket_mode))
            .map_err(create_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(create_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
            peer: None,
        })
    }

    /// Wait for a peer, forever when `timeout` is `None`.
    ///
    /// The bounded form polls the listener, so nothing is left pending once
    /// it returns [`PeerWait::TimedOut`].
    pub fn wait_for_peer(&mut self, timeout: Option<Duration>) -> Result<PeerWait> {
        if self.peer.is_some() {
            return Ok(PeerWait::AlreadyConnected);
        }

        if let Some(timeout) = timeout {
            let ready = poll_readable(self.listener.as_raw_fd(), timeout)
                .map_err(TransportError::Accept)?;
            if !ready {
                return Ok(PeerWait::TimedOut);
            }
        }

        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "peer connected");
        self.peer = Some(stream);
        Ok(PeerWait::Connected)
    }

    /// Flush and sever the current peer, keeping the listener open.
    ///
    /// The peer is dropped even if the flush or shutdown fails, so the
    /// listener is always ready for the next wait.
    pub fn disconnect_peer(&mut self) -> Result<()> {
        if let Some(mut peer) = self.peer.take() {
            if let Err(err) = peer.flush() {
                debug!(path = ?self.path, error = %err, "flush before disconnect failed");
            }
            match peer.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // The peer may already be gone.
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => {
                    debug!(path = ?self.path, error = %err, "shutdown on disconnect failed");
                }
            }
            debug!(path = ?self.path, "peer disconnected");
        }
        Ok(())
    }

    /// The connected peer stream, if any.
    pub fn peer_mut(&mut self) -> Result<&mut UnixStream> {
        self.peer.as_mut().ok_or(TransportError::NotConnected)
    }

    /// The connected peer stream, if any.
    pub fn peer(&self) -> Result<&UnixStream> {
        self.peer.as_ref().ok_or(TransportError::NotConnected)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsServer {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

/// Fail unless the socket at `path` has no listener behind it.
///
/// Only a refused connection proves the socket is stale. A live server
/// receives (and then sees the immediate close of) one empty connection.
fn ensure_stale(path: &Path) -> io::Result<()> {
    match UnixStream::connect(path) {
        Ok(_probe) => Err(io::Error::new(
            ErrorKind::AddrInUse,
            "another server is listening on this channel",
        )),
        Err(err) if err.kind() == ErrorKind::ConnectionRefused => Ok(()),
        Err(err) => Err(err),
    }
}

/// Attach to a listening channel and put the stream in blocking read mode.
///
/// The stream is closed again if the mode switch fails.
pub fn connect(name: &str) -> Result<UnixStream> {
    let stream = UnixStream::connect(name).map_err(|source| TransportError::Connect {
        name: name.to_string(),
        source,
    })?;
    stream.set_nonblocking(false)?;
    debug!(name, "connected to unix domain socket");
    Ok(stream)
}

/// Read once, retrying only when interrupted by a signal.
pub(crate) fn read_once(stream: &mut UnixStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Write once, retrying only when interrupted by a signal.
pub(crate) fn write_once(stream: &mut UnixStream, data: &[u8]) -> io::Result<usize> {
    loop {
        match stream.write(data) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Number of bytes queued for reading on `stream`, without consuming them.
pub(crate) fn bytes_available(stream: &UnixStream) -> io::Result<usize> {
    let mut available: libc::c_int = 0;

    // SAFETY: `available` is a valid writable c_int, which is what FIONREAD
    // stores into, and the descriptor is owned by `stream` for the call.
    let rc = unsafe {
        libc::ioctl(
            stream.as_raw_fd(),
            libc::FIONREAD,
            &mut available as *mut libc::c_int,
        )
    };

    if rc == 0 {
        Ok(usize::try_from(available).unwrap_or(0))
    } else {
        Err(io::Error::last_os_error())
    }
}

fn poll_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let millis = libc::c_int::try_from(remaining.as_millis()).unwrap_or(libc::c_int::MAX);
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pollfd` is a single valid, writable pollfd and `fd` is an
        // open listening socket owned by the caller.
        let rc = unsafe { libc::poll(&mut pollfd, 1, millis) };
        match rc {
            0 => return Ok(false),
            n if n > 0 => return Ok(true),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/tmp/pipelink-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    #[test]
    fn bind_wait_connect() {
        let name = unique_name("basic");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        assert!(server.path().exists());

        let mut client = connect(&name).unwrap();
        assert_eq!(server.wait_for_peer(None).unwrap(), PeerWait::Connected);

        write_once(&mut client, b"hello").unwrap();
        let mut buf = [0u8; 5];
        server.peer_mut().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        drop(server);
        assert!(
            !Path::new(&name).exists(),
            "socket file should be cleaned up on drop"
        );
    }

    #[test]
    fn bounded_wait_times_out() {
        let name = unique_name("timeout");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();

        let start = Instant::now();
        let outcome = server.wait_for_peer(Some(Duration::from_millis(5))).unwrap();
        assert_eq!(outcome, PeerWait::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(server.peer(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn second_wait_reports_already_connected() {
        let name = unique_name("already");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        let _client = connect(&name).unwrap();

        assert_eq!(
            server.wait_for_peer(Some(Duration::from_secs(2))).unwrap(),
            PeerWait::Connected
        );
        assert_eq!(
            server.wait_for_peer(None).unwrap(),
            PeerWait::AlreadyConnected
        );
    }

    #[test]
    fn bytes_available_counts_unread_data() {
        let name = unique_name("fionread");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        let mut client = connect(&name).unwrap();
        server.wait_for_peer(None).unwrap();

        assert_eq!(bytes_available(server.peer().unwrap()).unwrap(), 0);
        write_once(&mut client, b"abc").unwrap();
        assert_eq!(bytes_available(server.peer().unwrap()).unwrap(), 3);
    }

    #[test]
    fn disconnect_peer_keeps_listener() {
        let name = unique_name("reuse");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();

        for _ in 0..2 {
            let mut client = connect(&name).unwrap();
            server.wait_for_peer(None).unwrap();
            server.disconnect_peer().unwrap();

            let mut buf = [0u8; 1];
            assert_eq!(read_once(&mut client, &mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UdsServer::bind(&long_path, &EndpointConfig::default());
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_hardened() {
        let name = unique_name("perms");
        let _server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        let mode = std::fs::metadata(&name).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let name = unique_name("file");
        std::fs::write(&name, b"regular-file").unwrap();

        let result = UdsServer::bind(&name, &EndpointConfig::default());
        assert!(matches!(result, Err(TransportError::Create { .. })));
        assert!(Path::new(&name).exists());

        let _ = std::fs::remove_file(&name);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let name = unique_name("stale");
        let stale = UnixListener::bind(&name).unwrap();
        drop(stale);
        assert!(Path::new(&name).exists());

        let server = UdsServer::bind(&name, &EndpointConfig::default());
        assert!(server.is_ok());
    }

    #[test]
    fn test_second_server_on_live_name_fails() {
        let name = unique_name("live");
        let mut first = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();

        let second = UdsServer::bind(&name, &EndpointConfig::default());
        match second {
            Err(TransportError::Create { source, .. }) => {
                assert_eq!(source.kind(), ErrorKind::AddrInUse);
            }
            Err(other) => panic!("expected AddrInUse, got {other:?}"),
            Ok(_) => panic!("second server should not bind a live name"),
        }

        // The first server still owns the path and accepts real clients.
        let inode = std::fs::symlink_metadata(&name).unwrap().ino();
        assert_eq!(first.created_inode.map(|(_, ino)| ino), Some(inode));

        // Drain the empty connection left by the liveness check.
        assert_eq!(first.wait_for_peer(None).unwrap(), PeerWait::Connected);
        let mut buf = [0u8; 1];
        assert_eq!(read_once(first.peer_mut().unwrap(), &mut buf).unwrap(), 0);
        first.disconnect_peer().unwrap();

        let mut client = connect(&name).unwrap();
        assert_eq!(
            first.wait_for_peer(Some(Duration::from_secs(2))).unwrap(),
            PeerWait::Connected
        );
        write_once(&mut client, b"x").unwrap();
        assert_eq!(read_once(first.peer_mut().unwrap(), &mut buf).unwrap(), 1);
    }

    #[test]
    fn second_client_queues_while_peer_attached() {
        let name = unique_name("queued");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        let _first = connect(&name).unwrap();
        assert_eq!(server.wait_for_peer(None).unwrap(), PeerWait::Connected);

        // The second client attaches to the listen backlog, not the server.
        let mut second = connect(&name).unwrap();
        assert_eq!(write_once(&mut second, b"early").unwrap(), 5);
        assert_eq!(bytes_available(server.peer().unwrap()).unwrap(), 0);

        server.disconnect_peer().unwrap();
        assert_eq!(server.wait_for_peer(None).unwrap(), PeerWait::Connected);
        let mut buf = [0u8; 5];
        server.peer_mut().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"early");
    }

    #[test]
    fn disconnect_after_peer_left_still_frees_slot() {
        let name = unique_name("peer-left");
        let mut server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();
        let client = connect(&name).unwrap();
        server.wait_for_peer(None).unwrap();
        drop(client);

        server.disconnect_peer().unwrap();
        assert!(matches!(server.peer(), Err(TransportError::NotConnected)));
        assert_eq!(
            server.wait_for_peer(Some(Duration::from_millis(5))).unwrap(),
            PeerWait::TimedOut
        );
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let name = unique_name("drop-race");
        let server = UdsServer::bind(&name, &EndpointConfig::default()).unwrap();

        std::fs::remove_file(&name).unwrap();
        std::fs::write(&name, b"replacement-file").unwrap();

        drop(server);
        assert!(
            Path::new(&name).exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_file(&name);
    }

    #[test]
    fn connect_to_missing_channel_fails() {
        let name = unique_name("missing");
        let err = connect(&name).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
