use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::ptr;
use std::time::Duration;

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_PIPE_CONNECTED, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FlushFileBuffers, ReadFile, WriteFile, FILE_FLAG_OVERLAPPED, OPEN_EXISTING,
    PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PeekNamedPipe,
    SetNamedPipeHandleState, PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

use crate::config::EndpointConfig;
use crate::endpoint::PeerWait;
use crate::error::{Result, TransportError};

/// A message-mode Windows named pipe handle.
///
/// Server handles are opened for overlapped I/O so the connect wait can be
/// bounded and canceled; every read and write on them still completes before
/// returning. Client handles use plain synchronous I/O.
pub struct NamedPipe {
    handle: OwnedHandle,
    server: bool,
}

/// Manual-reset event used to complete one overlapped operation.
struct Event(OwnedHandle);

impl Event {
    fn new() -> io::Result<Self> {
        // SAFETY: Null attributes and name request an anonymous, unsignaled,
        // manual-reset event with default security.
        let raw = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        if raw.is_null() {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a fresh event handle that nothing else owns.
        Ok(Self(unsafe { OwnedHandle::from_raw_handle(raw as RawHandle) }))
    }

    fn raw(&self) -> HANDLE {
        self.0.as_raw_handle() as HANDLE
    }

    fn overlapped(&self) -> OVERLAPPED {
        // SAFETY: OVERLAPPED is plain data; all-zero is its documented initial state.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.hEvent = self.raw();
        overlapped
    }
}

fn wide_name(name: &str) -> Vec<u16> {
    OsStr::new(name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn is_os_error(err: &io::Error, code: u32) -> bool {
    err.raw_os_error() == Some(code as i32)
}

impl NamedPipe {
    /// Create the single listening instance of a duplex, message-mode pipe.
    pub fn create_server(name: &str, config: &EndpointConfig) -> Result<Self> {
        let wide = wide_name(name);
        let default_timeout =
            u32::try_from(config.default_timeout.as_millis()).unwrap_or(u32::MAX);

        // SAFETY: `wide` is NUL-terminated and outlives the call; null security
        // attributes select the default descriptor.
        let raw = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                config.max_instances,
                config.out_buffer_size,
                config.in_buffer_size,
                default_timeout,
                ptr::null(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(TransportError::Create {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        info!(name, "listening on named pipe");
        Ok(Self {
            // SAFETY: `raw` is a valid pipe handle owned by nothing else.
            handle: unsafe { OwnedHandle::from_raw_handle(raw as RawHandle) },
            server: true,
        })
    }

    /// Open an existing pipe for exclusive read/write and switch it to
    /// message read mode. The handle is closed again if the switch fails.
    pub fn connect(name: &str) -> Result<Self> {
        let wide = wide_name(name);

        // SAFETY: `wide` is NUL-terminated and outlives the call.
        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(TransportError::Connect {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        let pipe = Self {
            // SAFETY: `raw` is a valid pipe handle owned by nothing else.
            handle: unsafe { OwnedHandle::from_raw_handle(raw as RawHandle) },
            server: false,
        };

        let mode = PIPE_READMODE_MESSAGE;
        // SAFETY: `mode` is a valid pointer for the call; null leaves the
        // collection settings unchanged.
        let ok = unsafe { SetNamedPipeHandleState(pipe.raw(), &mode, ptr::null(), ptr::null()) };
        if ok == 0 {
            return Err(TransportError::Connect {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        debug!(name, "connected to named pipe");
        Ok(pipe)
    }

    fn raw(&self) -> HANDLE {
        self.handle.as_raw_handle() as HANDLE
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    /// Wait for a client. `None` waits without a deadline.
    ///
    /// On deadline the pending connect is canceled and reaped before
    /// returning, so no operation is left outstanding on the handle.
    pub fn wait_for_peer(&mut self, timeout: Option<Duration>) -> Result<PeerWait> {
        if !self.server {
            return Err(TransportError::NotServer);
        }

        let event = Event::new().map_err(TransportError::Accept)?;
        let mut overlapped = event.overlapped();

        // SAFETY: `overlapped` and its event stay alive until the operation
        // has completed or been canceled and reaped below.
        let ok = unsafe { ConnectNamedPipe(self.raw(), &mut overlapped) };
        if ok != 0 {
            return Ok(PeerWait::Connected);
        }
        let err = io::Error::last_os_error();
        if is_os_error(&err, ERROR_PIPE_CONNECTED) {
            return Ok(PeerWait::AlreadyConnected);
        }
        if !is_os_error(&err, ERROR_IO_PENDING) {
            return Err(TransportError::Accept(err));
        }

        let millis = match timeout {
            None => INFINITE,
            Some(timeout) => u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1),
        };
        // SAFETY: The event handle is valid for the duration of the wait.
        let waited = unsafe { WaitForSingleObject(event.raw(), millis) };

        let mut transferred = 0u32;
        if waited == WAIT_OBJECT_0 {
            // SAFETY: The operation has signaled completion.
            let ok = unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut transferred, 0) };
            if ok == 0 {
                return Err(TransportError::Accept(io::Error::last_os_error()));
            }
            return Ok(PeerWait::Connected);
        }

        let wait_error = (waited != WAIT_TIMEOUT).then(io::Error::last_os_error);

        // SAFETY: Cancels only the connect issued above, then blocks until the
        // kernel is done with `overlapped`.
        let reaped = unsafe {
            CancelIoEx(self.raw(), &overlapped);
            GetOverlappedResult(self.raw(), &overlapped, &mut transferred, 1)
        };
        if reaped != 0 {
            // A client attached in the window before cancellation.
            return Ok(PeerWait::Connected);
        }

        match wait_error {
            Some(err) => Err(TransportError::Accept(err)),
            None => {
                debug!(?timeout, "connect wait canceled at deadline");
                Ok(PeerWait::TimedOut)
            }
        }
    }

    /// Flush pending output to the client, then drop it.
    ///
    /// The flush fails with a broken pipe when the client left first; the
    /// disconnect still runs so the instance can take the next client.
    pub fn disconnect_peer(&mut self) -> Result<()> {
        if !self.server {
            return Err(TransportError::NotServer);
        }
        if let Err(err) = self.flush() {
            debug!(error = %err, "flush before disconnect failed");
        }
        // SAFETY: `self.raw()` is a valid server pipe handle.
        if unsafe { DisconnectNamedPipe(self.raw()) } == 0 {
            return Err(io::Error::last_os_error().into());
        }
        debug!("client disconnected");
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        // SAFETY: `self.raw()` is a valid pipe handle.
        if unsafe { FlushFileBuffers(self.raw()) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// One read. `ERROR_MORE_DATA` returns the bytes obtained so far.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let ptr = buf.as_mut_ptr();
        let (count, err) = self.complete_io(|handle, overlapped, count| {
            // SAFETY: `ptr` is valid for `len` writable bytes for the whole
            // operation, which completes inside `complete_io`.
            unsafe { ReadFile(handle, ptr, len, count, overlapped) }
        });
        match err {
            Some(err) if !is_os_error(&err, ERROR_MORE_DATA) => Err(err),
            _ => Ok(count as usize),
        }
    }

    /// One write.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let ptr = data.as_ptr();
        let (count, err) = self.complete_io(|handle, overlapped, count| {
            // SAFETY: `ptr` is valid for `len` readable bytes for the whole
            // operation, which completes inside `complete_io`.
            unsafe { WriteFile(handle, ptr, len, count, overlapped) }
        });
        match err {
            Some(err) => Err(err),
            None => Ok(count as usize),
        }
    }

    pub fn bytes_available(&self) -> io::Result<usize> {
        let mut available = 0u32;
        // SAFETY: Only the total-available out pointer is requested; it is a
        // valid writable u32.
        let ok = unsafe {
            PeekNamedPipe(
                self.raw(),
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                &mut available,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(available as usize)
    }

    /// Issue one read/write and wait for it to finish.
    ///
    /// Returns the transfer count together with the OS error, since
    /// `ERROR_MORE_DATA` still carries a meaningful count.
    fn complete_io(
        &self,
        issue: impl FnOnce(HANDLE, *mut OVERLAPPED, *mut u32) -> i32,
    ) -> (u32, Option<io::Error>) {
        let mut count = 0u32;
        if !self.server {
            let ok = issue(self.raw(), ptr::null_mut(), &mut count);
            return (count, (ok == 0).then(io::Error::last_os_error));
        }

        let event = match Event::new() {
            Ok(event) => event,
            Err(err) => return (0, Some(err)),
        };
        let mut overlapped = event.overlapped();
        let ok = issue(self.raw(), &mut overlapped, ptr::null_mut());
        if ok == 0 {
            let err = io::Error::last_os_error();
            if !is_os_error(&err, ERROR_IO_PENDING) && !is_os_error(&err, ERROR_MORE_DATA) {
                return (0, Some(err));
            }
        }

        // SAFETY: `overlapped` belongs to the operation just issued; waiting
        // keeps it alive until the kernel is done with it.
        let ok = unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut count, 1) };
        (count, (ok == 0).then(io::Error::last_os_error))
    }
}

#[cfg(all(test, windows))]
mod tests {
    use std::time::Instant;

    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            r"\\.\pipe\pipelink-np-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    fn connect_retrying(name: &str) -> NamedPipe {
        let start = Instant::now();
        loop {
            match NamedPipe::connect(name) {
                Ok(pipe) => return pipe,
                Err(err) => {
                    assert!(start.elapsed() < Duration::from_secs(3), "{err}");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    #[test]
    fn server_reuses_instance_after_client_leaves_first() {
        let name = unique_name("reuse");
        let mut server = NamedPipe::create_server(&name, &EndpointConfig::default()).unwrap();

        for round in 0..2u8 {
            let waiter = std::thread::spawn(move || {
                let outcome = server.wait_for_peer(Some(Duration::from_secs(3)));
                (server, outcome)
            });
            let mut client = connect_retrying(&name);
            let (returned, outcome) = waiter.join().expect("server thread should finish");
            server = returned;
            assert!(matches!(
                outcome,
                Ok(PeerWait::Connected | PeerWait::AlreadyConnected)
            ));

            assert_eq!(client.write(&[round]).unwrap(), 1);
            let mut buf = [0u8; 4];
            assert_eq!(server.read(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], round);

            // Client leaves first; the flush inside disconnect sees a broken pipe.
            drop(client);
            server.disconnect_peer().unwrap();
        }
    }

    #[test]
    fn bounded_wait_times_out_without_client() {
        let name = unique_name("timeout");
        let mut server = NamedPipe::create_server(&name, &EndpointConfig::default()).unwrap();
        assert_eq!(
            server.wait_for_peer(Some(Duration::from_millis(5))).unwrap(),
            PeerWait::TimedOut
        );
    }
}
