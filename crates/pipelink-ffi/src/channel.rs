use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};

use pipelink_channel::Channel;

use crate::args;
use crate::types::{
    bool_to_c, count_to_c, ChannelHandle, PipelinkChannelHandle, PIPELINK_ERROR, PIPELINK_FALSE,
};

fn with_channel_mut<T>(
    handle: PipelinkChannelHandle,
    on_error: T,
    f: impl FnOnce(&mut ChannelHandle) -> T,
) -> T {
    if handle.is_null() {
        return on_error;
    }

    let channel_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &mut *(handle as *mut ChannelHandle) }
    };

    f(channel_handle)
}

fn into_handle(channel: Channel) -> PipelinkChannelHandle {
    Box::into_raw(Box::new(ChannelHandle::new(channel))) as PipelinkChannelHandle
}

/// Create the server end of a channel.
///
/// Returns null only when `name` is null or not UTF-8. If the OS endpoint
/// cannot be created, a handle is still returned; inspect it with
/// `pipelink_get_error` and release it with `pipelink_close`.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn pipelink_create_server(name: *const c_char) -> PipelinkChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        let name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(name) } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };
        into_handle(Channel::create_server(name))
    })
}

/// Attach a client to a channel by its full name.
///
/// Same return contract as `pipelink_create_server`.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn pipelink_connect_client(name: *const c_char) -> PipelinkChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        let name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(name) } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };
        into_handle(Channel::connect_client(name))
    })
}

/// Wait for a client. `timeout_ms <= 0` blocks. Returns 1 once connected, 0 on
/// timeout or failure.
///
/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_wait_for_connection(
    channel: PipelinkChannelHandle,
    timeout_ms: c_int,
) -> c_int {
    crate::ffi_boundary(PIPELINK_FALSE, || {
        with_channel_mut(channel, PIPELINK_FALSE, |h| {
            bool_to_c(h.channel.wait_for_connection(i64::from(timeout_ms)))
        })
    })
}

/// Flush and drop the connected client, keeping the server endpoint.
///
/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_disconnect(channel: PipelinkChannelHandle) -> c_int {
    crate::ffi_boundary(PIPELINK_FALSE, || {
        with_channel_mut(channel, PIPELINK_FALSE, |h| {
            bool_to_c(h.channel.disconnect())
        })
    })
}

/// Read once into `buffer`. Returns bytes read or -1.
///
/// # Safety
/// `channel` must be null or a live handle. `buffer` must be null or writable
/// for `buffer_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn pipelink_read(
    channel: PipelinkChannelHandle,
    buffer: *mut c_void,
    buffer_size: c_int,
) -> c_int {
    crate::ffi_boundary(PIPELINK_ERROR, || {
        let buf = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::buffer_arg(buffer.cast::<u8>(), buffer_size) } {
                Some(v) => v,
                None => return PIPELINK_ERROR,
            }
        };
        with_channel_mut(channel, PIPELINK_ERROR, |h| match h.channel.read(buf) {
            Ok(n) => count_to_c(n),
            Err(_) => PIPELINK_ERROR,
        })
    })
}

/// Write `data_size` bytes once. Returns bytes written or -1.
///
/// # Safety
/// `channel` must be null or a live handle. `data` must be null or readable
/// for `data_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn pipelink_write(
    channel: PipelinkChannelHandle,
    data: *const c_void,
    data_size: c_int,
) -> c_int {
    crate::ffi_boundary(PIPELINK_ERROR, || {
        let data = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::bytes_arg(data.cast::<u8>(), data_size) } {
                Some(v) => v,
                None => return PIPELINK_ERROR,
            }
        };
        with_channel_mut(channel, PIPELINK_ERROR, |h| match h.channel.write(data) {
            Ok(n) => count_to_c(n),
            Err(_) => PIPELINK_ERROR,
        })
    })
}

/// Read one line into `buffer` (newline consumed, CR dropped, NUL-terminated).
/// Returns the line length or -1.
///
/// # Safety
/// `channel` must be null or a live handle. `buffer` must be null or writable
/// for `buffer_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn pipelink_read_line(
    channel: PipelinkChannelHandle,
    buffer: *mut c_char,
    buffer_size: c_int,
) -> c_int {
    crate::ffi_boundary(PIPELINK_ERROR, || {
        if buffer_size <= 0 {
            return PIPELINK_ERROR;
        }
        let buf = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::buffer_arg(buffer.cast::<u8>(), buffer_size) } {
                Some(v) => v,
                None => return PIPELINK_ERROR,
            }
        };
        with_channel_mut(channel, PIPELINK_ERROR, |h| match h.channel.read_line(buf) {
            Ok(n) => count_to_c(n),
            Err(_) => PIPELINK_ERROR,
        })
    })
}

/// Write the bytes of a C string, without its terminator or a newline.
///
/// # Safety
/// `channel` must be null or a live handle. `text` must be null or a valid
/// NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn pipelink_write_string(
    channel: PipelinkChannelHandle,
    text: *const c_char,
) -> c_int {
    crate::ffi_boundary(PIPELINK_ERROR, || {
        let text = {
            // SAFETY: We validate null in helper.
            match unsafe { args::cstr_bytes_arg(text) } {
                Some(v) => v,
                None => return PIPELINK_ERROR,
            }
        };
        with_channel_mut(channel, PIPELINK_ERROR, |h| match h.channel.write(text) {
            Ok(n) => count_to_c(n),
            Err(_) => PIPELINK_ERROR,
        })
    })
}

/// 1 if bytes are waiting, 0 if not, -1 if the endpoint could not be inspected.
///
/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_data_available(channel: PipelinkChannelHandle) -> c_int {
    crate::ffi_boundary(PIPELINK_ERROR, || {
        with_channel_mut(channel, PIPELINK_ERROR, |h| match h.channel.data_available() {
            Ok(available) => bool_to_c(available),
            Err(_) => PIPELINK_ERROR,
        })
    })
}

/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_is_connected(channel: PipelinkChannelHandle) -> c_int {
    crate::ffi_boundary(PIPELINK_FALSE, || {
        with_channel_mut(channel, PIPELINK_FALSE, |h| {
            bool_to_c(h.channel.is_connected())
        })
    })
}

/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_is_server(channel: PipelinkChannelHandle) -> c_int {
    crate::ffi_boundary(PIPELINK_FALSE, || {
        with_channel_mut(channel, PIPELINK_FALSE, |h| bool_to_c(h.channel.is_server()))
    })
}

/// Most recent failure on this channel, or null if none.
///
/// The string is owned by the handle and stays valid until the next call on
/// the same handle.
///
/// # Safety
/// `channel` must be null or a handle returned by this library and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn pipelink_get_error(channel: PipelinkChannelHandle) -> *const c_char {
    crate::ffi_boundary(std::ptr::null(), || {
        with_channel_mut(channel, std::ptr::null(), |h| {
            h.error_cache = h
                .channel
                .last_error()
                .map(|message| CString::new(message.replace('\0', "?")))
                .and_then(Result::ok);
            h.error_cache
                .as_ref()
                .map_or(std::ptr::null(), |message| message.as_ptr())
        })
    })
}

/// Release a channel, disconnecting a connected client first on the server side.
///
/// # Safety
/// `channel` must be null or a handle returned by this library. It must not be
/// used again afterwards.
#[no_mangle]
pub unsafe extern "C" fn pipelink_close(channel: PipelinkChannelHandle) {
    crate::ffi_boundary((), || {
        if channel.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by a create/connect call.
        let handle = unsafe { Box::from_raw(channel as *mut ChannelHandle) };
        handle.channel.close();
    });
}
