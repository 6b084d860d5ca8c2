use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

/// Convert a required C string argument into UTF-8 `&str`.
///
/// Returns `None` for null or non-UTF-8 input.
///
/// # Safety
/// `value` must be null or point to a valid NUL-terminated C string.
pub(crate) unsafe fn required_str_arg<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }

    let as_cstr = {
        // SAFETY: The caller guarantees `value` points to a valid NUL-terminated C string.
        unsafe { CStr::from_ptr(value) }
    };
    as_cstr.to_str().ok()
}

/// Borrow the bytes of a C string argument, without the terminator.
///
/// # Safety
/// `value` must be null or point to a valid NUL-terminated C string.
pub(crate) unsafe fn cstr_bytes_arg<'a>(value: *const c_char) -> Option<&'a [u8]> {
    if value.is_null() {
        return None;
    }

    // SAFETY: The caller guarantees `value` points to a valid NUL-terminated C string.
    Some(unsafe { CStr::from_ptr(value) }.to_bytes())
}

/// Convert a data pointer + size into a slice.
///
/// # Safety
/// If `data` is non-null it must be readable for `size` bytes.
pub(crate) unsafe fn bytes_arg<'a>(data: *const u8, size: c_int) -> Option<&'a [u8]> {
    let len = usize::try_from(size).ok()?;
    if data.is_null() {
        return None;
    }
    if len == 0 {
        return Some(&[]);
    }

    // SAFETY: Pointer and length are validated above and owned by caller for the call duration.
    Some(unsafe { std::slice::from_raw_parts(data, len) })
}

/// Convert a buffer pointer + capacity into a mutable slice.
///
/// # Safety
/// If `buffer` is non-null it must be writable for `size` bytes.
pub(crate) unsafe fn buffer_arg<'a>(buffer: *mut u8, size: c_int) -> Option<&'a mut [u8]> {
    let len = usize::try_from(size).ok()?;
    if buffer.is_null() {
        return None;
    }
    if len == 0 {
        return Some(&mut []);
    }

    // SAFETY: Pointer and length are validated above and owned by caller for the call duration.
    Some(unsafe { std::slice::from_raw_parts_mut(buffer, len) })
}
