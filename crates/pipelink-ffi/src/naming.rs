use std::ffi::CString;
use std::os::raw::c_char;

use crate::args;

/// Expand a short channel name into the platform's full endpoint name.
///
/// Returns null for null, non-UTF-8 or unusable names. The returned string
/// must be released with `pipelink_string_free`.
///
/// # Safety
/// `short_name` must be null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn pipelink_make_channel_name(short_name: *const c_char) -> *mut c_char {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        let short_name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(short_name) } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };

        pipelink_transport::make_channel_name(short_name)
            .ok()
            .and_then(|full| CString::new(full).ok())
            .map_or(std::ptr::null_mut(), CString::into_raw)
    })
}

/// Release a string returned by this library.
///
/// # Safety
/// `value` must be null or a pointer returned by `pipelink_make_channel_name`
/// that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn pipelink_string_free(value: *mut c_char) {
    crate::ffi_boundary((), || {
        if value.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this pointer came from `CString::into_raw`.
        drop(unsafe { CString::from_raw(value) });
    });
}
