//! pipelink-ffi: C-ABI exports for pipelink channels.
//!
//! Every channel function takes the opaque handle returned by
//! `pipelink_create_server` or `pipelink_connect_client`. Failures are kept
//! per handle and read back with `pipelink_get_error`.

mod args;
mod channel;
mod naming;
mod types;

use std::panic::AssertUnwindSafe;

pub use channel::{
    pipelink_close, pipelink_connect_client, pipelink_create_server, pipelink_data_available,
    pipelink_disconnect, pipelink_get_error, pipelink_is_connected, pipelink_is_server,
    pipelink_read, pipelink_read_line, pipelink_wait_for_connection, pipelink_write,
    pipelink_write_string,
};
pub use naming::{pipelink_make_channel_name, pipelink_string_free};
pub use types::{PipelinkChannelHandle, PIPELINK_ERROR, PIPELINK_FALSE, PIPELINK_TRUE};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(on_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_converts_panic_to_fallback() {
        let value = ffi_boundary(PIPELINK_ERROR, || -> std::os::raw::c_int {
            panic!("boom");
        });
        assert_eq!(value, PIPELINK_ERROR);
    }

    #[test]
    fn boundary_passes_through_value() {
        assert_eq!(ffi_boundary(PIPELINK_ERROR, || 7), 7);
    }
}
