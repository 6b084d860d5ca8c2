use std::ffi::{c_void, CString};
use std::os::raw::c_int;

use pipelink_channel::Channel;

/// Returned by byte-count and tri-state functions on failure.
pub const PIPELINK_ERROR: c_int = -1;
pub const PIPELINK_TRUE: c_int = 1;
pub const PIPELINK_FALSE: c_int = 0;

pub type PipelinkChannelHandle = *mut c_void;

pub(crate) struct ChannelHandle {
    pub(crate) channel: Channel,
    /// NUL-terminated copy of the channel's last error, kept alive so the
    /// pointer handed out by `pipelink_get_error` stays valid until the next
    /// call on this handle.
    pub(crate) error_cache: Option<CString>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            channel,
            error_cache: None,
        }
    }
}

pub(crate) fn bool_to_c(value: bool) -> c_int {
    if value {
        PIPELINK_TRUE
    } else {
        PIPELINK_FALSE
    }
}

/// Convert a byte count that is bounded by a caller-supplied `c_int`.
pub(crate) fn count_to_c(count: usize) -> c_int {
    c_int::try_from(count).unwrap_or(PIPELINK_ERROR)
}
