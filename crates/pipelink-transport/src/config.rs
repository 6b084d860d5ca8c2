use std::time::Duration;

/// Default size of the inbound and outbound endpoint buffers, in bytes.
pub const DEFAULT_BUFFER_SIZE: u32 = 4096;

/// A channel admits one peer at a time.
pub const DEFAULT_MAX_INSTANCES: u32 = 1;

/// Endpoint creation parameters.
///
/// Buffer sizes, instance count and the default timeout are handed to the OS
/// when a Windows named pipe is created. Unix domain sockets keep the kernel's
/// buffer sizing and only use `socket_mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Inbound buffer size in bytes.
    pub in_buffer_size: u32,
    /// Outbound buffer size in bytes.
    pub out_buffer_size: u32,
    /// Maximum concurrent peers per endpoint.
    pub max_instances: u32,
    /// Default client wait timeout. Zero selects the OS default.
    pub default_timeout: Duration,
    /// Permission bits applied to the socket file (Unix only).
    pub socket_mode: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            in_buffer_size: DEFAULT_BUFFER_SIZE,
            out_buffer_size: DEFAULT_BUFFER_SIZE,
            max_instances: DEFAULT_MAX_INSTANCES,
            default_timeout: Duration::ZERO,
            socket_mode: 0o600,
        }
    }
}
