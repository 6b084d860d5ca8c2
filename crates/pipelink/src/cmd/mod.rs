use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use pipelink_channel::Channel;
use pipelink_transport::{is_channel_name, make_channel_name};

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod listen;
pub mod name;
pub mod send;
pub mod serve;
pub mod version;

/// Longest line the line-oriented commands read by default, terminator included.
pub const DEFAULT_MAX_LINE: usize = 4096;

const CONNECT_RETRY: Duration = Duration::from_millis(50);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every received line back to the client, one session at a time.
    Serve(ServeArgs),
    /// Print received lines.
    Listen(ListenArgs),
    /// Send one line to a server.
    Send(SendArgs),
    /// Connect to a channel and print its status.
    Info(InfoArgs),
    /// Print the full channel name for a short name.
    Name(NameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Name(args) => name::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel short name or full platform name.
    pub name: String,
    /// Give up if no client connects within this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Line buffer size, terminator included.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE)]
    pub max_line: usize,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Channel short name or full platform name.
    pub name: String,
    /// Exit after receiving N lines.
    #[arg(long)]
    pub count: Option<usize>,
    /// Line buffer size, terminator included.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE)]
    pub max_line: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel short name or full platform name.
    pub name: String,
    /// Line to send. A newline is appended.
    #[arg(long)]
    pub data: String,
    /// Wait for one reply line and print it.
    #[arg(long)]
    pub wait: bool,
    /// How long to keep retrying the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Maximum time to wait for the reply when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Channel short name or full platform name.
    pub name: String,
    /// How long to keep retrying the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct NameArgs {
    /// Short channel name.
    pub short_name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Accept either a full channel name or a short one to expand.
pub fn resolve_name(input: &str) -> CliResult<String> {
    if is_channel_name(input) {
        return Ok(input.to_string());
    }
    make_channel_name(input).map_err(|err| transport_error("invalid channel name", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn validate_max_line(max_line: usize) -> CliResult<usize> {
    if max_line < 2 {
        return Err(CliError::new(
            USAGE,
            "--max-line must leave room for at least one byte and the terminator",
        ));
    }
    Ok(max_line)
}

/// Retry attaching until a server accepts or `timeout` elapses.
///
/// Returns the last attempt either way; an unconnected channel carries the
/// final failure in its last error.
pub fn connect_with_timeout(name: &str, timeout: Duration) -> Channel {
    let start = Instant::now();
    loop {
        let channel = Channel::connect_client(name);
        if channel.is_connected() || start.elapsed() >= timeout {
            return channel;
        }
        tracing::debug!(name, error = ?channel.last_error(), "connect attempt failed, retrying");
        std::thread::sleep(CONNECT_RETRY);
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("5m").is_err());
    }

    #[test]
    fn resolve_name_expands_short_names_only() {
        let full = make_channel_name("resolve-demo").unwrap();
        assert_eq!(resolve_name("resolve-demo").unwrap(), full);
        assert_eq!(resolve_name(&full).unwrap(), full);
    }

    #[test]
    fn resolve_name_rejects_unusable_names() {
        assert_eq!(resolve_name("").unwrap_err().code, USAGE);
        assert_eq!(resolve_name("a/b").unwrap_err().code, USAGE);
    }

    #[test]
    fn max_line_needs_room_for_a_byte() {
        assert!(validate_max_line(1).is_err());
        assert_eq!(validate_max_line(2).unwrap(), 2);
    }

    #[test]
    fn connect_with_timeout_returns_failed_channel_after_deadline() {
        let name = make_channel_name(&format!("cli-missing-{}", std::process::id())).unwrap();
        let start = Instant::now();
        let channel = connect_with_timeout(&name, Duration::from_millis(120));

        assert!(!channel.is_connected());
        assert!(channel.last_error().is_some());
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
