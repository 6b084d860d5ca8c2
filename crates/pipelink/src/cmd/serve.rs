use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipelink_channel::{Channel, ChannelError, WaitOutcome};

use crate::cmd::{install_ctrlc_handler, parse_duration, resolve_name, validate_max_line, ServeArgs};
use crate::exit::{CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::OutputFormat;

/// How often the accept wait wakes up to check for Ctrl-C.
pub(crate) const ACCEPT_POLL: Duration = Duration::from_millis(250);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name)?;
    let idle_timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let max_line = validate_max_line(args.max_line)?;

    let mut channel = open_server(&name)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut idle_since = Instant::now();
    while running.load(Ordering::SeqCst) {
        if !accept_next(&mut channel, idle_since, idle_timeout)? {
            continue;
        }

        let echoed = echo_session(&mut channel, max_line, &running);
        tracing::info!(lines = echoed, "session ended");
        end_session(&mut channel)?;
        idle_since = Instant::now();
    }

    channel.close();
    Ok(SUCCESS)
}

pub(crate) fn open_server(name: &str) -> CliResult<Channel> {
    let channel = Channel::create_server(name);
    if !channel.has_endpoint() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!(
                "create failed: {}",
                channel.last_error().unwrap_or("endpoint unavailable")
            ),
        ));
    }
    tracing::info!(name, "waiting for clients");
    Ok(channel)
}

/// One poll-sized wait for a client. `Ok(false)` means try again.
pub(crate) fn accept_next(
    channel: &mut Channel,
    idle_since: Instant,
    idle_timeout: Option<Duration>,
) -> CliResult<bool> {
    match channel.wait_for_peer(Some(ACCEPT_POLL)) {
        WaitOutcome::Connected => {
            tracing::info!("client connected");
            Ok(true)
        }
        WaitOutcome::TimedOut => match idle_timeout {
            Some(limit) if idle_since.elapsed() >= limit => Err(CliError::new(
                TIMEOUT,
                format!("no client connected within {limit:?}"),
            )),
            _ => Ok(false),
        },
        WaitOutcome::Failed(reason) => Err(CliError::new(
            TRANSPORT_ERROR,
            format!("wait for client failed: {reason}"),
        )),
    }
}

/// Drop the current client so the endpoint can take the next one.
pub(crate) fn end_session(channel: &mut Channel) -> CliResult<()> {
    if channel.disconnect() {
        return Ok(());
    }
    Err(CliError::new(
        TRANSPORT_ERROR,
        format!(
            "disconnect failed: {}",
            channel.last_error().unwrap_or("no client was connected")
        ),
    ))
}

/// Echo lines until the client leaves or a read fails. Returns lines echoed.
fn echo_session(channel: &mut Channel, max_line: usize, running: &AtomicBool) -> usize {
    let mut echoed = 0usize;
    while running.load(Ordering::SeqCst) {
        let line = match channel.read_line_string(max_line) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                log_session_error("read failed", &err);
                break;
            }
        };

        tracing::debug!(size = line.len(), "echoing line");
        if let Err(err) = channel.write_line(&line) {
            log_session_error("echo failed", &err);
            break;
        }
        echoed = echoed.saturating_add(1);
    }
    echoed
}

fn log_session_error(context: &str, err: &ChannelError) {
    tracing::warn!(error = %err, "{context}");
}
