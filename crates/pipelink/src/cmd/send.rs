use std::time::{Duration, Instant};

use pipelink_channel::{Channel, ChannelError};

use crate::cmd::{connect_with_timeout, parse_duration, resolve_name, SendArgs, DEFAULT_MAX_LINE};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_line, OutputFormat};

const REPLY_POLL: Duration = Duration::from_millis(20);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name)?;
    let connect_timeout = parse_duration(&args.timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let mut channel = connect_with_timeout(&name, connect_timeout);
    if !channel.is_connected() {
        return Err(CliError::new(
            TIMEOUT,
            format!(
                "connect timed out after {connect_timeout:?}: {}",
                channel.last_error().unwrap_or("no server")
            ),
        ));
    }

    let written = channel
        .write_line(&args.data)
        .map_err(|err| channel_error("send failed", err))?;
    tracing::debug!(bytes = written, "line sent");

    if args.wait {
        match wait_for_reply(&mut channel, DEFAULT_MAX_LINE, wait_timeout)? {
            Some(line) => print_line(channel.name(), &line, format),
            None => return Err(CliError::new(FAILURE, "server closed before replying")),
        }
    }

    channel.close();
    Ok(SUCCESS)
}

trait ReplySource {
    fn reply_ready(&mut self) -> Result<bool, ChannelError>;
    fn read_reply(&mut self, capacity: usize) -> Result<Option<String>, ChannelError>;
}

impl ReplySource for Channel {
    fn reply_ready(&mut self) -> Result<bool, ChannelError> {
        self.data_available()
    }

    fn read_reply(&mut self, capacity: usize) -> Result<Option<String>, ChannelError> {
        self.read_line_string(capacity)
    }
}

/// Poll until reply bytes are queued, then read one line.
fn wait_for_reply<R: ReplySource>(
    source: &mut R,
    capacity: usize,
    timeout: Duration,
) -> CliResult<Option<String>> {
    let start = Instant::now();
    loop {
        let ready = source
            .reply_ready()
            .map_err(|err| channel_error("reply check failed", err))?;
        if ready {
            return source
                .read_reply(capacity)
                .map_err(|err| channel_error("receive failed", err));
        }
        if start.elapsed() >= timeout {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply within {timeout:?}"),
            ));
        }
        std::thread::sleep(REPLY_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSource {
        ready_after: Option<usize>,
        checks: usize,
    }

    impl ReplySource for MockSource {
        fn reply_ready(&mut self) -> Result<bool, ChannelError> {
            self.checks += 1;
            Ok(self.ready_after.is_some_and(|after| self.checks > after))
        }

        fn read_reply(&mut self, _capacity: usize) -> Result<Option<String>, ChannelError> {
            Ok(Some("pong".to_string()))
        }
    }

    #[test]
    fn wait_for_reply_reads_once_data_arrives() {
        let mut source = MockSource {
            ready_after: Some(2),
            checks: 0,
        };
        let reply = wait_for_reply(&mut source, 64, Duration::from_secs(2)).unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));
        assert_eq!(source.checks, 3);
    }

    #[test]
    fn wait_for_reply_times_out() {
        let mut source = MockSource {
            ready_after: None,
            checks: 0,
        };
        let err = wait_for_reply(&mut source, 64, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
        assert!(source.checks >= 2);
    }

    #[test]
    fn wait_for_reply_propagates_check_failure() {
        struct Broken;
        impl ReplySource for Broken {
            fn reply_ready(&mut self) -> Result<bool, ChannelError> {
                Err(ChannelError::EndpointInvalid)
            }
            fn read_reply(&mut self, _capacity: usize) -> Result<Option<String>, ChannelError> {
                unreachable!("never ready")
            }
        }

        let err = wait_for_reply(&mut Broken, 64, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code, crate::exit::TRANSPORT_ERROR);
    }
}
