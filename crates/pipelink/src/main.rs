mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pipelink", version, about = "Named duplex channel CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from(["pipelink", "send", "demo", "--data", "hello", "--wait"])
            .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.name, "demo");
                assert_eq!(args.data, "hello");
                assert!(args.wait);
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn send_requires_data() {
        let err = Cli::try_parse_from(["pipelink", "send", "demo"])
            .expect_err("missing --data should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pipelink",
            "serve",
            "demo",
            "--format",
            "json",
            "--log-level",
            "off",
        ])
        .expect("serve args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Off));
        assert!(matches!(cli.command, Command::Serve(_)));
    }

    #[test]
    fn parses_listen_count() {
        let cli = Cli::try_parse_from(["pipelink", "listen", "demo", "--count", "3"])
            .expect("listen args should parse");
        match cli.command {
            Command::Listen(args) => assert_eq!(args.count, Some(3)),
            other => panic!("expected listen, got {other:?}"),
        }
    }
}
