use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cmd::serve::{accept_next, end_session, open_server};
use crate::cmd::{install_ctrlc_handler, resolve_name, validate_max_line, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_line, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name)?;
    let max_line = validate_max_line(args.max_line)?;
    let mut channel = open_server(&name)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if !accept_next(&mut channel, Instant::now(), None)? {
            continue;
        }

        while running.load(Ordering::SeqCst) {
            let line = match channel.read_line_string(max_line) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => return Err(channel_error("receive failed", err)),
            };

            print_line(channel.name(), &line, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                channel.close();
                return Ok(SUCCESS);
            }
        }

        end_session(&mut channel)?;
    }

    Ok(SUCCESS)
}
