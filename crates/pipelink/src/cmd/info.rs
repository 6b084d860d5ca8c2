use crate::cmd::{connect_with_timeout, parse_duration, resolve_name, InfoArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_status, ChannelStatus, OutputFormat};

/// Attach, print what the channel reports, and detach. An unreachable channel
/// still prints its status (with the failure) and exits non-zero.
pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let name = resolve_name(&args.name)?;
    let timeout = parse_duration(&args.timeout)?;

    let mut channel = connect_with_timeout(&name, timeout);
    let status = ChannelStatus::capture(&mut channel);
    print_status(&status, format);

    let code = if status.connected { SUCCESS } else { FAILURE };
    channel.close();
    Ok(code)
}
