use pipelink_transport::make_channel_name;

use crate::cmd::NameArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_name, OutputFormat};

pub fn run(args: NameArgs, format: OutputFormat) -> CliResult<i32> {
    let name = make_channel_name(&args.short_name)
        .map_err(|err| transport_error("invalid channel name", err))?;
    print_name(&args.short_name, &name, format);
    Ok(SUCCESS)
}
