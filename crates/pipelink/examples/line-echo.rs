//! Line echo server: accepts one client at a time and echoes each line back.
//!
//! Run with:
//!   cargo run --example line-echo
//!
//! In another terminal:
//!   cargo run --features cli -- send line-echo --data hello --wait

use pipelink::{make_channel_name, Channel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = make_channel_name("line-echo")?;
    let mut server = Channel::create_server(&name);
    if let Some(err) = server.last_error() {
        return Err(format!("cannot create {name}: {err}").into());
    }
    eprintln!("Listening on {name}");

    for session in 1..=3 {
        if !server.wait_for_connection(0) {
            break;
        }
        eprintln!("Session {session}: client connected");

        while let Some(line) = server.read_line_string(1024)? {
            eprintln!("Received {} bytes", line.len());
            server.write_line(&line)?;
        }

        if !server.disconnect() {
            let reason = server.last_error().unwrap_or("no client was connected");
            return Err(format!("disconnect failed: {reason}").into());
        }
        eprintln!("Session {session}: client left");
    }

    server.close();
    Ok(())
}
