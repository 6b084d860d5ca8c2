use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipelink_channel::{Channel, Lifecycle};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct LineOutput<'a> {
    channel: &'a str,
    size: usize,
    line: &'a str,
    timestamp: String,
}

/// One received line.
pub fn print_line(channel: &str, line: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = LineOutput {
                channel,
                size: line.len(),
                line,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "LINE"])
                .add_row(vec![
                    channel.to_string(),
                    line.len().to_string(),
                    line.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("channel={channel} size={} line={line}", line.len());
        }
        OutputFormat::Raw => {
            print_raw(line.as_bytes());
            print_raw(b"\n");
        }
    }
}

/// Snapshot of a channel for `info`.
#[derive(Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub role: String,
    pub transport: Option<&'static str>,
    pub connected: bool,
    pub lifecycle: &'static str,
    pub data_available: Option<bool>,
    pub last_error: Option<String>,
}

impl ChannelStatus {
    pub fn capture(channel: &mut Channel) -> Self {
        let data_available = if channel.is_connected() {
            channel.data_available().ok()
        } else {
            None
        };
        Self {
            name: channel.name().to_string(),
            role: channel.role().to_string(),
            transport: channel.transport_name(),
            connected: channel.is_connected(),
            lifecycle: lifecycle_label(channel.lifecycle()),
            data_available,
            last_error: channel.last_error().map(str::to_string),
        }
    }
}

pub fn print_status(status: &ChannelStatus, format: OutputFormat) {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(status).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["name".to_string(), status.name.clone()])
                .add_row(vec!["role".to_string(), status.role.clone()])
                .add_row(vec![
                    "transport".to_string(),
                    or_dash(status.transport.map(str::to_string)),
                ])
                .add_row(vec!["connected".to_string(), status.connected.to_string()])
                .add_row(vec!["lifecycle".to_string(), status.lifecycle.to_string()])
                .add_row(vec![
                    "data available".to_string(),
                    or_dash(status.data_available.map(|v| v.to_string())),
                ])
                .add_row(vec!["last error".to_string(), or_dash(status.last_error.clone())]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Channel Status:");
            println!("  Name:           {}", status.name);
            println!("  Role:           {}", status.role);
            println!(
                "  Transport:      {}",
                or_dash(status.transport.map(str::to_string))
            );
            println!("  Connected:      {}", status.connected);
            println!("  Lifecycle:      {}", status.lifecycle);
            println!(
                "  Data available: {}",
                or_dash(status.data_available.map(|v| v.to_string()))
            );
            println!("  Last error:     {}", or_dash(status.last_error.clone()));
        }
        OutputFormat::Raw => {
            println!("{}", if status.connected { "connected" } else { "unconnected" });
        }
    }
}

#[derive(Serialize)]
struct NameOutput<'a> {
    short_name: &'a str,
    name: &'a str,
}

pub fn print_name(short_name: &str, name: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = NameOutput { short_name, name };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["SHORT NAME", "CHANNEL NAME"])
                .add_row(vec![short_name, name]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{short_name} -> {name}"),
        OutputFormat::Raw => println!("{name}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn lifecycle_label(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::NeverConnected => "never-connected",
        Lifecycle::Connected => "connected",
        Lifecycle::Disconnected => "disconnected",
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_of_failed_client_carries_error() {
        let name = format!("/tmp/pipelink-status-missing-{}", std::process::id());
        let mut channel = Channel::connect_client(&name);
        let status = ChannelStatus::capture(&mut channel);

        assert_eq!(status.role, "client");
        assert!(!status.connected);
        assert_eq!(status.lifecycle, "never-connected");
        assert_eq!(status.transport, None);
        assert_eq!(status.data_available, None);
        assert!(status.last_error.is_some());

        let json = serde_json::to_value(&status).expect("status should serialize");
        assert_eq!(json["connected"], false);
        assert_eq!(json["name"], name.as_str());
    }

    #[test]
    fn lifecycle_labels_are_stable() {
        assert_eq!(lifecycle_label(Lifecycle::Disconnected), "disconnected");
        assert_eq!(lifecycle_label(Lifecycle::Connected), "connected");
    }
}
