use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// One protocol event as seen by the `host` or `companion` command.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub role: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    pub timestamp: String,
}

impl Event {
    pub fn new(role: &'static str, event: &'static str) -> Self {
        Self {
            role,
            event,
            name: None,
            index: None,
            data: None,
            status: None,
            timestamp: now_unix_seconds(),
        }
    }

    pub fn signal(mut self, name: &str, index: u32) -> Self {
        self.name = Some(name.to_string());
        self.index = Some(index);
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = Some(to_hex(data));
        self
    }

    pub fn status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROLE", "EVENT", "SIGNAL", "INDEX", "DATA", "STATUS"])
                .add_row(vec![
                    event.role.to_string(),
                    event.event.to_string(),
                    event.name.clone().unwrap_or_default(),
                    optional(event.index),
                    event.data.clone().unwrap_or_default(),
                    optional(event.status),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!("{} {}", event.role, event.event);
            if let Some(name) = &event.name {
                let _ = write!(line, " signal={name}");
            }
            if let Some(index) = event.index {
                let _ = write!(line, " index={index}");
            }
            if let Some(data) = &event.data {
                let _ = write!(line, " data={data}");
            }
            if let Some(status) = event.status {
                let _ = write!(line, " status={status}");
            }
            println!("{line}");
        }
    }
}

/// Lowercase hex without separators; empty data is the empty string.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Parse hex produced by [`to_hex`] (case-insensitive). `-` means no data.
pub fn from_hex(input: &str) -> Option<Vec<u8>> {
    if input == "-" {
        return Some(Vec::new());
    }
    if input.len() % 2 != 0 || !input.is_ascii() {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok())
        .collect()
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
