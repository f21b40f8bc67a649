use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use vpilink_host::{Address, FrameConfig};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod companion;
pub mod host;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a companion and serve its requests from an in-memory signal store.
    Host(HostArgs),
    /// Listen for a host and drive it with a scripted request sequence.
    Companion(CompanionArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format),
        Command::Companion(args) => companion::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Companion address: a seqpacket socket path, unix-stream:PATH, or tcp://HOST:PORT.
    pub address: String,
    /// Send a tick every N advances (0 disables ticks).
    #[arg(long, default_value = "1")]
    pub tick_every: u64,
    /// Exit after handling N requests.
    #[arg(long)]
    pub count: Option<u64>,
    /// Keep retrying the connection for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub wait: Option<String>,
    /// Read timeout; the stop flag is checked each time it expires.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct CompanionArgs {
    /// Address to listen on: a seqpacket socket path, unix-stream:PATH, or tcp://HOST:PORT.
    pub address: String,
    /// Request script, one step per line: `go`, `wait`, `write NAME INDEX HEX`, `read NAME INDEX`.
    #[arg(long, value_name = "FILE", conflicts_with = "go")]
    pub script: Option<PathBuf>,
    /// Send N advance requests, waiting for a tick after each.
    #[arg(long, value_name = "N", default_value = "1")]
    pub go: u32,
    /// Read timeout while waiting for ticks and replies.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_address(input: &str) -> CliResult<Address> {
    input
        .parse()
        .map_err(|err| transport_error("invalid address", err))
}

pub(crate) fn frame_config(timeout: Option<&str>) -> CliResult<FrameConfig> {
    Ok(FrameConfig {
        read_timeout: timeout.map(parse_duration).transpose()?,
        ..FrameConfig::default()
    })
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
