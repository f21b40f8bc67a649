use std::path::Path;

use tracing::info;
use vpilink_host::{Companion, CompanionListener, Message};

use crate::cmd::{frame_config, parse_address, CompanionArgs};
use crate::exit::{host_error, io_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{from_hex, print_event, Event, OutputFormat};

const ROLE: &str = "companion";

/// One line of a companion script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send `Go`.
    Go,
    /// Wait for one message from the host.
    Wait,
    /// Send `Write`.
    Write {
        name: String,
        index: u32,
        data: Vec<u8>,
    },
    /// Send `Read` and wait for the reply.
    Read { name: String, index: u32 },
}

/// Parse a script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(text: &str) -> CliResult<Vec<Step>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            parse_step(line)
                .map_err(|msg| CliError::new(USAGE, format!("script line {n}: {msg}")))
        })
        .collect()
}

fn parse_step(line: &str) -> Result<Step, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["go"] => Ok(Step::Go),
        ["wait"] => Ok(Step::Wait),
        ["write", name, index, data] => Ok(Step::Write {
            name: (*name).to_string(),
            index: parse_index(index)?,
            data: from_hex(data).ok_or_else(|| format!("invalid hex data: {data}"))?,
        }),
        ["read", name, index] => Ok(Step::Read {
            name: (*name).to_string(),
            index: parse_index(index)?,
        }),
        _ => Err(format!("unrecognized step: {line}")),
    }
}

fn parse_index(input: &str) -> Result<u32, String> {
    input
        .parse()
        .map_err(|_| format!("invalid index: {input}"))
}

fn go_steps(count: u32) -> Vec<Step> {
    (0..count).flat_map(|_| [Step::Go, Step::Wait]).collect()
}

fn load_script(path: &Path) -> CliResult<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed to read script {}", path.display()), err))?;
    parse_script(&text)
}

pub fn run(args: CompanionArgs, format: OutputFormat) -> CliResult<i32> {
    let address = parse_address(&args.address)?;
    let config = frame_config(args.timeout.as_deref())?;
    let steps = match &args.script {
        Some(path) => load_script(path)?,
        None => go_steps(args.go),
    };

    let listener = CompanionListener::bind_with_config(&address, config)
        .map_err(|err| host_error("bind failed", err))?;
    info!(address = %listener.address(), "waiting for host");

    let mut companion = listener
        .accept()
        .map_err(|err| host_error("accept failed", err))?;
    info!(framing = companion.framing().as_str(), "host connected");

    let code = run_steps(&mut companion, &steps, format)?;
    companion.close();
    Ok(code)
}

fn run_steps(companion: &mut Companion, steps: &[Step], format: OutputFormat) -> CliResult<i32> {
    for step in steps {
        match step {
            Step::Go => companion
                .send_go()
                .map_err(|err| host_error("send failed", err))?,
            Step::Write { name, index, data } => companion
                .send_write(name, *index, data)
                .map_err(|err| host_error("send failed", err))?,
            Step::Read { name, index } => {
                companion
                    .send_read(name, *index)
                    .map_err(|err| host_error("send failed", err))?;
                // Ticks that arrive first are reported; the step ends on the reply.
                loop {
                    match receive(companion, format)? {
                        Some(Message::ReadReply(_)) => break,
                        Some(_) => continue,
                        None => return Ok(FAILURE),
                    }
                }
            }
            Step::Wait => {
                if receive(companion, format)?.is_none() {
                    return Ok(FAILURE);
                }
            }
        }
    }
    Ok(SUCCESS)
}

/// Receive and print one message; `None` once the host has gone.
fn receive(companion: &mut Companion, format: OutputFormat) -> CliResult<Option<Message>> {
    let message = companion
        .recv()
        .map_err(|err| host_error("receive failed", err))?;
    let event = match &message {
        Some(Message::Tick) => Event::new(ROLE, "tick"),
        Some(Message::ReadReply(reply)) => Event::new(ROLE, "read_reply").data(&reply.chunk_data),
        Some(other) => Event::new(ROLE, other.kind().as_str()),
        None => Event::new(ROLE, "shutdown"),
    };
    print_event(&event, format);
    Ok(message)
}
