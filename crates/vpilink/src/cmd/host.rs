use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use vpilink_host::{
    Address, Connection, FrameConfig, Handler, HostError, Outcome, ReadRequest, Sender, Status,
    WriteRequest,
};
use vpilink_message::MessageError;

use crate::cmd::{frame_config, parse_address, parse_duration, HostArgs};
use crate::exit::{host_error, is_timeout, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, Event, OutputFormat};

const ROLE: &str = "host";

/// Status returned to the dispatcher when a callback succeeded.
const STATUS_OK: Status = 0;
/// Status returned when a tick or reply could not be sent.
const STATUS_SEND_FAILED: Status = -1;

/// In-memory signal values keyed by name and chunk index.
pub struct SignalStore {
    values: HashMap<(String, u32), Vec<u8>>,
    advances: u64,
    tick_every: u64,
    handled: u64,
    format: Option<OutputFormat>,
}

impl SignalStore {
    pub fn new(tick_every: u64, format: Option<OutputFormat>) -> Self {
        Self {
            values: HashMap::new(),
            advances: 0,
            tick_every,
            handled: 0,
            format,
        }
    }

    pub fn value(&self, name: &str, index: u32) -> Option<&[u8]> {
        self.values
            .get(&(name.to_string(), index))
            .map(Vec::as_slice)
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    fn emit(&self, event: Event) {
        if let Some(format) = self.format {
            print_event(&event, format);
        }
    }
}

impl Handler for SignalStore {
    fn on_advance(&mut self, link: &mut Sender) -> Status {
        self.handled += 1;
        self.advances += 1;
        let mut status = STATUS_OK;
        if self.tick_every > 0 && self.advances % self.tick_every == 0 {
            if let Err(err) = link.send_tick() {
                warn!(%err, "failed to send tick");
                status = STATUS_SEND_FAILED;
            }
        }
        self.emit(Event::new(ROLE, "go").status(status));
        status
    }

    fn on_write(&mut self, write: &WriteRequest, _link: &mut Sender) -> Status {
        self.handled += 1;
        self.values.insert(
            (write.name.clone(), write.chunk_index),
            write.chunk_data.to_vec(),
        );
        self.emit(
            Event::new(ROLE, "write")
                .signal(&write.name, write.chunk_index)
                .data(&write.chunk_data)
                .status(STATUS_OK),
        );
        STATUS_OK
    }

    fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status {
        self.handled += 1;
        let value = self.value(&read.name, read.index).unwrap_or_default().to_vec();
        let status = match link.send_read_reply(&value) {
            Ok(()) => STATUS_OK,
            Err(err) => {
                warn!(%err, name = %read.name, index = read.index, "failed to send read reply");
                STATUS_SEND_FAILED
            }
        };
        self.emit(
            Event::new(ROLE, "read")
                .signal(&read.name, read.index)
                .data(&value)
                .status(status),
        );
        status
    }
}

pub fn run(args: HostArgs, format: OutputFormat) -> CliResult<i32> {
    let address = parse_address(&args.address)?;
    let config = frame_config(args.timeout.as_deref())?;
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let tick_every = args.tick_every;
    let mut connection = connect(
        &address,
        || SignalStore::new(tick_every, Some(format)),
        config,
        wait,
    )?;

    loop {
        if !running.load(Ordering::SeqCst) {
            info!("interrupted");
            break;
        }
        if let Some(count) = args.count {
            if connection.handler().handled() >= count {
                break;
            }
        }

        match connection.receive_and_dispatch() {
            Ok(Outcome::Handled(_)) => {}
            Ok(Outcome::Shutdown) => {
                print_event(&Event::new(ROLE, "shutdown"), format);
                break;
            }
            Err(err) if is_timeout(&err) => continue,
            Err(err) if is_skippable(&err) => {
                warn!(%err, "skipping rejected message");
            }
            Err(err) => return Err(host_error("dispatch failed", err)),
        }
    }

    let store = connection.close();
    info!(handled = store.handled(), "host finished");
    Ok(SUCCESS)
}

/// Errors after which the link is still in step: an unknown type byte, or a
/// well-formed message the host does not accept. Malformed payloads are not.
fn is_skippable(err: &HostError) -> bool {
    matches!(
        err,
        HostError::Message(MessageError::UnknownType(_)) | HostError::UnexpectedMessage(_)
    )
}

fn connect(
    address: &Address,
    make_store: impl Fn() -> SignalStore,
    config: FrameConfig,
    wait: Option<Duration>,
) -> CliResult<Connection<SignalStore>> {
    let start = Instant::now();
    loop {
        match Connection::connect_with_config(address, make_store(), config.clone()) {
            Ok(connection) => return Ok(connection),
            Err(err) => {
                let retry = wait.is_some_and(|wait| start.elapsed() < wait);
                if !retry || !matches!(err, HostError::Transport(_)) {
                    return Err(host_error("connect failed", err));
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
