//! Minimal host: connects to a companion, remembers written values and
//! returns them on read, ticking on every advance.
//!
//! Start a companion first:
//!   cargo run --features cli -- companion /tmp/vpilink-echo.sock --go 3
//!
//! Then:
//!   cargo run --example echo-host -- /tmp/vpilink-echo.sock

use std::collections::HashMap;

use vpilink::host::{Connection, Handler, ReadRequest, Sender, Status, WriteRequest};
use vpilink::transport::Address;

#[derive(Default)]
struct Echo {
    values: HashMap<(String, u32), Vec<u8>>,
}

impl Handler for Echo {
    fn on_advance(&mut self, link: &mut Sender) -> Status {
        match link.send_tick() {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }

    fn on_write(&mut self, write: &WriteRequest, _link: &mut Sender) -> Status {
        eprintln!(
            "write {}[{}] = {:?}",
            write.name, write.chunk_index, write.chunk_data
        );
        self.values.insert(
            (write.name.clone(), write.chunk_index),
            write.chunk_data.to_vec(),
        );
        0
    }

    fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status {
        let value = self
            .values
            .get(&(read.name.clone(), read.index))
            .map(Vec::as_slice)
            .unwrap_or_default();
        match link.send_read_reply(value) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address: Address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/vpilink-echo.sock".to_string())
        .parse()?;

    let mut connection = Connection::connect(&address, Echo::default())?;
    eprintln!("connected to {address} ({})", connection.framing().as_str());

    let summary = connection.run(|_| true)?;
    eprintln!(
        "handled {} requests, companion {}",
        summary.handled,
        if summary.shutdown { "closed the link" } else { "still open" }
    );

    let echo = connection.close();
    eprintln!("{} values stored", echo.values.len());
    Ok(())
}
