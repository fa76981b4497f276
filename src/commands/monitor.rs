//! Monitor command implementation
//!
//! Prints every command and status frame seen on the bootloader identifier,
//! decoded. Data frames and discovery traffic are not shown.

use pcanflash_core::bus::CanBus;
use pcanflash_core::hardware::HardwareCatalog;
use pcanflash_core::protocol::{describe, Decoded};
use std::io::Write;
use std::time::Duration;

use super::transport::open_bus;

const ATTRESET: &str = "\x1b[0m";
const FGRED: &str = "\x1b[31m";
const FGBLUE: &str = "\x1b[34m";

/// Receive poll interval
const POLL: Duration = Duration::from_secs(1);

/// Render a decoded frame, optionally colored
fn render(decoded: &Decoded, color: bool) -> String {
    if !color {
        return decoded.text().to_string();
    }
    let fg = match decoded {
        Decoded::Command(_) => FGRED,
        Decoded::Status(_) => FGBLUE,
    };
    format!("{}{}{}", fg, decoded.text(), ATTRESET)
}

/// Run the monitor command until the bus fails
pub fn run_monitor(
    interface: &str,
    catalog: &HardwareCatalog,
    color: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut bus = open_bus(interface, catalog)?;
    log::info!("monitoring {} (Ctrl-C to stop)", interface);

    let stdout = std::io::stdout();
    loop {
        let Some(frame) = bus.recv_timeout(POLL)? else {
            continue;
        };
        if let Some(decoded) = describe(&frame) {
            let mut out = stdout.lock();
            writeln!(out, "{}", render(&decoded, color))?;
            out.flush()?;
        }
    }
}
