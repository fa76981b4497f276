//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Highest module id on the bus
const MAX_MODULE_ID: u8 = 15;

/// Parse a module id (decimal or 0x hex, 0..15)
pub fn parse_module_id(s: &str) -> Result<u8, String> {
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))?
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))?
    };
    if value > MAX_MODULE_ID {
        return Err(format!("Module id must be 0..{}", MAX_MODULE_ID));
    }
    Ok(value)
}

const INTERFACE_HELP: &str =
    "CAN interface (e.g. can0), or dummy[:<hw>,<hw>...] for emulated modules";

#[derive(Parser)]
#[command(name = "pcanflash")]
#[command(author, version, about = "Flash firmware on PCAN modules over CAN", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Additional hardware definitions (RON file or directory of .ron files)
    /// Defaults to looking in /etc/pcanflash/hardware/ and /usr/share/pcanflash/hardware/
    #[arg(long, global = true)]
    pub hw_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash a firmware image to a module
    Flash {
        #[arg(help = INTERFACE_HELP)]
        interface: String,

        /// Binary image file
        #[arg(short, long)]
        file: PathBuf,

        /// Module id to flash (asked for when several modules answer)
        #[arg(short = 'i', long = "id", value_parser = parse_module_id)]
        module_id: Option<u8>,

        /// Send addresses and data but never erase, program or verify
        #[arg(long)]
        dry_run: bool,

        /// Reset the module after flashing
        #[arg(long)]
        reset: bool,

        /// Delay between JSON descriptor fragments in ms
        #[arg(long, default_value_t = 0)]
        pacing: u8,
    },

    /// List the modules on the bus
    Query {
        #[arg(help = INTERFACE_HELP)]
        interface: String,
    },

    /// Decode flashing traffic on the bus
    Monitor {
        #[arg(help = INTERFACE_HELP)]
        interface: String,

        /// Colored output (commands red, status blue)
        #[arg(short, long)]
        color: bool,
    },

    /// List supported hardware
    ListHardware,
}
