//! pcanflash - Flash firmware on PCAN modules over CAN
//!
//! Host side of the CAN2Flash bootloader protocol used by PEAK-System
//! PCAN-Router, PCAN-RS-232, PCAN-GPS, PCAN-MicroMod and related modules.
//!
//! # Architecture
//!
//! The protocol engine lives in `pcanflash-core` and talks to the bus through
//! the `CanBus` trait. This binary picks a transport for the interface name:
//! - **SocketCAN** (`can0`, `vcan0`, ...) via `pcanflash-socketcan`
//! - **dummy** emulated modules via `pcanflash-dummy`
//!
//! and runs the flash, query or monitor command on top of it.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use pcanflash_core::flash::{FlashOptions, Timeouts};
use pcanflash_core::hardware::HardwareCatalog;
use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Load hardware catalog
    let catalog = match load_hardware_catalog(cli.hw_db.as_deref()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to load hardware database: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} hardware profiles", catalog.len());

    match cli.command {
        Commands::Flash {
            interface,
            file,
            module_id,
            dry_run,
            reset,
            pacing,
        } => {
            let options = FlashOptions {
                module_id,
                dry_run,
                force_reset: reset,
                timeouts: Timeouts::default(),
                json_pacing: pacing,
            };
            commands::flash::run_flash(&interface, &catalog, &file, options)
        }
        Commands::Query { interface } => {
            commands::query::run_query(&interface, &catalog, FlashOptions::default())
        }
        Commands::Monitor { interface, color } => {
            commands::monitor::run_monitor(&interface, &catalog, color)
        }
        Commands::ListHardware => {
            commands::list_hardware(&catalog);
            Ok(())
        }
    }
}

/// Built-in catalog merged with hardware definitions from disk
fn load_hardware_catalog(
    path: Option<&Path>,
) -> Result<HardwareCatalog, Box<dyn std::error::Error>> {
    let mut catalog = HardwareCatalog::with_builtin();

    if let Some(path) = path {
        // User specified a path
        if !path.exists() {
            return Err(format!("Hardware database path not found: {}", path.display()).into());
        }
        let count = catalog.load_path(path)?;
        log::info!("Loaded {} hardware definitions from {}", count, path.display());
    } else {
        // Try default locations
        let default_paths = [
            PathBuf::from("/etc/pcanflash/hardware"),
            PathBuf::from("/usr/share/pcanflash/hardware"),
        ];

        for dir in &default_paths {
            if dir.is_dir() {
                match catalog.load_dir(dir) {
                    Ok(count) => {
                        log::debug!("Loaded {} hardware definitions from {}", count, dir.display());
                    }
                    Err(e) => {
                        log::warn!("Failed to load hardware from {}: {}", dir.display(), e);
                    }
                }
            }
        }
    }

    Ok(catalog)
}
