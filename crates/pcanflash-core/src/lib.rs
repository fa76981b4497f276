//! pcanflash-core - CAN2Flash bootloader protocol engine
//!
//! This crate implements the host side of the CAN2Flash protocol used by
//! PCAN modules: module discovery, identification (directly or through the
//! JSON descriptor), the erase/write/verify handshakes and the patching of
//! embedded checksum descriptors.
//!
//! The bus is abstracted behind [`bus::CanBus`]; see `pcanflash-socketcan`
//! for Linux SocketCAN and `pcanflash-dummy` for an emulated module.
//!
//! # Example
//!
//! ```ignore
//! use pcanflash_core::flash::{FlashOptions, Flasher, NoProgress};
//! use pcanflash_core::hardware::HardwareCatalog;
//! use pcanflash_core::image::FlashImage;
//!
//! fn flash<B: pcanflash_core::bus::CanBus>(bus: B, path: &std::path::Path) -> pcanflash_core::Result<()> {
//!     let image = FlashImage::load(path)?;
//!     let mut flasher = Flasher::new(bus, HardwareCatalog::builtin(), FlashOptions::default());
//!     let report = flasher.flash(&image, |_| None, &mut NoProgress)?;
//!     println!("{} blocks written", report.blocks_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod crc;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod flash;
pub mod hardware;
pub mod image;
pub mod protocol;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
