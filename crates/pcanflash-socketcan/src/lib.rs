//! pcanflash-socketcan - Linux SocketCAN transport
//!
//! This crate connects the CAN2Flash protocol engine to a CAN interface
//! through the Linux SocketCAN subsystem. Any adapter with a SocketCAN
//! driver works, including the PEAK `peak_usb` and `peak_pci` drivers.
//!
//! # Overview
//!
//! A raw CAN socket is bound to the interface and a kernel filter is
//! installed for the bootloader identifier 0x7E7. The interface transmit
//! queue length is read from sysfs when the socket is opened: a complete
//! data block is queued without flow control, so a short queue drops
//! frames and the block checksum fails.
//!
//! # Example
//!
//! ```ignore
//! use pcanflash_socketcan::{SocketCanBus, SocketCanConfig};
//! use pcanflash_core::bus::CanBus;
//!
//! let mut bus = SocketCanBus::open(&SocketCanConfig::new("can0"))?;
//! println!("tx queue: {:?}", bus.tx_queue_len());
//! ```
//!
//! # Usage with pcanflash CLI
//!
//! ```bash
//! # List modules on can0
//! pcanflash query can0
//!
//! # Flash a module
//! pcanflash flash can0 -f firmware.bin
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with SocketCAN support (`CONFIG_CAN`, `CONFIG_CAN_RAW`)
//! - An interface that is up with the bus bitrate of the modules
//! - A transmit queue long enough for one block of data frames
//!
//! # Interface Setup
//!
//! ```bash
//! ip link set can0 up type can bitrate 500000
//! ip link set can0 txqueuelen 1000
//! cat /sys/class/net/can0/tx_queue_len
//! ```

pub mod device;
pub mod error;

// Re-exports
pub use device::{read_tx_queue_len, SocketCanBus, SocketCanConfig};
pub use error::{Result, SocketCanError};

/// Open a CAN interface and return a boxed CanBus
///
/// This is a convenience function for use in the CLI transport dispatch.
///
/// # Arguments
///
/// * `iface` - Network interface name, e.g. `can0`
pub fn open_socketcan(
    iface: &str,
) -> std::result::Result<Box<dyn pcanflash_core::bus::CanBus>, Box<dyn std::error::Error>> {
    let bus = SocketCanBus::open(&SocketCanConfig::new(iface))?;
    Ok(Box::new(bus))
}
