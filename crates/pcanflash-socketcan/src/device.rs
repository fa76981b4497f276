//! SocketCAN bus implementation

use crate::error::{Result, SocketCanError};
use log::{debug, info, warn};
use pcanflash_core::bus::CanBus;
use pcanflash_core::protocol::{Frame, CAN_ID};
use socketcan::{
    CanFilter, CanFrame, CanSocket, EmbeddedFrame, Id, Socket, SocketOptions, StandardId,
};
use std::io;
use std::time::{Duration, Instant};

/// Sysfs root for network devices
const NET_SYSFS_ROOT: &str = "/sys/class/net";

/// Kernel limit for interface names, including the NUL
const IFNAMSIZ: usize = 16;

/// Standard frame identifier mask
const CAN_SFF_MASK: u32 = 0x7FF;

/// Configuration for opening a CAN interface
#[derive(Debug, Clone)]
pub struct SocketCanConfig {
    /// Network interface name (e.g., "can0")
    pub iface: String,
    /// Only deliver frames on the protocol identifier
    pub filter: bool,
}

impl SocketCanConfig {
    /// Create a new configuration for the given interface
    pub fn new(iface: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            filter: true,
        }
    }
}

/// Raw CAN socket bound to one interface
///
/// Implements [`CanBus`] for the protocol engine. The kernel filter drops
/// everything but the protocol identifier, so the engine only sees
/// bootloader traffic.
pub struct SocketCanBus {
    socket: CanSocket,
    iface: String,
    tx_queue_len: Option<u32>,
}

impl SocketCanBus {
    /// Open a CAN interface
    pub fn open(config: &SocketCanConfig) -> Result<Self> {
        let iface = config.iface.as_str();
        if iface.is_empty() || iface.len() >= IFNAMSIZ {
            return Err(SocketCanError::InvalidInterface(iface.to_string()));
        }

        debug!("Opening CAN interface {}", iface);
        let socket = CanSocket::open(iface).map_err(|e| SocketCanError::Open {
            iface: iface.to_string(),
            source: e,
        })?;

        if config.filter {
            socket
                .set_filters(&[CanFilter::new(CAN_ID as u32, CAN_SFF_MASK)])
                .map_err(|e| SocketCanError::Filter {
                    iface: iface.to_string(),
                    source: e,
                })?;
        }

        let tx_queue_len = match read_tx_queue_len(iface) {
            Ok(len) => Some(len),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        info!(
            "Opened CAN interface {} (tx queue length {})",
            iface,
            tx_queue_len.map_or_else(|| "unknown".to_string(), |l| l.to_string())
        );

        Ok(Self {
            socket,
            iface: iface.to_string(),
            tx_queue_len,
        })
    }

    /// Interface name
    pub fn iface(&self) -> &str {
        &self.iface
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        let can_frame = to_can_frame(frame)?;
        self.socket
            .write_frame(&can_frame)
            .map_err(|e| SocketCanError::WriteFailed {
                frame: frame.to_string(),
                source: e,
            })
    }

    fn read(&self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.socket.read_frame_timeout(remaining) {
                Ok(can_frame) => {
                    if let Some(frame) = from_can_frame(&can_frame) {
                        return Ok(Some(frame));
                    }
                }
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => {
                    return Err(SocketCanError::ReadFailed {
                        iface: self.iface.clone(),
                        source: e,
                    })
                }
            }
            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }
}

impl CanBus for SocketCanBus {
    fn send(&mut self, frame: &Frame) -> pcanflash_core::Result<()> {
        Ok(self.write(frame)?)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> pcanflash_core::Result<Option<Frame>> {
        Ok(self.read(timeout)?)
    }

    fn tx_queue_len(&self) -> Option<u32> {
        self.tx_queue_len
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Convert an engine frame into a classic data frame
fn to_can_frame(frame: &Frame) -> Result<CanFrame> {
    let id = StandardId::new(frame.id)
        .ok_or_else(|| SocketCanError::InvalidFrame(format!("id {:#x}", frame.id)))?;
    CanFrame::new(id, &frame.data).ok_or_else(|| SocketCanError::InvalidFrame(frame.to_string()))
}

/// Convert a received frame, dropping remote, error and extended frames
fn from_can_frame(can_frame: &CanFrame) -> Option<Frame> {
    let CanFrame::Data(_) = can_frame else {
        return None;
    };
    match can_frame.id() {
        Id::Standard(id) => Frame::new(id.as_raw(), can_frame.data()),
        Id::Extended(_) => None,
    }
}

/// Read a string from a sysfs file
fn read_sysfs_string(sysfs_path: &str, filename: &str) -> Result<String> {
    let path = format!("{}/{}", sysfs_path, filename);
    let content = std::fs::read_to_string(&path).map_err(|e| SocketCanError::SysfsRead {
        path: path.clone(),
        source: e,
    })?;
    Ok(content.trim().to_string())
}

/// Transmit queue length of a network interface
pub fn read_tx_queue_len(iface: &str) -> Result<u32> {
    let sysfs_path = format!("{}/{}", NET_SYSFS_ROOT, iface);
    let value = read_sysfs_string(&sysfs_path, "tx_queue_len")?;
    value.parse().map_err(|_| SocketCanError::SysfsParse {
        path: format!("{}/tx_queue_len", sysfs_path),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_name_limits() {
        assert!(matches!(
            SocketCanBus::open(&SocketCanConfig::new("")),
            Err(SocketCanError::InvalidInterface(_))
        ));
        assert!(matches!(
            SocketCanBus::open(&SocketCanConfig::new("a_very_long_name0")),
            Err(SocketCanError::InvalidInterface(_))
        ));
    }

    #[test]
    fn test_frame_conversion() {
        let frame = Frame::new(CAN_ID, &[0x7F, 0xFF, 0x02, 0x00, 0, 0, 0]).unwrap();
        let can_frame = to_can_frame(&frame).unwrap();
        assert_eq!(can_frame.data(), &frame.data[..]);
        assert_eq!(from_can_frame(&can_frame), Some(frame));
    }

    #[test]
    fn test_extended_frames_dropped() {
        let id = socketcan::ExtendedId::new(0x7E7).unwrap();
        let can_frame = CanFrame::new(id, &[1, 2, 3]).unwrap();
        assert_eq!(from_can_frame(&can_frame), None);
    }

    #[test]
    fn test_tx_queue_len_missing_interface() {
        assert!(matches!(
            read_tx_queue_len("nosuchcan9"),
            Err(SocketCanError::SysfsRead { .. })
        ));
    }
}
