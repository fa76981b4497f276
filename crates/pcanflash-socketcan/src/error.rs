//! Error types for SocketCAN operations

use std::io;
use thiserror::Error;

/// SocketCAN-specific errors
#[derive(Debug, Error)]
pub enum SocketCanError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opening the CAN socket failed
    #[error("Failed to open CAN interface '{iface}': {source}")]
    Open {
        iface: String,
        #[source]
        source: io::Error,
    },

    /// Installing the receive filter failed
    #[error("Failed to set receive filter on '{iface}': {source}")]
    Filter {
        iface: String,
        #[source]
        source: io::Error,
    },

    /// Writing a frame failed
    #[error("Write of frame {frame} failed: {source}")]
    WriteFailed {
        frame: String,
        #[source]
        source: io::Error,
    },

    /// Reading a frame failed
    #[error("Read from '{iface}' failed: {source}")]
    ReadFailed {
        iface: String,
        #[source]
        source: io::Error,
    },

    /// Frame cannot be represented as a classic CAN frame
    #[error("Invalid CAN frame: {0}")]
    InvalidFrame(String),

    /// Failed to read sysfs attribute
    #[error("Failed to read sysfs attribute '{path}': {source}")]
    SysfsRead {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse sysfs attribute
    #[error("Failed to parse sysfs attribute '{path}': {value}")]
    SysfsParse { path: String, value: String },

    /// Interface name is empty or too long
    #[error("Invalid CAN interface name: '{0}'")]
    InvalidInterface(String),
}

/// Result type for SocketCAN operations
pub type Result<T> = std::result::Result<T, SocketCanError>;

impl From<SocketCanError> for pcanflash_core::Error {
    fn from(e: SocketCanError) -> Self {
        match e {
            SocketCanError::WriteFailed { .. } | SocketCanError::InvalidFrame(_) => {
                pcanflash_core::Error::Send(e.to_string())
            }
            SocketCanError::ReadFailed { .. } => pcanflash_core::Error::Receive(e.to_string()),
            SocketCanError::Io(e) => pcanflash_core::Error::Io(e),
            other => pcanflash_core::Error::Io(io::Error::other(other.to_string())),
        }
    }
}
