//! Error types for pcanflash-core
//!
//! Every error is fatal for the current run. The bootloader protocol has no
//! resynchronisation primitive, so callers abort and restart from discovery.
//! Non-fatal anomalies (a missing checksum descriptor, an unsupported patch
//! mode) are logged with `log::warn!` and never surface as an `Error`.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::Command;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    // Transport errors
    /// Sending a frame on the bus failed
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Receiving a frame from the bus failed
    #[error("failed to receive frame: {0}")]
    Receive(String),

    /// No status reply arrived within the deadline
    #[error("timeout waiting for status of module {module_id} ({waited:?})")]
    StatusTimeout {
        /// Polled module
        module_id: u8,
        /// Deadline that expired
        waited: Duration,
    },

    /// A descriptor fragment did not arrive within the deadline
    #[error("timeout waiting for JSON descriptor fragment from module {0}")]
    DescriptorTimeout(u8),

    // Protocol inconsistencies
    /// The module answered a handshake step with missing status bits
    #[error("{step} ({command}) - wrong status {got:#04X} (expected bits {expected:#04X})")]
    UnexpectedStatus {
        /// Handshake step name, e.g. "erase2"
        step: &'static str,
        /// Command that was acknowledged
        command: Command,
        /// Bits required by the step
        expected: u8,
        /// Bits the module reported
        got: u8,
    },

    /// Two discovery replies carried the same module id
    #[error("received second module with ID {0}")]
    DuplicateModule(u8),

    /// A discovery reply did not have the expected shape
    #[error("received wrong module query reply: {0:02X?}")]
    MalformedDiscoveryReply(Vec<u8>),

    /// A descriptor fragment arrived out of order
    #[error("JSON descriptor of module {module_id} out of sequence: expected {expected:#04X}, got {got:#04X}")]
    DescriptorSequence {
        /// Module sending the descriptor
        module_id: u8,
        /// Sequence byte that was allowed next
        expected: u8,
        /// Sequence byte received
        got: u8,
    },

    /// A 24-bit command parameter does not fit
    #[error("{command} parameter {value:#X} exceeds 24 bits")]
    ParameterOutOfRange {
        /// Command carrying the parameter
        command: Command,
        /// Value that was to be encoded
        value: u32,
    },

    /// The descriptor lacks the `hwType` field
    #[error("JSON descriptor of module {0} has no \"hwType\" entry")]
    MissingHwType(u8),

    /// The descriptor's `hwType` value is not a number
    #[error("JSON descriptor of module {module_id} has invalid \"hwType\" value '{value}'")]
    InvalidHwType {
        /// Module sending the descriptor
        module_id: u8,
        /// Offending value
        value: String,
    },

    /// The descriptor reports `dataMode` more than once
    #[error("JSON descriptor of module {0} reports \"dataMode\" twice")]
    DuplicateDataMode(u8),

    /// The descriptor's `dataMode` value is neither 6 nor 8
    #[error("JSON descriptor of module {module_id} has invalid \"dataMode\" value '{value}'")]
    InvalidDataMode {
        /// Module sending the descriptor
        module_id: u8,
        /// Offending value
        value: String,
    },

    // Configuration / identity errors
    /// No module answered the discovery query
    #[error("module query failed - no modules found")]
    NoModules,

    /// The requested module id was not found on the bus
    #[error("module id {0} not found in module list")]
    ModuleNotFound(u8),

    /// The module was never identified
    #[error("module {0} has no resolved hardware type")]
    Unidentified(u8),

    /// Hardware code is not in the catalog
    #[error("unknown hardware type {0}")]
    UnknownHardware(u8),

    /// Reported flash family does not match the catalog entry
    #[error("hardware {name} ({hw_type}) expects flash type {expected}, module reports {reported}")]
    FlashFamilyMismatch {
        /// Hardware code
        hw_type: u8,
        /// Hardware display name
        name: String,
        /// Flash family from the catalog
        expected: u8,
        /// Flash family reported by the module
        reported: u8,
    },

    /// The image does not contain the profile's identifier string
    #[error("image does not contain the identifier '{identifier}' for {name}")]
    ImageIdentifierMissing {
        /// Identifier searched for
        identifier: String,
        /// Hardware display name
        name: String,
    },

    /// The catalog has no erase layout for the hardware
    #[error("no flashblocks found for hardware type {hw_type} ({name})")]
    NoEraseLayout {
        /// Hardware code
        hw_type: u8,
        /// Hardware display name
        name: String,
    },

    /// The image holds data past the end of the module's flash
    #[error("image data ends at 0x{end:X}, past the 0x{flash_size:X} byte flash of {name}")]
    ImageExceedsFlash {
        /// Offset after the last non-empty byte
        end: u64,
        /// End of the erase layout
        flash_size: u64,
        /// Hardware display name
        name: String,
    },

    /// An image offset maps to a bus address beyond 24 bits
    #[error("bus address 0x{0:X} exceeds 24 bits")]
    AddressOutOfRange(u64),

    /// The image is larger than any supported flash
    #[error("image size {0} exceeds the 16 MiB limit")]
    ImageTooLarge(usize),

    /// The CAN interface transmit queue cannot hold a full block
    #[error("tx queue length {have} too short, need at least {need} (ip link set <if> txqueuelen {need})")]
    TxQueueTooShort {
        /// Configured queue length
        have: u32,
        /// Frames needed for one block
        need: u32,
    },

    /// The operator did not pick a module
    #[error("no module selected")]
    NoModuleSelected,

    /// Hardware database error
    #[error("hardware database: {0}")]
    HardwareDb(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
