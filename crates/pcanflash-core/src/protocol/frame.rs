//! CAN2Flash frame representation

use heapless::Vec;

use super::commands::{Command, CAN_ID, CMD_PREFIX};

/// Maximum payload of a classic CAN frame
pub const MAX_DLC: usize = 8;

/// A classic CAN frame as seen by the flashing protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 11-bit identifier
    pub id: u16,
    /// Payload, at most 8 bytes
    pub data: Vec<u8, MAX_DLC>,
}

impl Frame {
    /// Create a frame, returning `None` if `data` exceeds 8 bytes
    pub fn new(id: u16, data: &[u8]) -> Option<Self> {
        Some(Self {
            id,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// Build a frame on the protocol id from a slice known to fit
    fn protocol(data: &[u8]) -> Self {
        let len = data.len().min(MAX_DLC);
        Self {
            id: CAN_ID,
            data: Vec::from_slice(&data[..len]).unwrap_or_default(),
        }
    }

    /// Command frame `7F FF <module> <cmd> <p0> <p1> <p2>`
    pub fn command(module_id: u8, command: Command, params: [u8; 3]) -> Self {
        Self::protocol(&[
            CMD_PREFIX[0],
            CMD_PREFIX[1],
            module_id,
            command.code(),
            params[0],
            params[1],
            params[2],
        ])
    }

    /// Broadcast module query `80 00 06`
    pub fn discovery_query() -> Self {
        Self::protocol(&[0x80, 0x00, 0x06])
    }

    /// Block data frame (always 8 bytes on the wire)
    pub fn block_data(payload: [u8; MAX_DLC]) -> Self {
        Self::protocol(&payload)
    }

    /// Payload length
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame uses the protocol identifier
    pub fn is_protocol(&self) -> bool {
        self.id == CAN_ID
    }

    /// Whether the payload starts with the `7F FF` command/status prefix
    pub fn has_cmd_prefix(&self) -> bool {
        self.data.len() >= 2 && self.data[..2] == CMD_PREFIX
    }
}

impl core::fmt::Display for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:03X}#", self.id)?;
        for b in &self.data {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
