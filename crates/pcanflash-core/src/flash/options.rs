//! Run configuration

use std::time::Duration;

/// Receive deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Quiet period ending discovery
    pub discovery: Duration,
    /// Deadline for each status reply and descriptor fragment
    pub status: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            discovery: Duration::from_secs(1),
            status: Duration::from_secs(3),
        }
    }
}

/// Options of a flashing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashOptions {
    /// Module to flash; asked for when several modules answer
    pub module_id: Option<u8>,
    /// Send addresses, lengths and data but never erase, program or verify
    pub dry_run: bool,
    /// Reset the module after flashing even if the hardware does not ask for it
    pub force_reset: bool,
    /// Receive deadlines
    pub timeouts: Timeouts,
    /// Delay hint (ms) between descriptor fragments
    pub json_pacing: u8,
}
