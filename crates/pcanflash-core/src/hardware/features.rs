//! Hardware capability flags

use bitflags::bitflags;

bitflags! {
    /// Capability flags for a hardware profile
    ///
    /// These flags gate the optional steps of a flashing run and select
    /// the framing of block data on the bus.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HwFlags: u32 {
        /// Invert the payload of every other data frame
        const FDATA_INVERT         = 1 << 0;
        /// Send "switch to bootloader" before erasing
        const SWITCH_TO_BOOTLOADER = 1 << 1;
        /// Reset the module after flashing
        const RESET_AFTER_FLASH    = 1 << 2;
        /// Send "end programming" after the last block
        const END_PROGRAMMING      = 1 << 3;
        /// Module accepts 8 payload bytes per data frame
        const DATA_MODE8           = 1 << 4;
    }
}

impl Default for HwFlags {
    fn default() -> Self {
        HwFlags::empty()
    }
}
