//! Hardware profile type definitions

use super::features::HwFlags;

/// Flash family code meaning "identified through the JSON descriptor"
///
/// Modules with newer bootloaders report this value instead of a flash
/// family, and profiles for such hardware declare it as their family.
pub const UNKNOWN_FLASH_ID: u8 = 0xFF;

/// Maximum length of the image identifier, including the terminating NUL
pub const HW_NAME_MAX_LEN: usize = 24;

/// One erasable region of device flash
///
/// `start` is an offset into the image file; the address sent on the bus is
/// `start + HardwareProfile::flash_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRegion {
    /// Offset of the region in the image
    pub start: u32,
    /// Length of the region in bytes
    pub len: u32,
    /// Region is protected by the bootloader and never erased
    pub skip: bool,
}

impl EraseRegion {
    /// Create a new erase region
    pub const fn new(start: u32, len: u32) -> Self {
        Self {
            start,
            len,
            skip: false,
        }
    }

    /// Create a region that is never erased
    pub const fn skipped(start: u32, len: u32) -> Self {
        Self {
            start,
            len,
            skip: true,
        }
    }

    /// First offset past the region
    pub const fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Flashing parameters of one hardware type
///
/// Profiles are created once when the catalog is built and are never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareProfile {
    /// Hardware type code reported by the module
    pub hw_type: u8,
    /// Display name (e.g. "PCAN-Router")
    pub name: String,
    /// Identifier the image must contain (e.g. "PCAN-Router")
    pub image_id: String,
    /// Capability flags
    pub flags: HwFlags,
    /// Image offset of the checksum descriptor (0 = none)
    pub crc_startpos: u32,
    /// Added to image offsets to form bus addresses
    pub flash_offset: u32,
    /// Transfer block size in bytes
    pub max_block_size: u32,
    /// Flash family the module must report
    pub flash_id_type: u8,
    /// Erase layout, in ascending order
    pub erase_regions: Vec<EraseRegion>,
}

impl HardwareProfile {
    /// Check a capability flag
    pub fn has(&self, flag: HwFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether the profile carries a checksum descriptor anchor
    pub fn has_crc_descriptor(&self) -> bool {
        self.crc_startpos != 0
    }

    /// Whether the module identifies itself through the JSON descriptor
    pub fn is_deferred(&self) -> bool {
        self.flash_id_type == UNKNOWN_FLASH_ID
    }

    /// Data bytes per frame when the module does not negotiate one
    pub fn default_data_len(&self) -> DataLength {
        if self.has(HwFlags::DATA_MODE8) {
            DataLength::Eight
        } else {
            DataLength::Six
        }
    }

    /// Total bytes covered by the erase layout
    pub fn erase_size(&self) -> u64 {
        self.erase_regions.iter().map(|r| r.len as u64).sum()
    }

    /// Image offset just past the last erase region
    pub fn flash_end(&self) -> u64 {
        self.erase_regions
            .iter()
            .map(|r| r.start as u64 + r.len as u64)
            .max()
            .unwrap_or(0)
    }
}

/// Payload bytes carried per data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLength {
    /// 2 constant header bytes + 6 payload bytes
    Six,
    /// 8 payload bytes
    Eight,
}

impl DataLength {
    /// Payload bytes per frame
    pub const fn bytes(self) -> usize {
        match self {
            DataLength::Six => 6,
            DataLength::Eight => 8,
        }
    }

    /// Frames needed to carry `len` bytes
    pub const fn frames_for(self, len: usize) -> usize {
        len.div_ceil(self.bytes())
    }
}

impl core::fmt::Display for DataLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.bytes())
    }
}
