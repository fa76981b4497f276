//! Built-in hardware catalog
//!
//! New hardware is added by adding a row to [`BUILTIN`]; nothing else in the
//! crate branches on hardware codes.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use super::features::HwFlags;
use super::types::{EraseRegion, HardwareProfile, UNKNOWN_FLASH_ID};

/// Compile-time description of one profile
struct ProfileRow {
    hw_type: u8,
    name: &'static str,
    image_id: &'static str,
    flags: HwFlags,
    crc_startpos: u32,
    flash_offset: u32,
    max_block_size: u32,
    flash_id_type: u8,
    erase_regions: &'static [EraseRegion],
}

impl ProfileRow {
    fn to_profile(&self) -> HardwareProfile {
        HardwareProfile {
            hw_type: self.hw_type,
            name: self.name.to_string(),
            image_id: self.image_id.to_string(),
            flags: self.flags,
            crc_startpos: self.crc_startpos,
            flash_offset: self.flash_offset,
            max_block_size: self.max_block_size,
            flash_id_type: self.flash_id_type,
            erase_regions: self.erase_regions.to_vec(),
        }
    }
}

// Erase layouts per flash family

/// MB90F497G: 64 KiB mapped at 0xFF0000
///
/// Sector map of the device datasheet (32 + 8 + 8 + 16 KiB). The top
/// sector holds the bootloader and is never erased.
const FLASH_ID4: &[EraseRegion] = &[
    EraseRegion::new(0x0000, 0x8000),
    EraseRegion::new(0x8000, 0x2000),
    EraseRegion::new(0xA000, 0x2000),
    EraseRegion::skipped(0xC000, 0x4000),
];

/// LPC IAP, 256 KiB; the first 8 KiB hold the bootloader
const FLASH_ID12: &[EraseRegion] = &[
    EraseRegion::new(0x2000, 0x2000),
    EraseRegion::new(0x4000, 0x2000),
    EraseRegion::new(0x6000, 0x2000),
    EraseRegion::new(0x8000, 0x2000),
    EraseRegion::new(0xA000, 0x2000),
    EraseRegion::new(0xC000, 0x2000),
    EraseRegion::new(0xE000, 0x2000),
    EraseRegion::new(0x10000, 0x10000),
    EraseRegion::new(0x20000, 0x10000),
    EraseRegion::new(0x30000, 0x2000),
    EraseRegion::new(0x32000, 0x2000),
    EraseRegion::new(0x34000, 0x2000),
    EraseRegion::new(0x36000, 0x2000),
    EraseRegion::new(0x38000, 0x2000),
    EraseRegion::new(0x3A000, 0x2000),
    EraseRegion::new(0x3C000, 0x2000),
];

/// PCAN-Router FD flash
const FLASH_ID40: &[EraseRegion] = &[
    EraseRegion::new(0x0, 0x1000),
    EraseRegion::skipped(0x1000, 0x1000),
    EraseRegion::skipped(0x2000, 0x1000),
    EraseRegion::skipped(0x3000, 0x1000),
    EraseRegion::skipped(0x4000, 0x1000),
    EraseRegion::new(0x5000, 0x1000),
    EraseRegion::new(0x6000, 0x1000),
    EraseRegion::new(0x7000, 0x1000),
    EraseRegion::new(0x8000, 0x1000),
    EraseRegion::new(0x9000, 0x1000),
    EraseRegion::new(0xA000, 0x1000),
    EraseRegion::new(0xB000, 0x1000),
    EraseRegion::new(0xC000, 0x1000),
    EraseRegion::new(0xD000, 0x1000),
    EraseRegion::new(0xF000, 0x1000),
    EraseRegion::new(0x10000, 0x8000),
    EraseRegion::new(0x18000, 0x8000),
    EraseRegion::new(0x20000, 0x8000),
    EraseRegion::new(0x28000, 0x8000),
    EraseRegion::new(0x30000, 0x8000),
    EraseRegion::new(0x38000, 0x8000),
    EraseRegion::new(0x40000, 0x8000),
    EraseRegion::new(0x48000, 0x8000),
    EraseRegion::new(0x50000, 0x8000),
    EraseRegion::new(0x58000, 0x8000),
    EraseRegion::new(0x60000, 0x8000),
    EraseRegion::new(0x68000, 0x8000),
    EraseRegion::new(0x70000, 0x8000),
    EraseRegion::new(0x78000, 0x8000),
    EraseRegion::new(0x80000, 0x1000),
    EraseRegion::new(0x81000, 0x04A600),
    EraseRegion::skipped(0x0CB600, 0x334A00),
    EraseRegion::new(0x400000, 0x400000),
];

/// PCAN-Router Pro FD flash
///
/// Internal sectors of the Router FD layout (same controller); the
/// external flash area is left out.
const FLASH_ID42: &[EraseRegion] = &[
    EraseRegion::new(0x0, 0x1000),
    EraseRegion::skipped(0x1000, 0x1000),
    EraseRegion::skipped(0x2000, 0x1000),
    EraseRegion::skipped(0x3000, 0x1000),
    EraseRegion::skipped(0x4000, 0x1000),
    EraseRegion::new(0x5000, 0x1000),
    EraseRegion::new(0x6000, 0x1000),
    EraseRegion::new(0x7000, 0x1000),
    EraseRegion::new(0x8000, 0x1000),
    EraseRegion::new(0x9000, 0x1000),
    EraseRegion::new(0xA000, 0x1000),
    EraseRegion::new(0xB000, 0x1000),
    EraseRegion::new(0xC000, 0x1000),
    EraseRegion::new(0xD000, 0x1000),
    EraseRegion::new(0xF000, 0x1000),
    EraseRegion::new(0x10000, 0x8000),
    EraseRegion::new(0x18000, 0x8000),
    EraseRegion::new(0x20000, 0x8000),
    EraseRegion::new(0x28000, 0x8000),
    EraseRegion::new(0x30000, 0x8000),
    EraseRegion::new(0x38000, 0x8000),
    EraseRegion::new(0x40000, 0x8000),
    EraseRegion::new(0x48000, 0x8000),
    EraseRegion::new(0x50000, 0x8000),
    EraseRegion::new(0x58000, 0x8000),
    EraseRegion::new(0x60000, 0x8000),
    EraseRegion::new(0x68000, 0x8000),
    EraseRegion::new(0x70000, 0x8000),
    EraseRegion::new(0x78000, 0x8000),
];

const UNKNOWN_FLASH: &[EraseRegion] = &[];

const BUILTIN: &[ProfileRow] = &[
    ProfileRow {
        hw_type: 4,
        name: "PCAN-MicroMod",
        image_id: "PCAN_MicroMod",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::SWITCH_TO_BOOTLOADER)
            .union(HwFlags::END_PROGRAMMING)
            .union(HwFlags::RESET_AFTER_FLASH),
        crc_startpos: 0,
        flash_offset: 0xFF0000,
        max_block_size: 64,
        flash_id_type: 4,
        erase_regions: FLASH_ID4,
    },
    ProfileRow {
        hw_type: 16,
        name: "PCAN-Router",
        image_id: "PCAN-Router",
        flags: HwFlags::FDATA_INVERT.union(HwFlags::DATA_MODE8),
        crc_startpos: 0x03DF00,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 12,
        erase_regions: FLASH_ID12,
    },
    ProfileRow {
        hw_type: 19,
        name: "PCAN-MIO (32-bit)",
        image_id: "PCAN_MIOV4",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::SWITCH_TO_BOOTLOADER)
            .union(HwFlags::RESET_AFTER_FLASH),
        crc_startpos: 0xFF9000,
        flash_offset: 0,
        max_block_size: 256,
        flash_id_type: UNKNOWN_FLASH_ID,
        erase_regions: UNKNOWN_FLASH,
    },
    ProfileRow {
        hw_type: 21,
        name: "MU-Thermocouple1 CAN",
        image_id: "PCAN-MU",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::SWITCH_TO_BOOTLOADER)
            .union(HwFlags::RESET_AFTER_FLASH),
        crc_startpos: 0x002000,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: UNKNOWN_FLASH_ID,
        erase_regions: UNKNOWN_FLASH,
    },
    ProfileRow {
        hw_type: 25,
        name: "PCAN-Router Pro",
        image_id: "PCAN-Router_Pro",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::DATA_MODE8)
            .union(HwFlags::SWITCH_TO_BOOTLOADER)
            .union(HwFlags::RESET_AFTER_FLASH),
        crc_startpos: 0x03DF00,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 12,
        erase_regions: FLASH_ID12,
    },
    ProfileRow {
        hw_type: 31,
        name: "PCAN-RS-232",
        image_id: "PCAN-RS-232",
        flags: HwFlags::FDATA_INVERT.union(HwFlags::DATA_MODE8),
        crc_startpos: 0x03DF00,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 12,
        erase_regions: FLASH_ID12,
    },
    ProfileRow {
        hw_type: 35,
        name: "PCAN-Router DR",
        image_id: "PCAN-Router-DR",
        flags: HwFlags::FDATA_INVERT.union(HwFlags::DATA_MODE8),
        crc_startpos: 0x03DF00,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 12,
        erase_regions: FLASH_ID12,
    },
    ProfileRow {
        hw_type: 37,
        name: "PCAN-GPS",
        image_id: "PCAN-GPS",
        flags: HwFlags::FDATA_INVERT.union(HwFlags::DATA_MODE8),
        crc_startpos: 0x000100,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: UNKNOWN_FLASH_ID,
        erase_regions: UNKNOWN_FLASH,
    },
    ProfileRow {
        hw_type: 40,
        name: "PCAN-Router FD",
        image_id: "PCAN-Router_FD",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::DATA_MODE8)
            .union(HwFlags::END_PROGRAMMING),
        crc_startpos: 0,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 40,
        erase_regions: FLASH_ID40,
    },
    ProfileRow {
        hw_type: 42,
        name: "PCAN-Router Pro FD",
        image_id: "PCAN-Router_Pro_FD",
        flags: HwFlags::FDATA_INVERT
            .union(HwFlags::DATA_MODE8)
            .union(HwFlags::END_PROGRAMMING),
        crc_startpos: 0,
        flash_offset: 0,
        max_block_size: 512,
        flash_id_type: 42,
        erase_regions: FLASH_ID42,
    },
    ProfileRow {
        hw_type: 43,
        name: "PCAN-MiniDiag FD",
        image_id: "PCAN-MiniDiag-FD",
        flags: HwFlags::FDATA_INVERT.union(HwFlags::DATA_MODE8),
        crc_startpos: 0,
        flash_offset: 0,
        max_block_size: 256,
        flash_id_type: UNKNOWN_FLASH_ID,
        erase_regions: UNKNOWN_FLASH,
    },
    ProfileRow {
        hw_type: 44,
        name: "PCAN-MicroMod FD",
        image_id: "PCAN-MicroMod-FD",
        flags: HwFlags::FDATA_INVERT,
        crc_startpos: 0,
        flash_offset: 0,
        max_block_size: 256,
        flash_id_type: UNKNOWN_FLASH_ID,
        erase_regions: UNKNOWN_FLASH,
    },
];

static BUILTIN_CATALOG: Lazy<HardwareCatalog> = Lazy::new(|| {
    let mut catalog = HardwareCatalog::empty();
    for row in BUILTIN {
        catalog.insert(row.to_profile());
    }
    catalog
});

/// Display name of a flash family code
pub fn flash_family_name(flash_type: u8) -> &'static str {
    match flash_type {
        4 => "MB90F497G",
        12 => "LPC_IAP",
        14 => "M32C87_1MB",
        16 => "LPC23xx_256k",
        20 => "USB_PRO_FD_Flash",
        21 => "USB_FD_Flash",
        22 => "LPC407X_8X",
        40 => "FLASH_ROUTER_FD",
        42 => "FLASH_ROUTER_PRO_FD",
        43 => "LPC546xx_256k",
        44 => "LPC546xx_512k",
        UNKNOWN_FLASH_ID => "JSON",
        _ => "unknown",
    }
}

/// Table of hardware profiles keyed by hardware code
#[derive(Debug, Clone, Default)]
pub struct HardwareCatalog {
    profiles: BTreeMap<u8, HardwareProfile>,
}

impl HardwareCatalog {
    /// Create a catalog without any profiles
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// The compiled-in catalog
    pub fn builtin() -> &'static HardwareCatalog {
        &BUILTIN_CATALOG
    }

    /// Add a profile, replacing any profile with the same code
    pub fn insert(&mut self, profile: HardwareProfile) -> Option<HardwareProfile> {
        self.profiles.insert(profile.hw_type, profile)
    }

    /// Look up the profile of a hardware code
    pub fn lookup(&self, hw_type: u8) -> Option<&HardwareProfile> {
        self.profiles.get(&hw_type)
    }

    /// Display name of a hardware code ("unknown" if absent)
    pub fn name(&self, hw_type: u8) -> &str {
        self.lookup(hw_type).map_or("unknown", |p| p.name.as_str())
    }

    /// Check the flash family reported by a module against its profile
    ///
    /// Returns `false` for unknown hardware codes.
    pub fn cross_check(&self, hw_type: u8, flash_type: u8) -> bool {
        self.lookup(hw_type)
            .is_some_and(|p| p.flash_id_type == flash_type)
    }

    /// Iterate over all profiles in ascending code order
    pub fn profiles(&self) -> impl Iterator<Item = &HardwareProfile> {
        self.profiles.values()
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the catalog has no profiles
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_total_over_table() {
        let catalog = HardwareCatalog::builtin();
        for row in BUILTIN {
            let profile = catalog.lookup(row.hw_type).unwrap();
            assert_eq!(profile.name, row.name);
            assert_eq!(profile.erase_regions.len(), row.erase_regions.len());
        }
        assert_eq!(catalog.len(), BUILTIN.len());
    }

    #[test]
    fn test_lookup_absent_outside_table() {
        let catalog = HardwareCatalog::builtin();
        let known: Vec<u8> = BUILTIN.iter().map(|r| r.hw_type).collect();
        for code in 0..=u8::MAX {
            if !known.contains(&code) {
                assert!(catalog.lookup(code).is_none(), "code {}", code);
                assert_eq!(catalog.name(code), "unknown");
            }
        }
    }

    #[test]
    fn test_cross_check_rejects_mismatches() {
        let catalog = HardwareCatalog::builtin();
        for hw_type in 0..=u8::MAX {
            for flash_type in 0..=u8::MAX {
                let expected = BUILTIN
                    .iter()
                    .any(|r| r.hw_type == hw_type && r.flash_id_type == flash_type);
                assert_eq!(catalog.cross_check(hw_type, flash_type), expected);
            }
        }
    }

    #[test]
    fn test_erase_layouts_ascending() {
        for profile in HardwareCatalog::builtin().profiles() {
            for pair in profile.erase_regions.windows(2) {
                assert!(
                    pair[0].end() <= pair[1].start,
                    "{}: overlapping regions",
                    profile.name
                );
            }
            assert!(
                profile.flash_offset as u64 + profile.flash_end() <= 0x100_0000,
                "{}: layout past 24-bit addresses",
                profile.name
            );
        }
    }

    #[test]
    fn test_router_profile() {
        let router = HardwareCatalog::builtin().lookup(16).unwrap();
        assert!(router.has(HwFlags::FDATA_INVERT));
        assert!(router.has(HwFlags::DATA_MODE8));
        assert!(!router.has(HwFlags::SWITCH_TO_BOOTLOADER));
        assert_eq!(router.crc_startpos, 0x03DF00);
        assert_eq!(router.erase_size(), 0x3C000);
        assert_eq!(router.flash_end(), 0x3E000);
        assert_eq!(flash_family_name(router.flash_id_type), "LPC_IAP");
    }
}
