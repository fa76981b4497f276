//! Hardware database loading
//!
//! Additional hardware profiles can be supplied as RON files. Loaded
//! profiles are merged over the built-in catalog, so a file may both add new
//! hardware codes and override existing ones.

use std::fs;
use std::io;
use std::path::Path;

use super::catalog::HardwareCatalog;
use super::features::HwFlags;
use super::types::{EraseRegion, HardwareProfile, HW_NAME_MAX_LEN};
use crate::protocol::MAX_PARAM24;

/// Error type for hardware database operations
#[derive(Debug, thiserror::Error)]
pub enum HardwareDbError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<HardwareDbError> for crate::Error {
    fn from(e: HardwareDbError) -> Self {
        crate::Error::HardwareDb(e.to_string())
    }
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Size with human-readable units (for RON parsing)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
    /// Size in mebibytes (1024 * 1024 bytes)
    MiB(u32),
}

impl Size {
    /// Convert to bytes
    ///
    /// Sizes that do not fit in 32 bits are a validation error.
    pub fn to_bytes(self) -> Result<u32, HardwareDbError> {
        let bytes = match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
            Size::MiB(n) => n.checked_mul(1024 * 1024),
        };
        bytes.ok_or_else(|| HardwareDbError::Validation(format!("size {:?} overflows", self)))
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[serde(default)]
struct FlagsDef {
    fdata_invert: bool,
    switch_to_bootloader: bool,
    reset_after_flash: bool,
    end_programming: bool,
    data_mode8: bool,
}

impl From<FlagsDef> for HwFlags {
    fn from(def: FlagsDef) -> Self {
        let mut flags = HwFlags::empty();
        flags.set(HwFlags::FDATA_INVERT, def.fdata_invert);
        flags.set(HwFlags::SWITCH_TO_BOOTLOADER, def.switch_to_bootloader);
        flags.set(HwFlags::RESET_AFTER_FLASH, def.reset_after_flash);
        flags.set(HwFlags::END_PROGRAMMING, def.end_programming);
        flags.set(HwFlags::DATA_MODE8, def.data_mode8);
        flags
    }
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct RegionDef {
    start: u32,
    len: Size,
    #[serde(default)]
    skip: bool,
}

fn default_flash_id() -> u8 {
    super::types::UNKNOWN_FLASH_ID
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ProfileDef {
    hw_type: u8,
    name: String,
    image_id: String,
    #[serde(default)]
    flags: FlagsDef,
    #[serde(default)]
    crc_startpos: u32,
    #[serde(default)]
    flash_offset: u32,
    max_block_size: Size,
    #[serde(default = "default_flash_id")]
    flash_id_type: u8,
    #[serde(default)]
    erase_regions: Vec<RegionDef>,
}

/// Top-level layout of a hardware database file
#[derive(Debug, Clone, serde::Deserialize)]
struct DatabaseDef {
    profiles: Vec<ProfileDef>,
}

impl TryFrom<ProfileDef> for HardwareProfile {
    type Error = HardwareDbError;

    fn try_from(def: ProfileDef) -> Result<Self, Self::Error> {
        let erase_regions = def
            .erase_regions
            .iter()
            .map(|r| {
                Ok(EraseRegion {
                    start: r.start,
                    len: r.len.to_bytes()?,
                    skip: r.skip,
                })
            })
            .collect::<Result<Vec<_>, HardwareDbError>>()?;
        let profile = HardwareProfile {
            hw_type: def.hw_type,
            name: def.name,
            image_id: def.image_id,
            flags: def.flags.into(),
            crc_startpos: def.crc_startpos,
            flash_offset: def.flash_offset,
            max_block_size: def.max_block_size.to_bytes()?,
            flash_id_type: def.flash_id_type,
            erase_regions,
        };
        validate(&profile)?;
        Ok(profile)
    }
}

fn validate(profile: &HardwareProfile) -> Result<(), HardwareDbError> {
    let fail = |msg: String| {
        Err(HardwareDbError::Validation(format!(
            "{} ({}): {}",
            profile.name, profile.hw_type, msg
        )))
    };

    if profile.image_id.is_empty() || profile.image_id.len() >= HW_NAME_MAX_LEN {
        return fail(format!(
            "image_id must be 1..{} bytes long",
            HW_NAME_MAX_LEN - 1
        ));
    }
    if profile.max_block_size == 0 || profile.max_block_size > MAX_PARAM24 {
        return fail(format!(
            "max_block_size must be 1..={:#x} bytes",
            MAX_PARAM24
        ));
    }
    if profile.flash_offset as u64 + profile.flash_end() > MAX_PARAM24 as u64 + 1 {
        return fail("erase layout does not fit the 24-bit address space".into());
    }
    for region in &profile.erase_regions {
        if region.len == 0 {
            return fail(format!("empty erase region at {:#x}", region.start));
        }
        if region.start.checked_add(region.len).is_none() {
            return fail(format!("erase region at {:#x} overflows", region.start));
        }
    }
    for pair in profile.erase_regions.windows(2) {
        if pair[0].end() > pair[1].start {
            return fail(format!(
                "erase regions at {:#x} and {:#x} overlap or are out of order",
                pair[0].start, pair[1].start
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Loading
// ============================================================================

impl HardwareCatalog {
    /// Copy of the built-in catalog, ready for merging database files
    pub fn with_builtin() -> Self {
        HardwareCatalog::builtin().clone()
    }

    /// Load hardware profiles from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, HardwareDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load hardware profiles from a RON string
    pub fn load_ron(&mut self, content: &str) -> Result<usize, HardwareDbError> {
        let db: DatabaseDef = ron::from_str(content)?;

        // Validate everything before touching the catalog
        let profiles = db
            .profiles
            .into_iter()
            .map(HardwareProfile::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let count = profiles.len();
        for profile in profiles {
            if let Some(old) = self.insert(profile) {
                log::debug!("hardware database overrides {} ({})", old.name, old.hw_type);
            }
        }
        Ok(count)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, HardwareDbError> {
        let mut total = 0;

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                paths.push(path);
            }
        }
        // Later files override earlier ones, so keep the order stable
        paths.sort();

        for path in paths {
            total += self.load_file(&path)?;
        }
        Ok(total)
    }

    /// Load a database file or directory, depending on what `path` is
    pub fn load_path(&mut self, path: &Path) -> Result<usize, HardwareDbError> {
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"(
        profiles: [
            (
                hw_type: 99,
                name: "Test-Board",
                image_id: "TEST-BOARD",
                flags: (fdata_invert: true, data_mode8: true),
                max_block_size: B(256),
                flash_id_type: 7,
                erase_regions: [
                    (start: 0x0, len: KiB(4), skip: true),
                    (start: 0x1000, len: KiB(4)),
                ],
            ),
            (
                hw_type: 16,
                name: "PCAN-Router (patched)",
                image_id: "PCAN-Router",
                max_block_size: B(512),
            ),
        ],
    )"#;

    #[test]
    fn test_load_ron_merges_over_builtin() {
        let mut catalog = HardwareCatalog::with_builtin();
        let before = catalog.len();
        let count = catalog.load_ron(SAMPLE).unwrap();
        assert_eq!(count, 2);
        assert_eq!(catalog.len(), before + 1);

        let board = catalog.lookup(99).unwrap();
        assert_eq!(board.max_block_size, 256);
        assert_eq!(board.flags, HwFlags::FDATA_INVERT | HwFlags::DATA_MODE8);
        assert_eq!(board.erase_regions.len(), 2);
        assert!(board.erase_regions[0].skip);
        assert!(catalog.cross_check(99, 7));

        let router = catalog.lookup(16).unwrap();
        assert_eq!(router.name, "PCAN-Router (patched)");
        assert!(router.is_deferred());
        assert!(router.erase_regions.is_empty());

        // The shared built-in catalog is untouched
        assert_eq!(HardwareCatalog::builtin().name(16), "PCAN-Router");
    }

    #[test]
    fn test_overlapping_regions_rejected() {
        let bad = r#"(profiles: [(
            hw_type: 1, name: "x", image_id: "X", max_block_size: B(64),
            erase_regions: [(start: 0, len: KiB(8)), (start: 0x1000, len: KiB(4))],
        )])"#;
        let mut catalog = HardwareCatalog::empty();
        assert!(matches!(
            catalog.load_ron(bad),
            Err(HardwareDbError::Validation(_))
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_long_image_id_rejected() {
        let bad = r#"(profiles: [(
            hw_type: 1, name: "x", image_id: "ABCDEFGHIJKLMNOPQRSTUVWXYZ", max_block_size: B(64),
        )])"#;
        let mut catalog = HardwareCatalog::empty();
        assert!(catalog.load_ron(bad).is_err());
    }

    #[test]
    fn test_size_overflow_rejected() {
        assert_eq!(Size::MiB(4).to_bytes().unwrap(), 0x40_0000);
        assert!(matches!(
            Size::MiB(4096).to_bytes(),
            Err(HardwareDbError::Validation(_))
        ));
        assert!(Size::KiB(u32::MAX).to_bytes().is_err());

        let bad = r#"(profiles: [(
            hw_type: 1, name: "x", image_id: "X", max_block_size: B(64),
            erase_regions: [(start: 0, len: MiB(4096))],
        )])"#;
        let mut catalog = HardwareCatalog::empty();
        assert!(matches!(
            catalog.load_ron(bad),
            Err(HardwareDbError::Validation(_))
        ));
    }

    #[test]
    fn test_layout_past_24_bits_rejected() {
        let bad = r#"(profiles: [(
            hw_type: 1, name: "x", image_id: "X", max_block_size: B(64),
            flash_offset: 0xFF0000,
            erase_regions: [(start: 0, len: KiB(128))],
        )])"#;
        let mut catalog = HardwareCatalog::empty();
        assert!(matches!(
            catalog.load_ron(bad),
            Err(HardwareDbError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let mut catalog = HardwareCatalog::empty();
        assert!(matches!(
            catalog.load_ron("(profiles: [oops])"),
            Err(HardwareDbError::Parse(_))
        ));
    }

    #[test]
    fn test_shipped_definitions_load() {
        let mut catalog = HardwareCatalog::with_builtin();
        let count = catalog
            .load_ron(include_str!("../../../../hardware/router-fd-internal.ron"))
            .unwrap();
        assert_eq!(count, 1);
        let fd = catalog.lookup(40).unwrap();
        assert_eq!(fd.erase_size(), 0x7F000);
        assert!(fd.erase_regions[1].skip);
        assert!(catalog.cross_check(40, 40));
    }
}
