//! Checksum descriptor patching
//!
//! Some firmware images carry a packed descriptor at a fixed offset that
//! lists sub-ranges of the image together with their CRC-16. The build
//! leaves the checksums unset, so they are computed over the file contents
//! and written into the transfer block before it goes out on the bus.
//!
//! Layout (little-endian, packed):
//!
//! ```text
//! 0x00  marker    [u8; 16]
//! 0x10  version   u16
//! 0x12  day       u16
//! 0x14  month     u16
//! 0x16  year      u32
//! 0x1A  reserved  [u16; 3]
//! 0x20  mode      u16
//! 0x22  count     u16
//! 0x24  entries   { address u32, len u32, crc u16 } * count
//! ```

use crc::{Crc, CRC_16_IBM_3740};
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::hardware::HardwareProfile;
use crate::image::FlashImage;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Marker identifying a checksum descriptor
pub const CRC_MARKER: [u8; 16] = *b"CAN2FLASH_CRC16\0";

/// Patch modes that can be handled
pub const PATCHABLE_MODES: [u16; 3] = [1, 3, 4];

/// Fixed part of the descriptor
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DescriptorHeader {
    /// Must equal [`CRC_MARKER`]
    pub marker: [u8; 16],
    /// Descriptor version
    pub version: U16,
    /// Build day
    pub day: U16,
    /// Build month
    pub month: U16,
    /// Build year
    pub year: U32,
    /// Unused
    pub reserved: [U16; 3],
    /// Patch mode
    pub mode: U16,
    /// Number of entries
    pub count: U16,
}

/// One checksummed range
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockEntry {
    /// Image offset of the range
    pub address: U32,
    /// Length of the range
    pub len: U32,
    /// CRC-16 of the range
    pub crc: U16,
}

/// Size of [`DescriptorHeader`]
pub const HEADER_LEN: usize = core::mem::size_of::<DescriptorHeader>();
/// Size of [`BlockEntry`]
pub const ENTRY_LEN: usize = core::mem::size_of::<BlockEntry>();

/// CRC-16 over `[address, address + len)` of the file, past EOF as 0xFF
pub fn image_crc16(image: &FlashImage, address: u32, len: u32) -> u16 {
    let mut digest = CRC16.digest();
    let mut chunk = [0u8; 256];
    let mut n = 0;
    for b in image.range(address as u64, len as u64) {
        chunk[n] = b;
        n += 1;
        if n == chunk.len() {
            digest.update(&chunk);
            n = 0;
        }
    }
    digest.update(&chunk[..n]);
    digest.finalize()
}

/// Build a descriptor with unset checksums
pub fn encode_descriptor(version: u16, mode: u16, entries: &[(u32, u32)]) -> Vec<u8> {
    let header = DescriptorHeader {
        marker: CRC_MARKER,
        version: U16::new(version),
        day: U16::new(1),
        month: U16::new(1),
        year: U32::new(2024),
        reserved: [U16::ZERO; 3],
        mode: U16::new(mode),
        count: U16::new(entries.len() as u16),
    };
    let mut out = header.as_bytes().to_vec();
    for &(address, len) in entries {
        let entry = BlockEntry {
            address: U32::new(address),
            len: U32::new(len),
            crc: U16::ZERO,
        };
        out.extend_from_slice(entry.as_bytes());
    }
    out
}

/// Patch the checksum descriptor if it lies inside `block`
///
/// `block_offset` is the image offset of `block[0]`. Returns the number of
/// checksums written. A missing marker or an unsupported mode only logs a
/// warning.
pub fn patch(
    block: &mut [u8],
    block_offset: u32,
    profile: &HardwareProfile,
    image: &FlashImage,
) -> usize {
    if !profile.has_crc_descriptor() {
        return 0;
    }
    let anchor = profile.crc_startpos as u64;
    let start = block_offset as u64;
    if anchor < start || anchor >= start + block.len() as u64 {
        return 0;
    }
    let pos = (anchor - start) as usize;

    let (mode, count) = {
        let Ok((header, _)) = DescriptorHeader::ref_from_prefix(&block[pos..]) else {
            log::warn!(
                "checksum descriptor at {:#x} crosses the block end, not patched",
                anchor
            );
            return 0;
        };
        if header.marker != CRC_MARKER {
            log::warn!("no checksum descriptor marker at {:#x}, not patched", anchor);
            return 0;
        }
        log::info!(
            "checksum descriptor: version {:#x}, date {}/{}/{}, mode {}, count {}",
            header.version.get(),
            header.day.get(),
            header.month.get(),
            header.year.get(),
            header.mode.get(),
            header.count.get()
        );
        (header.mode.get(), header.count.get())
    };

    if !PATCHABLE_MODES.contains(&mode) {
        log::warn!("unsupported checksum patch mode {}, not patched", mode);
        return 0;
    }

    let mut patched = 0;
    for i in 0..count.min(mode) as usize {
        let at = pos + HEADER_LEN + i * ENTRY_LEN;
        let Some(Ok((entry, _))) = block.get_mut(at..).map(BlockEntry::mut_from_prefix) else {
            log::warn!("checksum entry {} crosses the block end, not patched", i);
            break;
        };
        let crc = image_crc16(image, entry.address.get(), entry.len.get());
        log::debug!(
            "entry {}: address {:#x} len {:#x} crc {:#06x} -> {:#06x}",
            i,
            entry.address.get(),
            entry.len.get(),
            entry.crc.get(),
            crc
        );
        entry.crc.set(crc);
        patched += 1;
    }
    patched
}
