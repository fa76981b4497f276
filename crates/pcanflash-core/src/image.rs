//! Firmware image access

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hardware::HW_NAME_MAX_LEN;

/// Largest image accepted (16 MiB)
pub const MAX_IMAGE_SIZE: usize = 16 * 1024 * 1024;

/// Value of erased flash
pub const EMPTY: u8 = 0xFF;

/// A flat binary firmware image held in memory
///
/// Offsets past the end of the file read as [`EMPTY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashImage {
    data: Vec<u8>,
}

impl FlashImage {
    /// Wrap an in-memory image
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_IMAGE_SIZE {
            return Err(Error::ImageTooLarge(data.len()));
        }
        Ok(Self { data })
    }

    /// Read an image file
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        log::debug!("loaded {} bytes from {}", data.len(), path.display());
        Self::from_bytes(data)
    }

    /// File size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw file contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The part of `[start, start + len)` that lies inside the file
    fn clip(&self, start: u64, len: u64) -> &[u8] {
        let size = self.data.len() as u64;
        let from = start.min(size) as usize;
        let to = start.saturating_add(len).min(size) as usize;
        &self.data[from..to]
    }

    /// Iterate over `[start, start + len)`, padded with [`EMPTY`]
    pub fn range(&self, start: u64, len: u64) -> impl Iterator<Item = u8> + '_ {
        let inside = self.clip(start, len);
        let pad = len - inside.len() as u64;
        inside
            .iter()
            .copied()
            .chain(std::iter::repeat(EMPTY).take(pad as usize))
    }

    /// Copy `len` bytes at `offset` into a new buffer, padded with [`EMPTY`]
    pub fn read_block(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![EMPTY; len];
        let inside = self.clip(offset, len as u64);
        buf[..inside.len()].copy_from_slice(inside);
        buf
    }

    /// Whether `[start, start + len)` holds nothing but erased bytes
    ///
    /// A region entirely past the end of the file is empty.
    pub fn region_is_empty(&self, start: u64, len: u64) -> bool {
        self.clip(start, len).iter().all(|b| *b == EMPTY)
    }

    /// Offset just past the last non-erased byte, 0 for an all-empty image
    pub fn data_end(&self) -> u64 {
        self.data
            .iter()
            .rposition(|b| *b != EMPTY)
            .map_or(0, |pos| pos as u64 + 1)
    }

    /// Search for a NUL-terminated hardware identifier
    ///
    /// The identifier must be followed by a NUL within the first
    /// [`HW_NAME_MAX_LEN`] bytes of the match, i.e. `PCAN-Router` does not
    /// match inside `PCAN-Router_Pro`.
    pub fn contains_identifier(&self, identifier: &str) -> bool {
        let id = identifier.as_bytes();
        let id = &id[..id.len().min(HW_NAME_MAX_LEN)];
        if id.is_empty() {
            return false;
        }
        self.data.windows(HW_NAME_MAX_LEN).any(|window| {
            window.starts_with(id) && (id.len() == HW_NAME_MAX_LEN || window[id.len()] == 0)
        })
    }
}

/// Additive 16-bit checksum used by the write handshake
pub fn additive_checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, b| acc.wrapping_add(*b as u16))
}
