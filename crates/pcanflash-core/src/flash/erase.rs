//! Erase pass

use crate::bus::CanBus;
use crate::error::Result;
use crate::hardware::{EraseRegion, HardwareProfile};
use crate::image::FlashImage;
use crate::protocol::{Request, StatusBits};
use crate::status::StatusChannel;

use super::progress::{FlashProgress, FlashReport};
use super::write::bus_address;

/// Regions that need erasing: not protected and not empty in the image
pub fn regions_to_erase<'p>(
    profile: &'p HardwareProfile,
    image: &FlashImage,
) -> Vec<&'p EraseRegion> {
    profile
        .erase_regions
        .iter()
        .filter(|r| !r.skip && !image.region_is_empty(r.start as u64, r.len as u64))
        .collect()
}

/// Erase one region
///
/// `address` is the bus address of the region. In dry-run mode the address
/// and length are still announced but the erase command is never sent.
pub fn erase_region<B: CanBus>(
    channel: &mut StatusChannel<B>,
    module_id: u8,
    address: u32,
    len: u32,
    dry_run: bool,
) -> Result<()> {
    log::info!(
        "erasing block at startaddr 0x{:06X} with block size 0x{:06X}",
        address,
        len
    );

    channel.expect(
        module_id,
        Request::SetStartAddress(address),
        "erase1",
        StatusBits::STARTADDR,
    )?;
    channel.expect(
        module_id,
        Request::SetBlockSize(len),
        "erase2",
        StatusBits::STARTADDR | StatusBits::LENGTH,
    )?;

    if dry_run {
        log::debug!("dry run, erase of 0x{:06X} suppressed", address);
        return Ok(());
    }

    channel.expect(
        module_id,
        Request::EraseSector,
        "erase3",
        StatusBits::ERASE_OK,
    )?;
    Ok(())
}

/// Erase every region of the profile that holds data in the image
pub fn erase_image<B: CanBus, P: FlashProgress + ?Sized>(
    channel: &mut StatusChannel<B>,
    module_id: u8,
    profile: &HardwareProfile,
    image: &FlashImage,
    dry_run: bool,
    progress: &mut P,
    report: &mut FlashReport,
) -> Result<()> {
    let regions = regions_to_erase(profile, image);
    report.regions_skipped += profile.erase_regions.len() - regions.len();

    let bytes: u64 = regions.iter().map(|r| r.len as u64).sum();
    progress.erasing(regions.len(), bytes);

    for (done, region) in regions.iter().enumerate() {
        let address = bus_address(profile, region.start as u64)?;
        erase_region(channel, module_id, address, region.len, dry_run)?;
        if !dry_run {
            report.regions_erased += 1;
        }
        progress.erase_progress(done + 1);
    }
    Ok(())
}
