//! Write pass
//!
//! Each non-empty block goes through
//! `SetStartAddress -> SetBlockSize -> data -> SetChecksum -> StartProgramming -> Verify`,
//! with a status poll after every step.

use crate::bus::CanBus;
use crate::crc;
use crate::error::{Error, Result};
use crate::hardware::{DataLength, HardwareProfile};
use crate::image::{additive_checksum, FlashImage, EMPTY};
use crate::protocol::{Frame, Request, StatusBits, MAX_DLC, MAX_PARAM24};
use crate::status::{check_status, StatusChannel};

use super::progress::{FlashProgress, FlashReport};

/// First header byte of a 6-byte data frame
const DATA6_HEADER: u8 = 0x7F;

/// Bus address of an image offset
pub fn bus_address(profile: &HardwareProfile, offset: u64) -> Result<u32> {
    let address = profile.flash_offset as u64 + offset;
    if address > MAX_PARAM24 as u64 {
        return Err(Error::AddressOutOfRange(address));
    }
    Ok(address as u32)
}

/// Require every non-empty image byte to lie inside the module's flash
/// and below the 24-bit address limit
pub fn check_image_fits(profile: &HardwareProfile, image: &FlashImage) -> Result<()> {
    let end = image.data_end();
    if end == 0 {
        return Ok(());
    }
    let flash_size = profile.flash_end();
    if end > flash_size {
        return Err(Error::ImageExceedsFlash {
            end,
            flash_size,
            name: profile.name.clone(),
        });
    }
    bus_address(profile, end - 1)?;
    Ok(())
}

/// How block data is framed on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFraming {
    /// Payload bytes per frame
    pub data_len: DataLength,
    /// Invert the payload of every odd frame
    pub invert: bool,
}

/// Split a block into data frames
///
/// The last partial chunk is zero-padded. Inversion is applied to the
/// payload before the 6-byte mode header is put in front of it.
pub fn block_frames(block: &[u8], module_id: u8, framing: DataFraming) -> Vec<Frame> {
    let n = framing.data_len.bytes();
    block
        .chunks(n)
        .enumerate()
        .map(|(index, chunk)| {
            let mut payload = [0u8; MAX_DLC];
            payload[..chunk.len()].copy_from_slice(chunk);
            if framing.invert && index % 2 == 1 {
                payload[..n].iter_mut().for_each(|b| *b ^= 0xFF);
            }
            match framing.data_len {
                DataLength::Eight => Frame::block_data(payload),
                DataLength::Six => {
                    let mut data = [0u8; MAX_DLC];
                    data[0] = DATA6_HEADER;
                    data[1] = module_id;
                    data[2..].copy_from_slice(&payload[..6]);
                    Frame::block_data(data)
                }
            }
        })
        .collect()
}

/// Transfer, program and verify one block
pub fn write_block<B: CanBus>(
    channel: &mut StatusChannel<B>,
    module_id: u8,
    address: u32,
    block: &[u8],
    framing: DataFraming,
    dry_run: bool,
) -> Result<()> {
    let csum = additive_checksum(block);
    log::info!(
        "writing non empty block at offset 0x{:X} with csum 0x{:04X}",
        address,
        csum
    );

    channel.expect(
        module_id,
        Request::SetStartAddress(address),
        "flash1",
        StatusBits::STARTADDR,
    )?;
    channel.expect(
        module_id,
        Request::SetBlockSize(block.len() as u32),
        "flash2",
        StatusBits::STARTADDR | StatusBits::LENGTH,
    )?;

    for frame in block_frames(block, module_id, framing) {
        channel.send_frame(&frame)?;
    }

    let status = channel.poll(module_id)?;
    check_status(
        "flash3",
        Request::Status,
        StatusBits::STARTADDR | StatusBits::LENGTH,
        &status,
    )?;

    if let Err(e) = channel.expect(
        module_id,
        Request::SetChecksum(csum),
        "flash4",
        StatusBits::CHECKSUM | StatusBits::CHECKSUM_OK,
    ) {
        log::error!("Please check CAN netdevice tx-queue-len to avoid block data loss.");
        return Err(e);
    }

    if dry_run {
        return Ok(());
    }

    channel.expect(
        module_id,
        Request::StartProgramming,
        "flash5",
        StatusBits::CHECKSUM_OK,
    )?;
    channel.expect(
        module_id,
        Request::Verify,
        "flash6",
        StatusBits::CHECKSUM_OK | StatusBits::VERIFY_OK,
    )?;
    Ok(())
}

/// Write all non-empty blocks of the image
#[allow(clippy::too_many_arguments)]
pub fn write_image<B: CanBus, P: FlashProgress + ?Sized>(
    channel: &mut StatusChannel<B>,
    module_id: u8,
    profile: &HardwareProfile,
    image: &FlashImage,
    framing: DataFraming,
    dry_run: bool,
    progress: &mut P,
    report: &mut FlashReport,
) -> Result<()> {
    let block_size = profile.max_block_size as usize;
    let total = image.len() as u64;
    progress.writing(total);

    for offset in (0..image.len()).step_by(block_size) {
        let mut block = image.read_block(offset as u64, block_size);

        if block.iter().all(|b| *b == EMPTY) {
            report.blocks_skipped += 1;
        } else {
            report.crc_patches += crc::patch(&mut block, offset as u32, profile, image);
            let address = bus_address(profile, offset as u64)?;
            write_block(channel, module_id, address, &block, framing, dry_run)?;
            report.blocks_written += 1;
            report.bytes_written += block.len() as u64;
        }

        progress.write_progress(((offset + block_size) as u64).min(total));
    }
    Ok(())
}
