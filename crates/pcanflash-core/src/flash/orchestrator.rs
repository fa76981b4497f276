//! Flashing session
//!
//! [`Flasher`] runs the whole sequence against one bus:
//!
//! 1. discovery and identity resolution of every module
//! 2. module selection, catalog lookup and flash family cross-check
//! 3. erase layout, image identifier, image size and tx queue pre-flight
//!    checks
//! 4. switch to bootloader (if the hardware needs it)
//! 5. erase pass, write pass
//! 6. end programming and reset (if the hardware needs it)
//!
//! Every error is fatal and aborts the remaining steps.

use crate::bus::CanBus;
use crate::descriptor::{read_descriptor, DescriptorInfo};
use crate::discovery::{discover, Module};
use crate::error::{Error, Result};
use crate::hardware::{flash_family_name, HardwareCatalog, HardwareProfile, HwFlags};
use crate::image::FlashImage;
use crate::protocol::Request;
use crate::status::StatusChannel;

use super::erase::erase_image;
use super::options::FlashOptions;
use super::progress::{FlashProgress, FlashReport};
use super::write::{check_image_fits, write_image, DataFraming};

/// Frames the tx queue must hold on top of one block of data
const TX_QUEUE_HEADROOM: u32 = 2;

/// Drives a flashing session over one bus
pub struct Flasher<'c, B> {
    channel: StatusChannel<B>,
    catalog: &'c HardwareCatalog,
    options: FlashOptions,
}

impl<'c, B: CanBus> Flasher<'c, B> {
    /// Create a session on `bus`
    pub fn new(bus: B, catalog: &'c HardwareCatalog, options: FlashOptions) -> Self {
        Self {
            channel: StatusChannel::new(bus, options.timeouts.status),
            catalog,
            options,
        }
    }

    /// Session options
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Release the bus
    pub fn into_bus(self) -> B {
        self.channel.into_inner()
    }

    /// Discover all modules and resolve their identity
    ///
    /// Fails with [`Error::NoModules`] when nothing answers.
    pub fn query_modules(&mut self) -> Result<Vec<Module>> {
        let replies = discover(&mut self.channel, self.options.timeouts.discovery)?;
        if replies.is_empty() {
            return Err(Error::NoModules);
        }

        let mut modules = Vec::with_capacity(replies.len());
        for reply in replies.into_values() {
            let mut module = Module::new(reply);
            self.identify(&mut module)?;
            modules.push(module);
        }
        Ok(modules)
    }

    /// Resolve hardware and flash codes of a module
    ///
    /// Modules reporting the deferred sentinel are asked for their JSON
    /// descriptor.
    pub fn identify(&mut self, module: &mut Module) -> Result<()> {
        let (major, minor) = module.identity.bootloader_version();
        log::info!(
            "module id {:02} - date {} bootloader v{}.{}",
            module.id,
            module.identity.bootloader_date(),
            major,
            minor
        );

        let status = self.channel.poll(module.id)?;
        module.status = Some(status.raw_status);
        module.flash_type = Some(status.flash_type);

        if status.is_deferred() {
            let text = read_descriptor(&mut self.channel, module.id, self.options.json_pacing)?;
            let info = DescriptorInfo::parse(module.id, &text)?;
            module.hw_type = Some(info.hw_type);
            module.data_len = info.data_mode;
            module.bootloader = info.bootloader;
            module.firmware = info.firmware;
        } else {
            module.hw_type = Some(status.hw_type);
        }

        if let Some(hw_type) = module.hw_type {
            log::info!(
                "             - hardware {} ({}) flash type {} ({})",
                hw_type,
                self.catalog.name(hw_type),
                status.flash_type,
                flash_family_name(status.flash_type)
            );
        }
        if let Some(bootloader) = &module.bootloader {
            log::info!("             - bootloader {}", bootloader);
        }
        if let Some(firmware) = &module.firmware {
            log::info!("             - firmware {}", firmware);
        }
        Ok(())
    }

    /// Pick the module to flash
    fn select<'m, F>(&self, modules: &'m [Module], choose: F) -> Result<&'m Module>
    where
        F: FnOnce(&[Module]) -> Option<u8>,
    {
        let id = match (self.options.module_id, modules) {
            (Some(id), _) => id,
            (None, [only]) => only.id,
            (None, _) => choose(modules).ok_or(Error::NoModuleSelected)?,
        };
        modules
            .iter()
            .find(|m| m.id == id)
            .ok_or(Error::ModuleNotFound(id))
    }

    /// Catalog lookup and flash family cross-check
    pub fn resolve_profile(&self, module: &Module) -> Result<&'c HardwareProfile> {
        let hw_type = module.hw_type.ok_or(Error::Unidentified(module.id))?;
        let profile = self
            .catalog
            .lookup(hw_type)
            .ok_or(Error::UnknownHardware(hw_type))?;
        let reported = module.flash_type.ok_or(Error::Unidentified(module.id))?;
        if !self.catalog.cross_check(hw_type, reported) {
            return Err(Error::FlashFamilyMismatch {
                hw_type,
                name: profile.name.clone(),
                expected: profile.flash_id_type,
                reported,
            });
        }
        Ok(profile)
    }

    /// Require a tx queue long enough for one block plus headroom
    fn check_tx_queue(&self, profile: &HardwareProfile, framing: DataFraming) -> Result<()> {
        let frames = framing.data_len.frames_for(profile.max_block_size as usize) as u32;
        let need = frames + TX_QUEUE_HEADROOM;
        match self.channel.bus().tx_queue_len() {
            Some(have) if have < need => Err(Error::TxQueueTooShort { have, need }),
            Some(have) => {
                log::debug!("tx queue length {} (need {})", have, need);
                Ok(())
            }
            None => {
                log::warn!(
                    "cannot determine tx queue length, make sure it holds at least {} frames",
                    need
                );
                Ok(())
            }
        }
    }

    /// Send a command and log the resulting status without checking it
    fn command_and_poll(&mut self, module_id: u8, request: Request) -> Result<()> {
        let status = self.channel.command(module_id, request)?;
        log::debug!("{}: status {:#04X}", request.command(), status.raw_status);
        Ok(())
    }

    /// Run a complete flashing session
    ///
    /// `choose` is asked for a module id when several modules answer and no
    /// id was preselected.
    pub fn flash<F, P>(
        &mut self,
        image: &FlashImage,
        choose: F,
        progress: &mut P,
    ) -> Result<FlashReport>
    where
        F: FnOnce(&[Module]) -> Option<u8>,
        P: FlashProgress + ?Sized,
    {
        let modules = self.query_modules()?;
        let module = self.select(&modules, choose)?.clone();
        let profile = self.resolve_profile(&module)?;

        if profile.erase_regions.is_empty() {
            return Err(Error::NoEraseLayout {
                hw_type: profile.hw_type,
                name: profile.name.clone(),
            });
        }

        if !image.contains_identifier(&profile.image_id) {
            return Err(Error::ImageIdentifierMissing {
                identifier: profile.image_id.clone(),
                name: profile.name.clone(),
            });
        }
        check_image_fits(profile, image)?;

        let framing = DataFraming {
            data_len: module.data_len.unwrap_or_else(|| profile.default_data_len()),
            invert: profile.has(HwFlags::FDATA_INVERT),
        };
        self.check_tx_queue(profile, framing)?;

        let dry_run = self.options.dry_run;
        let id = module.id;
        log::info!(
            "flashing module id {} ({}, {} data bytes per frame){}",
            id,
            profile.name,
            framing.data_len,
            if dry_run { " - dry run" } else { "" }
        );

        let mut report = FlashReport {
            module_id: id,
            hw_type: profile.hw_type,
            dry_run,
            ..FlashReport::default()
        };

        if profile.has(HwFlags::SWITCH_TO_BOOTLOADER) {
            log::info!("switching module {} to bootloader", id);
            self.command_and_poll(id, Request::SwitchToBootloader)?;
        }

        log::info!("erasing flash sectors");
        erase_image(
            &mut self.channel,
            id,
            profile,
            image,
            dry_run,
            progress,
            &mut report,
        )?;

        log::info!("writing flash blocks");
        write_image(
            &mut self.channel,
            id,
            profile,
            image,
            framing,
            dry_run,
            progress,
            &mut report,
        )?;

        if profile.has(HwFlags::END_PROGRAMMING) {
            log::info!("ending programming");
            self.command_and_poll(id, Request::EndProgramming)?;
        }

        if profile.has(HwFlags::RESET_AFTER_FLASH) || self.options.force_reset {
            log::info!("resetting module {}", id);
            self.channel.send(id, Request::Reset)?;
        }

        progress.complete(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::NoProgress;
    use crate::protocol::{Command, DiscoveryReply, Frame};
    use crate::testing::{MockBus, MockModule};
    use std::cell::RefCell;

    /// Bus with one module that also answers discovery
    fn router_bus(id: u8, hw: u8, flash: u8) -> MockBus {
        let module = RefCell::new(MockModule::new(id, hw, flash));
        MockBus::new(move |frame: &Frame| {
            if *frame == Frame::discovery_query() {
                vec![DiscoveryReply::encode(id, [1, 1, 0x24], 0x21)]
            } else {
                module.borrow_mut().respond(frame)
            }
        })
    }

    fn router_image() -> FlashImage {
        let mut data = vec![0xFF; 0x4000];
        data[0x2100..0x210C].copy_from_slice(b"PCAN-Router\0");
        FlashImage::from_bytes(data).unwrap()
    }

    #[test]
    fn test_flash_router() {
        let catalog = HardwareCatalog::builtin();
        let mut flasher = Flasher::new(router_bus(0, 16, 12), catalog, FlashOptions::default());
        let report = flasher
            .flash(&router_image(), |_| None, &mut NoProgress)
            .unwrap();
        assert_eq!(report.regions_erased, 1);
        assert_eq!(report.blocks_written, 1);
        assert_eq!(report.hw_type, 16);

        let commands = flasher.into_bus().commands();
        assert_eq!(commands.first(), Some(&Command::SetStartAddress));
        assert!(!commands.contains(&Command::Reset));
        assert!(!commands.contains(&Command::SwitchToBootloader));
    }

    #[test]
    fn test_flash_family_mismatch_before_erase() {
        let catalog = HardwareCatalog::builtin();
        let mut flasher = Flasher::new(router_bus(0, 16, 40), catalog, FlashOptions::default());
        let err = flasher
            .flash(&router_image(), |_| None, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FlashFamilyMismatch {
                hw_type: 16,
                expected: 12,
                reported: 40,
                ..
            }
        ));
        assert!(flasher.into_bus().commands().is_empty());
    }

    #[test]
    fn test_unknown_hardware() {
        let catalog = HardwareCatalog::builtin();
        let mut flasher = Flasher::new(router_bus(0, 99, 12), catalog, FlashOptions::default());
        assert!(matches!(
            flasher.flash(&router_image(), |_| None, &mut NoProgress),
            Err(Error::UnknownHardware(99))
        ));
    }

    #[test]
    fn test_missing_identifier() {
        let catalog = HardwareCatalog::builtin();
        let mut flasher = Flasher::new(router_bus(0, 16, 12), catalog, FlashOptions::default());
        let image = FlashImage::from_bytes(vec![0u8; 0x1000]).unwrap();
        assert!(matches!(
            flasher.flash(&image, |_| None, &mut NoProgress),
            Err(Error::ImageIdentifierMissing { .. })
        ));
        assert!(flasher.into_bus().commands().is_empty());
    }

    #[test]
    fn test_missing_erase_layout_is_fatal() {
        let mut catalog = HardwareCatalog::builtin().clone();
        let mut router = catalog.lookup(16).unwrap().clone();
        router.erase_regions.clear();
        catalog.insert(router);

        let mut flasher = Flasher::new(router_bus(0, 16, 12), &catalog, FlashOptions::default());
        let err = flasher
            .flash(&router_image(), |_| None, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::NoEraseLayout { hw_type: 16, .. }));
        assert!(flasher.into_bus().commands().is_empty());
    }

    #[test]
    fn test_oversized_image_rejected_before_any_command() {
        let catalog = HardwareCatalog::builtin();
        let mut data = vec![0xFF; 0x10200];
        data[0x100..0x10E].copy_from_slice(b"PCAN_MicroMod\0");
        data[0x10000] = 0x00;
        let image = FlashImage::from_bytes(data).unwrap();

        let mut flasher = Flasher::new(router_bus(1, 4, 4), catalog, FlashOptions::default());
        let err = flasher.flash(&image, |_| None, &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::ImageExceedsFlash {
                end: 0x10001,
                flash_size: 0x10000,
                ..
            }
        ));
        assert!(flasher.into_bus().commands().is_empty());
    }

    #[test]
    fn test_tx_queue_too_short() {
        let catalog = HardwareCatalog::builtin();
        let mut bus = router_bus(0, 16, 12);
        bus.set_tx_queue_len(Some(10));
        let mut flasher = Flasher::new(bus, catalog, FlashOptions::default());
        assert!(matches!(
            flasher.flash(&router_image(), |_| None, &mut NoProgress),
            Err(Error::TxQueueTooShort { have: 10, need: 66 })
        ));
    }

    #[test]
    fn test_preselected_module_missing() {
        let catalog = HardwareCatalog::builtin();
        let options = FlashOptions {
            module_id: Some(3),
            ..FlashOptions::default()
        };
        let mut flasher = Flasher::new(router_bus(0, 16, 12), catalog, options);
        assert!(matches!(
            flasher.flash(&router_image(), |_| None, &mut NoProgress),
            Err(Error::ModuleNotFound(3))
        ));
    }

    #[test]
    fn test_no_modules() {
        let catalog = HardwareCatalog::builtin();
        let bus = MockBus::new(|_: &Frame| vec![]);
        let mut flasher = Flasher::new(bus, catalog, FlashOptions::default());
        assert!(matches!(flasher.query_modules(), Err(Error::NoModules)));
    }

    #[test]
    fn test_forced_reset_sent_without_poll() {
        let catalog = HardwareCatalog::builtin();
        let options = FlashOptions {
            force_reset: true,
            ..FlashOptions::default()
        };
        let mut flasher = Flasher::new(router_bus(0, 16, 12), catalog, options);
        flasher
            .flash(&router_image(), |_| None, &mut NoProgress)
            .unwrap();
        let bus = flasher.into_bus();
        let last = crate::protocol::CommandFrame::parse(bus.sent().last().unwrap()).unwrap();
        assert_eq!(last.command(), Some(Command::Reset));
        assert!(last.is_keyed());
    }
}
