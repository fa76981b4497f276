//! Flash command implementation

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pcanflash_core::discovery::Module;
use pcanflash_core::flash::{FlashOptions, FlashProgress, FlashReport, Flasher};
use pcanflash_core::hardware::HardwareCatalog;
use pcanflash_core::image::FlashImage;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use super::query::print_modules;
use super::transport::open_bus;
use crate::cli::parse_module_id;

/// Create a progress bar with custom phase message
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Create a standard spinner style
fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        let pb = self.multi.add(
            create_progress_bar_with_phase(total, phase)
                .unwrap_or_else(|_| ProgressBar::new(total)),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashProgress for IndicatifProgress {
    fn erasing(&mut self, regions_to_erase: usize, bytes_to_erase: u64) {
        self.create_spinner(format!(
            "Erasing {} regions ({} bytes)...",
            regions_to_erase, bytes_to_erase
        ));
    }

    fn erase_progress(&mut self, regions_erased: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_message(format!("Erased {} regions...", regions_erased));
        }
    }

    fn writing(&mut self, bytes_total: u64) {
        self.finish("Erase complete");
        self.create_bar(bytes_total, "Writing");
    }

    fn write_progress(&mut self, bytes_done: u64) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_done);
        }
    }

    fn complete(&mut self, report: &FlashReport) {
        self.finish("Write complete");

        println!(
            "Module {}: {} regions erased ({} skipped), {} blocks written ({} empty), {} bytes, {} checksums patched",
            report.module_id,
            report.regions_erased,
            report.regions_skipped,
            report.blocks_written,
            report.blocks_skipped,
            report.bytes_written,
            report.crc_patches
        );
        if report.dry_run {
            println!("Dry run - flash contents were not changed");
        }
    }
}

/// Ask the operator which module to flash
fn choose_module(modules: &[Module], catalog: &HardwareCatalog) -> Option<u8> {
    println!("Found {} modules:", modules.len());
    print_modules(modules, catalog);
    print!("Enter module id to flash: ");
    io::stdout().flush().ok()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    match parse_module_id(line.trim()) {
        Ok(id) => Some(id),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    }
}

/// Run the flash command
pub fn run_flash(
    interface: &str,
    catalog: &HardwareCatalog,
    file: &Path,
    options: FlashOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = FlashImage::load(file)?;
    println!("Read {} bytes from {:?}", image.len(), file);

    let bus = open_bus(interface, catalog)?;
    let mut flasher = Flasher::new(bus, catalog, options);
    let mut progress = IndicatifProgress::new();
    flasher.flash(
        &image,
        |modules| choose_module(modules, catalog),
        &mut progress,
    )?;

    println!("Flashing complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_flash_dummy_router() {
        let mut data = vec![0xFFu8; 0x4000];
        data[0x2000..0x2100].fill(0x42);
        data[0x2100..0x210C].copy_from_slice(b"PCAN-Router\0");
        let path = std::env::temp_dir().join(format!("pcanflash-test-{}.bin", std::process::id()));
        fs::write(&path, &data).unwrap();

        let result = run_flash(
            "dummy",
            HardwareCatalog::builtin(),
            &path,
            FlashOptions::default(),
        );
        fs::remove_file(&path).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn test_flash_missing_file() {
        let result = run_flash(
            "dummy",
            HardwareCatalog::builtin(),
            Path::new("/nonexistent/firmware.bin"),
            FlashOptions::default(),
        );
        assert!(result.is_err());
    }
}
