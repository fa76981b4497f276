//! Query command implementation

use pcanflash_core::discovery::Module;
use pcanflash_core::flash::{FlashOptions, Flasher};
use pcanflash_core::hardware::{flash_family_name, HardwareCatalog};

use super::transport::open_bus;

/// Print a table of discovered modules
pub fn print_modules(modules: &[Module], catalog: &HardwareCatalog) {
    println!(
        "{:>2}  {:<10} {:>4}  {:<22} {:<20} {:<8} {:<8}",
        "ID", "Date", "BL", "Hardware", "Flash", "BL (json)", "Firmware"
    );
    for module in modules {
        let (major, minor) = module.identity.bootloader_version();
        let hardware = match module.hw_type {
            Some(hw) => format!("{} ({})", catalog.name(hw), hw),
            None => "-".to_string(),
        };
        let flash = match module.flash_type {
            Some(ft) => format!("{} ({})", flash_family_name(ft), ft),
            None => "-".to_string(),
        };
        println!(
            "{:>2}  {:<10} {:>4}  {:<22} {:<20} {:<8} {:<8}",
            module.id,
            module.identity.bootloader_date(),
            format!("{}.{}", major, minor),
            hardware,
            flash,
            module.bootloader.as_deref().unwrap_or("-"),
            module.firmware.as_deref().unwrap_or("-")
        );
    }
}

/// Run the query command
pub fn run_query(
    interface: &str,
    catalog: &HardwareCatalog,
    options: FlashOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = open_bus(interface, catalog)?;
    let mut flasher = Flasher::new(bus, catalog, options);
    let modules = flasher.query_modules()?;

    println!("Found {} module(s) on {}:", modules.len(), interface);
    print_modules(&modules, catalog);
    Ok(())
}
