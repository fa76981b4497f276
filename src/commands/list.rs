//! List commands implementation

use pcanflash_core::hardware::{flash_family_name, HardwareCatalog, HwFlags};

/// List all supported hardware
pub fn list_hardware(catalog: &HardwareCatalog) {
    println!("Supported hardware:");
    println!();
    println!(
        "{:>4} {:<22} {:<20} {:<20} {:>4} {:>6} {:>10}",
        "Type", "Name", "Image ID", "Flash", "Data", "Block", "Erase"
    );
    println!("{}", "-".repeat(92));

    for profile in catalog.profiles() {
        println!(
            "{:>4} {:<22} {:<20} {:<20} {:>4} {:>6} {:>10}",
            profile.hw_type,
            profile.name,
            profile.image_id,
            flash_family_name(profile.flash_id_type),
            profile.default_data_len().bytes(),
            profile.max_block_size,
            format_size(profile.erase_size())
        );

        let flags = format_flags(profile.flags);
        if !flags.is_empty() {
            println!("{:>4} {}", "", flags);
        }
    }
}

fn format_flags(flags: HwFlags) -> String {
    flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        "-".to_string()
    } else if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
