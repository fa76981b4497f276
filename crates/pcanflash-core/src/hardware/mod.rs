//! Hardware profiles and catalog
//!
//! This module describes the flashing parameters of each supported module
//! type, the built-in catalog of known hardware, and loading of additional
//! profiles from RON files.

mod catalog;
mod database;
mod features;
mod types;

pub use catalog::{flash_family_name, HardwareCatalog};
pub use database::{HardwareDbError, Size};
pub use features::HwFlags;
pub use types::*;
