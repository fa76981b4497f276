//! Flashing engine
//!
//! The erase and write passes and the [`Flasher`] session that sequences
//! them. Progress is reported through [`FlashProgress`].

mod erase;
mod options;
mod orchestrator;
mod progress;
mod write;

pub use erase::{erase_image, erase_region, regions_to_erase};
pub use options::{FlashOptions, Timeouts};
pub use orchestrator::Flasher;
pub use progress::{FlashProgress, FlashReport, NoProgress};
pub use write::{
    block_frames, bus_address, check_image_fits, write_block, write_image, DataFraming,
};
