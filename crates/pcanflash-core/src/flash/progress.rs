//! Progress reporting

/// Summary of a flashing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashReport {
    /// Flashed module
    pub module_id: u8,
    /// Hardware code of the flashed module
    pub hw_type: u8,
    /// Regions erased
    pub regions_erased: usize,
    /// Regions left alone (empty in the image or protected)
    pub regions_skipped: usize,
    /// Blocks transferred
    pub blocks_written: usize,
    /// Blocks left out because they were empty
    pub blocks_skipped: usize,
    /// Bytes transferred
    pub bytes_written: u64,
    /// Checksums patched into the image
    pub crc_patches: usize,
    /// Whether erase, program and verify were suppressed
    pub dry_run: bool,
}

/// Callback for progress reporting during a flashing run
pub trait FlashProgress {
    /// Called when starting the erase pass
    fn erasing(&mut self, regions_to_erase: usize, bytes_to_erase: u64);

    /// Called after each region is erased
    fn erase_progress(&mut self, regions_erased: usize);

    /// Called when starting the write pass
    fn writing(&mut self, bytes_total: u64);

    /// Called after each block, with the image offset reached so far
    fn write_progress(&mut self, bytes_done: u64);

    /// Called when the run is complete
    fn complete(&mut self, report: &FlashReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn erasing(&mut self, _regions_to_erase: usize, _bytes_to_erase: u64) {}
    fn erase_progress(&mut self, _regions_erased: usize) {}
    fn writing(&mut self, _bytes_total: u64) {}
    fn write_progress(&mut self, _bytes_done: u64) {}
    fn complete(&mut self, _report: &FlashReport) {}
}
