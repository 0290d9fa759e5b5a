//! Firmware level operations for Actions based media players: reading and
//! validating the firmware header stored in NAND, reading the sysinfo block
//! from RAM and packing firmware entries into AFI containers.

pub mod afi;
pub mod checksum;
pub mod firmware;
pub mod sysinfo;

pub use afi::{AfiEntry, AfiError, AfiHeader, AfiWriter};
pub use firmware::{
    AlternateSearch, ChecksumReport, DirectoryEntry, FirmwareError, FirmwareHeader,
    compute_image_size, locate_alternate, read_entry, read_header, verify_checksums, verify_entry,
};
pub use sysinfo::{SysInfo, read_sysinfo, test_ram_access};

pub trait ProgressReporter {
    fn start(&mut self, total: usize);
    fn advance(&mut self, amount: usize);
    fn finish(&mut self);
}

pub struct NoProgress;
impl ProgressReporter for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn advance(&mut self, _amount: usize) {}
    fn finish(&mut self) {}
}
