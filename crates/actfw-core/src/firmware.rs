//! Firmware header stored on the NAND of Actions based players.
//!
//! The header spans 16 sectors: 512 bytes of descriptive fields followed by a
//! directory of 240 entries. All multi-byte fields are little-endian.

use std::fmt;

use assert_into::AssertInto;
use log::{debug, info};
use static_assertions::const_assert_eq;
use thiserror::Error;
use usbh_actions::{BulkOnly, BulkTransport, CommandError, NandArea, SECTOR_SIZE};
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

use crate::{ProgressReporter, checksum};

pub const FIRMWARE_MAGIC: u32 = 0x0FF0_AA55;
pub const HEADER_SECTORS: u32 = 16;
pub const DIRECTORY_ENTRIES: usize = 240;
/// Upper bound of the alternate header search when no capacity is known.
pub const DEFAULT_SEARCH_LIMIT: u32 = 65535;
/// The alternate header is never placed before this sector.
pub const ALTERNATE_SEARCH_START: u32 = 8;

/// Bytes covered by the header checksum.
const HEADER_CHECKSUM_SPAN: usize = 510;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("reading sector {sector:#010x} failed")]
    ReadFailed {
        sector: u32,
        #[source]
        source: CommandError,
    },
    #[error("data read is not an Actions firmware header (magic {found:#010x})")]
    BadMagic { found: u32 },
    #[error("data read is not Actions sysinfo")]
    BadSysInfoMagic,
    #[error("header at sector {0:#010x} runs past the last addressable sector")]
    HeaderOutOfRange(u32),
    #[error("entry {name} at offset {offset:#010x} lies past the last addressable sector")]
    EntryOutOfRange { name: String, offset: u32 },
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Settings shared by the player applications.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CommonValues {
    pub magic: U16,
    pub system_time: U32,
    pub rtc_rate: U16,
    pub contrast: u8,
    pub light_time: u8,
    pub standby_time: u8,
    pub sleep_time: u8,
    pub language_id: u8,
    pub replay_mode: u8,
    pub online_mode: u8,
    pub battery_type: u8,
    pub fm_built_in: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DirectoryEntry {
    /// 8.3 name without the dot, space padded. A leading zero marks the slot unused.
    pub filename: [u8; 11],
    pub attribute: u8,
    pub _reserved1: [u8; 2],
    pub version: U16,
    /// In sectors, relative to the header.
    pub offset: U32,
    /// In bytes.
    pub length: U32,
    pub _reserved2: [u8; 4],
    pub checksum: U32,
}

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FirmwareHeader {
    pub magic: U32,
    pub version: [u8; 4],
    pub date: [u8; 4],
    pub vendor_id: U16,
    pub product_id: U16,
    pub directory_checksum: U32,
    pub _reserved1: [u8; 12],
    pub firmware_descriptor: [u8; 32],
    pub producer: [u8; 32],
    pub device_name: [u8; 32],
    pub _reserved2: [u8; 128],
    pub usb_attributes: [u8; 8],
    pub usb_identification: [u8; 16],
    pub usb_product_version: [u8; 4],
    pub _reserved3: [u8; 4],
    /// USB string descriptor, UTF-16LE.
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_string: [u8; 46],
    pub common: CommonValues,
    pub _reserved4: [u8; 15],
    pub mtp_manufacturer_len: u8,
    pub mtp_manufacturer: [u8; 32],
    pub mtp_product_info_len: u8,
    pub mtp_product_info: [u8; 32],
    pub mtp_product_version_len: u8,
    pub mtp_product_version: [u8; 16],
    pub mtp_serial_number_len: u8,
    pub mtp_serial_number: [u8; 16],
    pub mtp_vendor_id: U16,
    pub mtp_product_id: U16,
    pub _reserved5: [u8; 38],
    pub header_checksum: U16,
    pub directory: [DirectoryEntry; DIRECTORY_ENTRIES],
}

const_assert_eq!(core::mem::size_of::<CommonValues>(), 17);
const_assert_eq!(core::mem::size_of::<DirectoryEntry>(), 32);
const_assert_eq!(
    core::mem::size_of::<FirmwareHeader>(),
    HEADER_SECTORS as usize * SECTOR_SIZE
);

/// Trims trailing NULs and spaces from a fixed-size text field.
pub fn field_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end()
        .to_string()
}

impl DirectoryEntry {
    pub fn is_used(&self) -> bool {
        self.filename[0] != 0
    }

    /// `NAME.EXT` form of the 8.3 filename.
    pub fn name(&self) -> String {
        let base = field_str(&self.filename[..8]);
        let ext = field_str(&self.filename[8..]);
        if ext.is_empty() {
            base
        } else {
            format!("{base}.{ext}")
        }
    }

    /// Sectors spanned by the entry data.
    pub fn sector_count(&self) -> u32 {
        self.length.get().div_ceil(SECTOR_SIZE as u32)
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} attr {:#04x} ver {:#06x} offset {:#010x} length {:>8} checksum {:#010x}",
            self.name(),
            self.attribute,
            self.version.get(),
            self.offset.get(),
            self.length.get(),
            self.checksum.get()
        )
    }
}

/// Result of checking the two checksums of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    pub header_ok: bool,
    pub directory_ok: bool,
}

impl FirmwareHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, FirmwareError> {
        let magic = bytes
            .get(..4)
            .map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]]))
            .unwrap_or(0);
        if magic != FIRMWARE_MAGIC {
            return Err(FirmwareError::BadMagic { found: magic });
        }

        Self::read_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| FirmwareError::BadMagic { found: magic })
    }

    pub fn compute_header_checksum(&self) -> u16 {
        checksum::sum16(&self.as_bytes()[..HEADER_CHECKSUM_SPAN])
    }

    pub fn compute_directory_checksum(&self) -> u32 {
        checksum::sum32(self.directory.as_bytes())
    }

    /// Recomputes both stored checksums from the current contents.
    pub fn update_checksums(&mut self) {
        self.directory_checksum = self.compute_directory_checksum().into();
        self.header_checksum = self.compute_header_checksum().into();
    }

    pub fn verify_checksums(&self) -> ChecksumReport {
        ChecksumReport {
            header_ok: self.compute_header_checksum() == self.header_checksum.get(),
            directory_ok: self.compute_directory_checksum() == self.directory_checksum.get(),
        }
    }

    /// Populated directory entries.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.directory.iter().filter(|e| e.is_used())
    }

    /// Size of the whole firmware image in sectors: the entry placed last
    /// plus its length rounded up to whole sectors. Of several entries at the
    /// same offset the first one counts. Saturates at `u32::MAX` for a
    /// directory pointing past the addressable range.
    pub fn image_sectors(&self) -> u32 {
        let mut last: Option<&DirectoryEntry> = None;
        for entry in self.entries() {
            if last.is_none_or(|l| entry.offset.get() > l.offset.get()) {
                last = Some(entry);
            }
        }
        last.map(|e| e.offset.get().saturating_add(e.sector_count()))
            .unwrap_or(0)
    }

    /// Version as printed by the vendor tools, e.g. `3.1.08.05`.
    pub fn version_string(&self) -> String {
        let v = self.version;
        format!(
            "{:X}.{:X}.{:02X}.{:X}{:X}",
            v[0] >> 4,
            v[0] & 0x0F,
            v[1],
            v[2],
            v[3]
        )
    }

    /// BCD date as `YYYY.MM.DD`.
    pub fn date_string(&self) -> String {
        let d = self.date;
        format!("{:02X}{:02X}.{:02X}.{:02X}", d[0], d[1], d[2], d[3])
    }

    pub fn usb_string(&self) -> String {
        let len = (self.b_length as usize)
            .saturating_sub(2)
            .min(self.b_string.len());
        let units: Vec<u16> = self.b_string[..len]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .trim_end_matches('\0')
            .to_string()
    }
}

/// Same as [`FirmwareHeader::verify_checksums`].
pub fn verify_checksums(header: &FirmwareHeader) -> ChecksumReport {
    header.verify_checksums()
}

/// Same as [`FirmwareHeader::image_sectors`].
pub fn compute_image_size(header: &FirmwareHeader) -> u32 {
    header.image_sectors()
}

/// Checks `data` (the entry content, at least `length` bytes) against the
/// entry checksum.
pub fn verify_entry(entry: &DirectoryEntry, data: &[u8]) -> bool {
    let len = (entry.length.get() as usize).min(data.len());
    checksum::sum32(&data[..len]) == entry.checksum.get()
}

fn read_nand<T: BulkTransport>(
    bot: &mut BulkOnly<T>,
    lun: u8,
    sector: u32,
    buf: &mut [u8; SECTOR_SIZE],
) -> Result<(), FirmwareError> {
    bot.read_nand_sector(lun, sector, NandArea::Logical, buf)
        .map_err(|source| FirmwareError::ReadFailed { sector, source })
}

/// Reads and validates the header starting at `start_sector`.
pub fn read_header<T: BulkTransport>(
    bot: &mut BulkOnly<T>,
    lun: u8,
    start_sector: u32,
) -> Result<FirmwareHeader, FirmwareError> {
    if start_sector.checked_add(HEADER_SECTORS - 1).is_none() {
        return Err(FirmwareError::HeaderOutOfRange(start_sector));
    }

    let mut header = FirmwareHeader::new_zeroed();
    let mut sector = [0u8; SECTOR_SIZE];

    for (i, chunk) in header
        .as_mut_bytes()
        .chunks_exact_mut(SECTOR_SIZE)
        .enumerate()
    {
        read_nand(bot, lun, start_sector + i as u32, &mut sector)?;
        chunk.copy_from_slice(&sector);
    }

    if header.magic.get() != FIRMWARE_MAGIC {
        return Err(FirmwareError::BadMagic {
            found: header.magic.get(),
        });
    }

    debug!(
        "Firmware header at sector {start_sector:#x}, {} entries",
        header.entries().count()
    );
    Ok(header)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternateSearch {
    Found(u32),
    NotFound,
}

/// Scans sectors `8..max_lba` for a second copy of the header.
pub fn locate_alternate<T: BulkTransport>(
    bot: &mut BulkOnly<T>,
    lun: u8,
    max_lba: u32,
    mut reporter: impl ProgressReporter,
) -> Result<AlternateSearch, FirmwareError> {
    let mut sector = [0u8; SECTOR_SIZE];
    let total = max_lba.saturating_sub(ALTERNATE_SEARCH_START);

    reporter.start(total.assert_into());

    for lba in ALTERNATE_SEARCH_START..max_lba {
        read_nand(bot, lun, lba, &mut sector)?;
        if u32::from_le_bytes([sector[0], sector[1], sector[2], sector[3]]) == FIRMWARE_MAGIC {
            reporter.finish();
            info!("Alternate header found at sector {lba:#010x}");
            return Ok(AlternateSearch::Found(lba));
        }
        reporter.advance(1);
    }

    reporter.finish();
    info!("Alternate header not found below sector {max_lba:#x}");
    Ok(AlternateSearch::NotFound)
}

/// Reads the content of one directory entry of the header at `start_sector`.
pub fn read_entry<T: BulkTransport>(
    bot: &mut BulkOnly<T>,
    lun: u8,
    start_sector: u32,
    entry: &DirectoryEntry,
) -> Result<Vec<u8>, FirmwareError> {
    let out_of_range = || FirmwareError::EntryOutOfRange {
        name: entry.name(),
        offset: entry.offset.get(),
    };
    let first = start_sector
        .checked_add(entry.offset.get())
        .ok_or_else(out_of_range)?;
    // Last sector must be addressable too.
    if entry.sector_count() > 0 {
        first
            .checked_add(entry.sector_count() - 1)
            .ok_or_else(out_of_range)?;
    }

    let sectors: usize = entry.sector_count().assert_into();
    let mut data = Vec::with_capacity(sectors * SECTOR_SIZE);
    let mut sector = [0u8; SECTOR_SIZE];

    for i in 0..entry.sector_count() {
        read_nand(bot, lun, first + i, &mut sector)?;
        data.extend_from_slice(&sector);
    }

    data.truncate(entry.length.get() as usize);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoProgress;
    use usbh_actions::commands::actions::OPCODE_READ_LOGICAL;
    use usbh_actions::transport::{MockReply, MockTransport};

    fn entry(name: &[u8; 11], offset: u32, length: u32) -> DirectoryEntry {
        let mut entry = DirectoryEntry::new_zeroed();
        entry.filename = *name;
        entry.offset = offset.into();
        entry.length = length.into();
        entry
    }

    fn sample_header() -> FirmwareHeader {
        let mut header = FirmwareHeader::new_zeroed();
        header.magic = FIRMWARE_MAGIC.into();
        header.vendor_id = 0x10d6.into();
        header.product_id = 0x1101.into();
        header.producer[..7].copy_from_slice(b"Actions");
        header.directory[0] = entry(b"FWIMAGE FW ", 10, 100);
        header.directory[1] = entry(b"RESOURCERES", 50, 200);
        header.directory[2] = entry(b"KERNEL  DRV", 5, 50);
        header.update_checksums();
        header
    }

    fn lba_of(cbw: &usbh_actions::commands::cbw::Cbw) -> u32 {
        u32::from_le_bytes([
            cbw.command[2],
            cbw.command[3],
            cbw.command[4],
            cbw.command[5],
        ])
    }

    #[test]
    fn image_size_uses_last_placed_entry() {
        let header = sample_header();
        assert_eq!(compute_image_size(&header), 51);
        assert_eq!(compute_image_size(&FirmwareHeader::new_zeroed()), 0);
    }

    #[test]
    fn image_size_tie_goes_to_first_entry() {
        let mut header = FirmwareHeader::new_zeroed();
        header.directory[0] = entry(b"BIG     BIN", 50, 5000);
        header.directory[1] = entry(b"SMALL   BIN", 50, 10);
        assert_eq!(compute_image_size(&header), 60);

        header.directory.swap(0, 1);
        assert_eq!(compute_image_size(&header), 51);
    }

    #[test]
    fn image_size_saturates_on_garbage_offset() {
        let mut header = FirmwareHeader::new_zeroed();
        header.directory[0] = entry(b"BROKEN  BIN", 0xFFFF_FFF0, 0x10000);
        assert_eq!(compute_image_size(&header), u32::MAX);
    }

    #[test]
    fn entry_past_last_sector_is_rejected() {
        let mock = MockTransport::with_responder(|_, _| MockReply::ok(vec![0u8; SECTOR_SIZE]));
        let mut bot = BulkOnly::new(mock);

        let e = entry(b"BROKEN  BIN", 0xFFFF_FFFF, 100);
        assert!(matches!(
            read_entry(&mut bot, 0, 16, &e),
            Err(FirmwareError::EntryOutOfRange { offset: 0xFFFF_FFFF, .. })
        ));

        let e = entry(b"BROKEN  BIN", 0xFFFF_FFF0, 0x10000);
        assert!(matches!(
            read_entry(&mut bot, 0, 0, &e),
            Err(FirmwareError::EntryOutOfRange { .. })
        ));
        assert!(bot.transport().commands().is_empty());
    }

    #[test]
    fn fresh_checksums_validate() {
        let header = sample_header();
        assert_eq!(
            verify_checksums(&header),
            ChecksumReport {
                header_ok: true,
                directory_ok: true
            }
        );
    }

    #[test]
    fn flipped_header_byte_is_detected() {
        let header = sample_header();
        for offset in [0usize, 13, 100, 336, 509] {
            let mut bytes = header.as_bytes().to_vec();
            bytes[offset] ^= 0x01;
            let damaged = FirmwareHeader::read_from_bytes(&bytes).unwrap();
            assert!(!damaged.verify_checksums().header_ok, "offset {offset}");
        }
    }

    #[test]
    fn flipped_directory_byte_is_detected() {
        let header = sample_header();
        for offset in [512usize, 530, 4096, 8191] {
            let mut bytes = header.as_bytes().to_vec();
            bytes[offset] ^= 0x80;
            let damaged = FirmwareHeader::read_from_bytes(&bytes).unwrap();
            let report = damaged.verify_checksums();
            assert!(!report.directory_ok, "offset {offset}");
            assert!(report.header_ok);
        }
    }

    #[test]
    fn entry_names_are_dotted() {
        let header = sample_header();
        let names: Vec<String> = header.entries().map(|e| e.name()).collect();
        assert_eq!(names, ["FWIMAGE.FW", "RESOURCE.RES", "KERNEL.DRV"]);
    }

    #[test]
    fn version_and_date_are_bcd() {
        let mut header = sample_header();
        header.version = [0x31, 0x08, 0x00, 0x05];
        header.date = [0x20, 0x08, 0x11, 0x23];
        assert_eq!(header.version_string(), "3.1.08.05");
        assert_eq!(header.date_string(), "2008.11.23");
    }

    #[test]
    fn usb_string_is_utf16() {
        let mut header = sample_header();
        let name: Vec<u8> = "MP3".encode_utf16().flat_map(u16::to_le_bytes).collect();
        header.b_length = 2 + name.len() as u8;
        header.b_descriptor_type = 3;
        header.b_string[..name.len()].copy_from_slice(&name);
        assert_eq!(header.usb_string(), "MP3");
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = sample_header().as_bytes().to_vec();
        assert!(FirmwareHeader::parse(&bytes).is_ok());
        bytes[0] = 0;
        assert!(matches!(
            FirmwareHeader::parse(&bytes),
            Err(FirmwareError::BadMagic { .. })
        ));
    }

    #[test]
    fn header_is_read_sector_by_sector() {
        let image = sample_header().as_bytes().to_vec();
        let mock = MockTransport::with_responder(move |cbw, _| {
            assert_eq!(cbw.opcode(), OPCODE_READ_LOGICAL);
            let idx = (lba_of(cbw) - 100) as usize;
            MockReply::ok(image[idx * SECTOR_SIZE..(idx + 1) * SECTOR_SIZE].to_vec())
        });
        let mut bot = BulkOnly::new(mock);

        let header = read_header(&mut bot, 0, 100).unwrap();
        assert_eq!(header.vendor_id.get(), 0x10d6);
        assert!(header.verify_checksums().header_ok);
        assert_eq!(bot.transport().commands().len(), 16);
    }

    #[test]
    fn header_at_end_of_range_is_rejected() {
        let mock = MockTransport::with_responder(|_, _| MockReply::ok(vec![0u8; SECTOR_SIZE]));
        let mut bot = BulkOnly::new(mock);
        assert!(matches!(
            read_header(&mut bot, 0, u32::MAX - 3),
            Err(FirmwareError::HeaderOutOfRange(_))
        ));
        assert!(bot.transport().commands().is_empty());
    }

    #[test]
    fn read_header_rejects_blank_flash() {
        let mock = MockTransport::with_responder(|_, _| MockReply::ok(vec![0xFF; SECTOR_SIZE]));
        let mut bot = BulkOnly::new(mock);
        assert!(matches!(
            read_header(&mut bot, 0, 0),
            Err(FirmwareError::BadMagic { found: 0xFFFF_FFFF })
        ));
    }

    fn header_at(found: Option<u32>) -> MockTransport {
        MockTransport::with_responder(move |cbw, _| {
            let mut sector = vec![0u8; SECTOR_SIZE];
            if Some(lba_of(cbw)) == found {
                sector[..4].copy_from_slice(&FIRMWARE_MAGIC.to_le_bytes());
            }
            MockReply::ok(sector)
        })
    }

    #[test]
    fn alternate_header_is_found() {
        let mut bot = BulkOnly::new(header_at(Some(15)));
        assert_eq!(
            locate_alternate(&mut bot, 0, 20, NoProgress).unwrap(),
            AlternateSearch::Found(15)
        );
        assert_eq!(lba_of(&bot.transport().commands()[0]), 8);
    }

    #[test]
    fn missing_alternate_is_not_an_error() {
        let mut bot = BulkOnly::new(header_at(None));
        assert_eq!(
            locate_alternate(&mut bot, 0, 20, NoProgress).unwrap(),
            AlternateSearch::NotFound
        );
        assert_eq!(bot.transport().commands().len(), 12);

        // Magic at the limit itself is outside the scan.
        let mut bot = BulkOnly::new(header_at(Some(20)));
        assert_eq!(
            locate_alternate(&mut bot, 0, 20, NoProgress).unwrap(),
            AlternateSearch::NotFound
        );
    }

    #[test]
    fn failed_read_aborts_the_search() {
        let mock = MockTransport::with_responder(|cbw, _| {
            if lba_of(cbw) == 12 {
                MockReply::status(1)
            } else {
                MockReply::ok(vec![0u8; SECTOR_SIZE])
            }
        });
        let mut bot = BulkOnly::new(mock);
        assert!(matches!(
            locate_alternate(&mut bot, 0, 20, NoProgress),
            Err(FirmwareError::ReadFailed { sector: 12, .. })
        ));
    }

    #[test]
    fn entry_content_is_trimmed_and_verified() {
        let mut e = entry(b"KERNEL  DRV", 3, 700);
        let mock = MockTransport::with_responder(|cbw, _| {
            MockReply::ok(vec![lba_of(cbw) as u8; SECTOR_SIZE])
        });
        let mut bot = BulkOnly::new(mock);

        let data = read_entry(&mut bot, 0, 10, &e).unwrap();
        assert_eq!(data.len(), 700);
        assert_eq!(data[0], 13);
        assert_eq!(data[699], 14);

        e.checksum = checksum::sum32(&data).into();
        assert!(verify_entry(&e, &data));
        e.checksum = (e.checksum.get() ^ 1).into();
        assert!(!verify_entry(&e, &data));
    }
}
