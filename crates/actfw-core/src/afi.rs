//! AFI firmware container.
//!
//! A 4096-byte header with room for 126 entries, followed by the entry data.
//! The writer only appends: every entry goes into the first free slot, its
//! data right after the data placed last, and the header is rewritten after
//! each append so the file is valid at any point.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use static_assertions::const_assert_eq;
use thiserror::Error;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

use crate::checksum;

pub const AFI_MAGIC: &[u8; 4] = b"AFI\0";
pub const AFI_HEADER_SIZE: usize = 4096;
pub const AFI_ENTRIES: usize = 126;

#[derive(Error, Debug)]
pub enum AfiError {
    #[error("all {AFI_ENTRIES} directory slots are used")]
    DirectoryFull,
    #[error("entry data of {0} bytes does not fit the container")]
    TooLarge(usize),
    #[error("not an AFI container")]
    BadMagic,
    #[error("failed to write container")]
    Io(#[from] std::io::Error),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct AfiEntry {
    /// 8.3 name without the dot, space padded. A leading zero marks the slot unused.
    pub filename: [u8; 11],
    pub kind: u8,
    pub download_address: U32,
    /// In bytes, from the start of the container.
    pub offset: U32,
    pub length: U32,
    pub _reserved: [u8; 4],
    pub checksum: U32,
}

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct AfiHeader {
    pub magic: [u8; 4],
    pub vendor_id: U16,
    pub product_id: U16,
    pub _reserved1: [u8; 24],
    pub entries: [AfiEntry; AFI_ENTRIES],
    pub _reserved2: [u8; 28],
    /// Sum over every header byte before this field.
    pub checksum: U32,
}

const_assert_eq!(core::mem::size_of::<AfiEntry>(), 32);
const_assert_eq!(core::mem::size_of::<AfiHeader>(), AFI_HEADER_SIZE);

impl AfiEntry {
    /// A new entry, not yet placed. Offset, length and checksum are filled in
    /// when it is appended.
    pub fn new(filename: [u8; 11], kind: u8, download_address: u32) -> Self {
        let mut entry = Self::new_zeroed();
        entry.filename = filename;
        entry.kind = kind;
        entry.download_address = download_address.into();
        entry
    }

    pub fn is_used(&self) -> bool {
        self.filename[0] != 0
    }

    /// First byte past the entry data.
    pub fn end(&self) -> u64 {
        self.offset.get() as u64 + self.length.get() as u64
    }
}

impl AfiHeader {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        let mut header = Self::new_zeroed();
        header.magic = *AFI_MAGIC;
        header.vendor_id = vendor_id.into();
        header.product_id = product_id.into();
        header.update_checksum();
        header
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, AfiError> {
        if !bytes.starts_with(&AFI_MAGIC[..3]) {
            return Err(AfiError::BadMagic);
        }
        Self::read_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| AfiError::BadMagic)
    }

    pub fn compute_checksum(&self) -> u32 {
        checksum::sum32(&self.as_bytes()[..AFI_HEADER_SIZE - 4])
    }

    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum().into();
    }

    pub fn verify_checksum(&self) -> bool {
        self.compute_checksum() == self.checksum.get()
    }

    pub fn used_entries(&self) -> impl Iterator<Item = &AfiEntry> {
        self.entries.iter().filter(|e| e.is_used())
    }

    /// Where the next entry data goes: after the data placed last, or right
    /// after the header in an empty container.
    pub fn next_data_offset(&self) -> u64 {
        self.used_entries()
            .map(AfiEntry::end)
            .max()
            .unwrap_or(AFI_HEADER_SIZE as u64)
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| !e.is_used())
    }
}

pub struct AfiWriter<W: Write + Seek> {
    writer: W,
    header: AfiHeader,
}

impl AfiWriter<File> {
    /// Creates (or truncates) the file at `path` and writes an empty header.
    pub fn create(
        path: impl AsRef<Path>,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Self, AfiError> {
        let file = File::create(path)?;
        Self::new(file, vendor_id, product_id)
    }
}

impl<W: Write + Seek> AfiWriter<W> {
    pub fn new(writer: W, vendor_id: u16, product_id: u16) -> Result<Self, AfiError> {
        let mut afi = Self {
            writer,
            header: AfiHeader::new(vendor_id, product_id),
        };
        afi.write_header()?;
        Ok(afi)
    }

    pub fn header(&self) -> &AfiHeader {
        &self.header
    }

    pub fn next_data_offset(&self) -> u64 {
        self.header.next_data_offset()
    }

    /// Positions the writer at [`Self::next_data_offset`] for callers that
    /// stream entry data themselves and register it with
    /// [`Self::append_already_written`] afterwards. Write the whole entry
    /// through one call; the position only moves on once the entry is
    /// registered.
    pub fn data_writer(&mut self) -> Result<&mut W, AfiError> {
        let offset = self.next_data_offset();
        self.writer.seek(SeekFrom::Start(offset))?;
        Ok(&mut self.writer)
    }

    /// Writes `data` and records it under `entry`. Returns the slot used.
    pub fn append_whole(&mut self, mut entry: AfiEntry, data: &[u8]) -> Result<usize, AfiError> {
        let length = u32::try_from(data.len()).map_err(|_| AfiError::TooLarge(data.len()))?;
        entry.length = length.into();
        entry.checksum = checksum::sum32(data).into();

        // Check for a free slot before touching the file.
        if self.header.first_free_slot().is_none() {
            return Err(AfiError::DirectoryFull);
        }

        self.data_writer()?.write_all(data)?;
        self.append_already_written(entry)
    }

    /// Records `entry` for data the caller already wrote at
    /// [`Self::next_data_offset`]. `length` and `checksum` must be set.
    pub fn append_already_written(&mut self, mut entry: AfiEntry) -> Result<usize, AfiError> {
        let slot = self
            .header
            .first_free_slot()
            .ok_or(AfiError::DirectoryFull)?;

        let offset = self.next_data_offset();
        let end = offset + entry.length.get() as u64;
        if end > u32::MAX as u64 {
            return Err(AfiError::TooLarge(entry.length.get() as usize));
        }
        entry.offset = (offset as u32).into();

        self.header.entries[slot] = entry;
        self.header.update_checksum();
        self.write_header()?;

        debug!(
            "AFI slot {slot}: offset {offset:#x} length {} checksum {:#010x}",
            entry.length.get(),
            entry.checksum.get()
        );
        Ok(slot)
    }

    fn write_header(&mut self) -> Result<(), AfiError> {
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(self.header.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W, AfiError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum32;
    use std::io::Cursor;

    fn open() -> AfiWriter<Cursor<Vec<u8>>> {
        AfiWriter::new(Cursor::new(Vec::new()), 0x10d6, 0x1101).unwrap()
    }

    fn reparse(afi: &AfiWriter<Cursor<Vec<u8>>>) -> AfiHeader {
        AfiHeader::parse(afi.writer.get_ref()).unwrap()
    }

    #[test]
    fn empty_container_has_a_valid_header() {
        let afi = open();
        let bytes = afi.writer.get_ref();
        assert_eq!(bytes.len(), AFI_HEADER_SIZE);
        assert_eq!(&bytes[..3], b"AFI");

        let header = reparse(&afi);
        assert!(header.verify_checksum());
        assert_eq!(header.vendor_id.get(), 0x10d6);
        assert_eq!(header.used_entries().count(), 0);
        assert_eq!(afi.next_data_offset(), AFI_HEADER_SIZE as u64);
    }

    #[test]
    fn appends_fill_slots_in_order() {
        let mut afi = open();
        let empty_checksum = afi.header().checksum.get();

        let first = afi
            .append_whole(AfiEntry::new(*b"FWIMAGE FW ", 0x10, 0), &[1u8; 1000])
            .unwrap();
        let after_first = reparse(&afi);
        assert_eq!(first, 0);
        assert!(after_first.verify_checksum());
        assert_ne!(after_first.checksum.get(), empty_checksum);

        let second = afi
            .append_whole(AfiEntry::new(*b"KERNEL  DRV", 0x11, 0), &[2u8; 300])
            .unwrap();
        let after_second = reparse(&afi);
        assert_eq!(second, 1);
        assert!(after_second.verify_checksum());
        assert_ne!(after_second.checksum.get(), after_first.checksum.get());

        let e0 = after_second.entries[0];
        let e1 = after_second.entries[1];
        assert_eq!(e0.offset.get() as usize, AFI_HEADER_SIZE);
        assert_eq!(e1.offset.get(), e0.offset.get() + e0.length.get());
        assert_eq!(e0.checksum.get(), checksum::sum32(&[1u8; 1000]));

        let bytes = afi.into_inner().unwrap().into_inner();
        assert_eq!(bytes.len(), AFI_HEADER_SIZE + 1300);
        assert_eq!(bytes[AFI_HEADER_SIZE + 1000], 2);
    }

    #[test]
    fn streamed_entries_take_the_next_offset() {
        let mut afi = open();
        afi.append_whole(AfiEntry::new(*b"A       BIN", 0, 0), &[7u8; 10])
            .unwrap();

        let data = [9u8; 513];
        let mut checksum = Checksum32::new();
        let out = afi.data_writer().unwrap();
        for piece in data.chunks(100) {
            out.write_all(piece).unwrap();
            checksum.update(piece);
        }

        let mut entry = AfiEntry::new(*b"B       BIN", 0, 0);
        entry.length = (data.len() as u32).into();
        entry.checksum = checksum.finish().into();
        let slot = afi.append_already_written(entry).unwrap();

        let header = reparse(&afi);
        assert_eq!(slot, 1);
        assert_eq!(header.entries[1].offset.get() as usize, AFI_HEADER_SIZE + 10);
        assert_eq!(header.entries[1].checksum.get(), checksum::sum32(&data));
    }

    #[test]
    fn full_directory_is_an_error() {
        let mut afi = open();
        for i in 0..AFI_ENTRIES {
            let mut name = *b"FILE    BIN";
            name[4] = b'0' + (i % 10) as u8;
            afi.append_whole(AfiEntry::new(name, 0, 0), &[i as u8]).unwrap();
        }

        let before = afi.writer.get_ref().len();
        assert!(matches!(
            afi.append_whole(AfiEntry::new(*b"EXTRA   BIN", 0, 0), &[0u8; 16]),
            Err(AfiError::DirectoryFull)
        ));
        assert_eq!(afi.writer.get_ref().len(), before);
    }

    #[test]
    fn flipped_byte_fails_validation() {
        let mut afi = open();
        afi.append_whole(AfiEntry::new(*b"FWIMAGE FW ", 0, 0), &[5u8; 64])
            .unwrap();
        let bytes = afi.into_inner().unwrap().into_inner();

        for offset in [0usize, 5, 40, 2000, AFI_HEADER_SIZE - 5] {
            let mut damaged = bytes.clone();
            damaged[offset] ^= 0x04;
            match AfiHeader::parse(&damaged) {
                Ok(header) => assert!(!header.verify_checksum(), "offset {offset}"),
                Err(AfiError::BadMagic) => assert!(offset < 3),
                Err(err) => panic!("unexpected {err}"),
            }
        }
    }

    #[test]
    fn parse_rejects_other_files() {
        assert!(matches!(
            AfiHeader::parse(&[0u8; AFI_HEADER_SIZE]),
            Err(AfiError::BadMagic)
        ));
    }
}
