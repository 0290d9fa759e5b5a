//! Actions Semiconductor vendor commands.
//!
//! They share the bulk-only transport with plain SCSI but differ in two
//! places: byte 1 of the CDB carries the fixed marker [`ACTIONS_LUN_MARKER`]
//! instead of a LUN, and every multi-byte argument is **little-endian**,
//! the opposite of SCSI. Devices reject the big-endian form, so the byte
//! order here must not be "fixed".

use crate::commands::CommandBlock;

/// Placed in the CDB LUN byte of every vendor command.
pub const ACTIONS_LUN_MARKER: u8 = 0x80;
/// NAND and RAM are addressed in 512-byte sectors.
pub const SECTOR_SIZE: usize = 512;

/// Every vendor CDB is sent with an 11-byte command length.
const ACTIONS_COMMAND_LEN: u8 = 11;

pub const OPCODE_READ_RAM: u8 = 0x05;
pub const OPCODE_READ_LOGICAL: u8 = 0x08;
pub const OPCODE_READ_PHYSICAL: u8 = 0x09;
pub const OPCODE_DETACH: u8 = 0x16;
pub const OPCODE_ENTRY: u8 = 0x20;
pub const OPCODE_INIT: u8 = 0xCB;
pub const OPCODE_IDENTIFY: u8 = 0xCC;

fn actions_cdb(opcode: u8) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = opcode;
    cdb[1] = ACTIONS_LUN_MARKER;
    cdb
}

/// Device ID returned by IDENTIFY on every compatible player.
pub const ACTIONS_ID: &[u8; 11] = b"ACTIONSUSBD";
pub const IDENTIFY_LEN: usize = 13;

/// IDENTIFY: asks the device for its 11-character vendor ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifyCommand;

impl CommandBlock for IdentifyCommand {
    fn to_bytes(&self) -> [u8; 16] {
        actions_cdb(OPCODE_IDENTIFY)
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyData {
    pub id: [u8; 11],
    /// Non-zero while the device runs its boot ROM update mode.
    pub adfu: u8,
    pub unknown: u8,
}

impl IdentifyData {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < IDENTIFY_LEN {
            return None;
        }

        let mut id = [0u8; 11];
        id.copy_from_slice(&buf[0..11]);

        Some(Self {
            id,
            adfu: buf[11],
            unknown: buf[12],
        })
    }

    pub fn is_actions(&self) -> bool {
        &self.id == ACTIONS_ID
    }

    pub fn id_string(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Response byte of a successful INIT.
pub const INIT_READY: u8 = 0xFF;

/// INIT: switches the device into firmware service mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitCommand;

impl CommandBlock for InitCommand {
    fn to_bytes(&self) -> [u8; 16] {
        actions_cdb(OPCODE_INIT)
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }
}

/// Which view of the NAND a sector read goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandArea {
    /// Translated through the flash layer, as the firmware sees it.
    Logical,
    /// Raw flash pages.
    Physical,
}

impl NandArea {
    pub fn opcode(self) -> u8 {
        match self {
            NandArea::Logical => OPCODE_READ_LOGICAL,
            NandArea::Physical => OPCODE_READ_PHYSICAL,
        }
    }
}

/// Reads one 512-byte NAND sector.
#[derive(Debug, Clone, Copy)]
pub struct ReadSectorCommand {
    pub logical_unit_number: u8,
    pub logical_block_address: u32,
    pub area: NandArea,
}

impl ReadSectorCommand {
    pub fn new(logical_unit_number: u8, logical_block_address: u32, area: NandArea) -> Self {
        Self {
            logical_unit_number,
            logical_block_address,
            area,
        }
    }
}

impl CommandBlock for ReadSectorCommand {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = actions_cdb(self.area.opcode());
        cdb[2..6].copy_from_slice(&self.logical_block_address.to_le_bytes());
        cdb
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }

    fn lun(&self) -> u8 {
        self.logical_unit_number
    }
}

/// Reads `length` bytes of device RAM starting at a 512-byte sector.
///
/// The length is sent as given. Devices without general RAM access ignore
/// the sector and answer with at most the sysinfo block, so range checks
/// belong to the caller.
#[derive(Debug, Clone, Copy)]
pub struct ReadRamCommand {
    pub sector: u32,
    pub length: u32,
}

impl ReadRamCommand {
    pub fn new(sector: u32, length: u32) -> Self {
        Self { sector, length }
    }
}

impl CommandBlock for ReadRamCommand {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = actions_cdb(OPCODE_READ_RAM);
        cdb[2..6].copy_from_slice(&self.sector.to_le_bytes());
        cdb[6..10].copy_from_slice(&self.length.to_le_bytes());
        cdb
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }
}

/// DETACH: leaves firmware mode and restarts the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachCommand;

impl CommandBlock for DetachCommand {
    fn to_bytes(&self) -> [u8; 16] {
        actions_cdb(OPCODE_DETACH)
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }
}

/// ENTRY: jumps to the given entry point of the loaded code.
#[derive(Debug, Clone, Copy)]
pub struct EntryCommand {
    pub param: u16,
}

impl EntryCommand {
    pub fn new(param: u16) -> Self {
        Self { param }
    }
}

impl CommandBlock for EntryCommand {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = actions_cdb(OPCODE_ENTRY);
        cdb[2..4].copy_from_slice(&self.param.to_le_bytes());
        cdb
    }

    fn len(&self) -> u8 {
        ACTIONS_COMMAND_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::read10::Read10Command;

    #[test]
    fn sector_read_lba_is_little_endian() {
        let vendor = ReadSectorCommand::new(0, 0x0102_0304, NandArea::Logical).to_bytes();
        let scsi = Read10Command::new(0, 0x0102_0304).to_bytes();

        assert_eq!(&vendor[2..6], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&scsi[2..6], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn every_vendor_command_carries_the_marker() {
        let cdbs = [
            IdentifyCommand.to_bytes(),
            InitCommand.to_bytes(),
            ReadSectorCommand::new(5, 1, NandArea::Physical).to_bytes(),
            ReadRamCommand::new(4, 192).to_bytes(),
            DetachCommand.to_bytes(),
            EntryCommand::new(0x1234).to_bytes(),
        ];

        for cdb in cdbs {
            assert_eq!(cdb[1], ACTIONS_LUN_MARKER);
        }
    }

    #[test]
    fn physical_reads_use_their_own_opcode() {
        let cmd = ReadSectorCommand::new(3, 8, NandArea::Physical);
        assert_eq!(cmd.to_bytes()[0], 0x09);
        assert_eq!(cmd.lun(), 3);
        assert_eq!(cmd.len(), 11);
    }

    #[test]
    fn ram_read_packs_sector_and_length() {
        let cdb = ReadRamCommand::new(0x0000_0004, 0x0000_00C0).to_bytes();
        assert_eq!(cdb[0], 0x05);
        assert_eq!(&cdb[2..6], &[0x04, 0, 0, 0]);
        assert_eq!(&cdb[6..10], &[0xC0, 0, 0, 0]);
    }

    #[test]
    fn entry_param_is_little_endian() {
        let cdb = EntryCommand::new(0xBEEF).to_bytes();
        assert_eq!(&cdb[2..4], &[0xEF, 0xBE]);
    }

    #[test]
    fn identify_checks_the_full_id() {
        let mut buf = [0u8; IDENTIFY_LEN];
        buf[..11].copy_from_slice(b"ACTIONSUSBD");
        buf[11] = 1;
        let id = IdentifyData::parse(&buf).unwrap();
        assert!(id.is_actions());
        assert_eq!(id.adfu, 1);

        buf[10] = b'X';
        assert!(!IdentifyData::parse(&buf).unwrap().is_actions());
        assert!(IdentifyData::parse(&buf[..12]).is_none());
    }
}
