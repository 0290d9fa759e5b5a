use crate::commands::CommandBlock;

/// READ(10) command - reads one block at an LBA.
#[derive(Debug, Clone, Copy)]
pub struct Read10Command {
    pub logical_block_address: u32,
    pub logical_unit_number: u8,
}

impl Read10Command {
    /// Blocks moved per command; multi-sector dumps loop over single reads.
    pub const TRANSFER_LENGTH: u16 = 1;

    pub fn new(logical_unit_number: u8, logical_block_address: u32) -> Self {
        Self {
            logical_block_address,
            logical_unit_number,
        }
    }
}

impl CommandBlock for Read10Command {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = 0x28; // READ(10) opcode

        cdb[1] = (self.logical_unit_number & 0x07) << 5;

        // Logical Block Address (big-endian: MSB first)
        cdb[2..6].copy_from_slice(&self.logical_block_address.to_be_bytes());

        // Transfer Length (number of blocks, big-endian)
        cdb[7..9].copy_from_slice(&Self::TRANSFER_LENGTH.to_be_bytes());

        cdb
    }

    fn len(&self) -> u8 {
        10 // READ(10) CDB is always 10 bytes
    }

    fn lun(&self) -> u8 {
        self.logical_unit_number
    }
}
