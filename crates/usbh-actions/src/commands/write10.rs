use crate::commands::CommandBlock;

/// WRITE(10) command - writes one block at an LBA, byte for byte.
#[derive(Debug, Clone, Copy)]
pub struct Write10Command {
    pub logical_block_address: u32,
    pub logical_unit_number: u8,
}

impl Write10Command {
    pub const TRANSFER_LENGTH: u16 = 1;

    pub fn new(logical_unit_number: u8, logical_block_address: u32) -> Self {
        Self {
            logical_block_address,
            logical_unit_number,
        }
    }
}

impl CommandBlock for Write10Command {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = 0x2A; // WRITE(10) opcode
        cdb[1] = (self.logical_unit_number & 0x07) << 5;
        cdb[2..6].copy_from_slice(&self.logical_block_address.to_be_bytes());
        cdb[7..9].copy_from_slice(&Self::TRANSFER_LENGTH.to_be_bytes());
        cdb
    }

    fn len(&self) -> u8 {
        10
    }

    fn lun(&self) -> u8 {
        self.logical_unit_number
    }
}
