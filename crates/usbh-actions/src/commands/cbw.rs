use crate::commands::CommandBlock;

/// `dCBWSignature`, "USBC" read as a little-endian word.
pub const CBW_SIGNATURE: u32 = 0x43425355;
/// A CBW is always exactly 31 bytes on the wire.
pub const CBW_LEN: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Value of `bmCBWFlags` for this direction.
    pub fn flags(self) -> u8 {
        match self {
            Direction::In => 0x80,
            Direction::Out => 0x00,
        }
    }

    pub fn from_flags(flags: u8) -> Self {
        if flags & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Command Block Wrapper, the first phase of every bulk-only transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cbw {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub direction: Direction,
    pub lun: u8,
    pub command_length: u8,
    pub command: [u8; 16],
}

impl Cbw {
    pub fn new<T: CommandBlock>(tag: u32, data_len: u32, direction: Direction, cmd: &T) -> Self {
        let command_length = cmd.len();
        assert!(command_length <= 16, "Command block too long");

        Self {
            tag,
            data_transfer_length: data_len,
            direction,
            lun: cmd.lun(),
            command_length,
            command: cmd.to_bytes(),
        }
    }

    /// Operation code of the wrapped command.
    pub fn opcode(&self) -> u8 {
        self.command[0]
    }

    /// Serialize into exactly 31 bytes (the CBW size)
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut buf = [0u8; CBW_LEN];

        buf[0..4].copy_from_slice(&CBW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_transfer_length.to_le_bytes());
        buf[12] = self.direction.flags();
        buf[13] = self.lun;
        buf[14] = self.command_length;
        buf[15..31].copy_from_slice(&self.command);

        buf
    }

    /// Parse a wrapper as a device would see it.
    ///
    /// Returns `None` unless the buffer is exactly 31 bytes and carries the
    /// "USBC" signature.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() != CBW_LEN || buf[0..4] != CBW_SIGNATURE.to_le_bytes() {
            return None;
        }

        let mut command = [0u8; 16];
        command.copy_from_slice(&buf[15..31]);

        Some(Self {
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_transfer_length: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            direction: Direction::from_flags(buf[12]),
            lun: buf[13],
            command_length: buf[14],
            command,
        })
    }
}
