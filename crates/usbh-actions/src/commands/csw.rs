/// `dCSWSignature`, "USBS" read as a little-endian word.
pub const CSW_SIGNATURE: u32 = 0x53425355;
/// A CSW is always exactly 13 bytes on the wire.
pub const CSW_LEN: usize = 13;

/// Command Status Wrapper, the last phase of every bulk-only transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw {
    pub signature: u32,
    pub tag: u32,
    pub data_residue: u32,
    pub status: u8,
}

impl Csw {
    /// Build a well formed status for `tag`.
    pub fn new(tag: u32, data_residue: u32, status: u8) -> Self {
        Self {
            signature: CSW_SIGNATURE,
            tag,
            data_residue,
            status,
        }
    }

    /// Parse a 13-byte status wrapper. The signature is kept as received so
    /// the caller can tell a foreign packet from a mismatched tag.
    ///
    /// Returns `None` if the buffer is not exactly 13 bytes long.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() != CSW_LEN {
            return None;
        }

        Some(Self {
            signature: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            tag: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_residue: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: buf[12],
        })
    }

    /// True if `buf` looks like a status wrapper: right size, right signature.
    pub fn is_status_packet(buf: &[u8]) -> bool {
        buf.len() == CSW_LEN && buf[0..4] == CSW_SIGNATURE.to_le_bytes()
    }

    pub fn has_signature(&self) -> bool {
        self.signature == CSW_SIGNATURE
    }

    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut buf = [0u8; CSW_LEN];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        buf[12] = self.status;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_foreign_signature() {
        let mut bytes = Csw::new(9, 0, 1).to_bytes();
        assert_eq!(&bytes[0..4], b"USBS");
        assert!(Csw::is_status_packet(&bytes));

        bytes[0] = b'X';
        let csw = Csw::parse(&bytes).unwrap();
        assert!(!csw.has_signature());
        assert_eq!(csw.tag, 9);
        assert_eq!(csw.status, 1);
        assert!(!Csw::is_status_packet(&bytes));
    }

    #[test]
    fn parse_requires_exact_length() {
        let bytes = Csw::new(1, 0, 0).to_bytes();
        assert!(Csw::parse(&bytes[..12]).is_none());
        assert!(!Csw::is_status_packet(&bytes[..12]));
    }
}
