//! Wrapping word sums used by firmware headers, directory entries and AFI
//! containers. Words are little-endian; a trailing partial word is padded with
//! zeros.

/// Sum of little-endian `u16` words.
pub fn sum16(bytes: &[u8]) -> u16 {
    let mut chunks = bytes.chunks_exact(2);
    let mut sum = chunks
        .by_ref()
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(*last as u16);
    }
    sum
}

/// Sum of little-endian `u32` words.
pub fn sum32(bytes: &[u8]) -> u32 {
    let mut checksum = Checksum32::new();
    checksum.update(bytes);
    checksum.finish()
}

/// Incremental form of [`sum32`], for data that arrives in pieces.
#[derive(Debug, Clone, Default)]
pub struct Checksum32 {
    sum: u32,
    pending: [u8; 4],
    pending_len: usize,
}

impl Checksum32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mut bytes: &[u8]) {
        if self.pending_len > 0 {
            let take = (4 - self.pending_len).min(bytes.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&bytes[..take]);
            self.pending_len += take;
            bytes = &bytes[take..];

            if self.pending_len < 4 {
                return;
            }
            self.sum = self.sum.wrapping_add(u32::from_le_bytes(self.pending));
            self.pending_len = 0;
        }

        let mut words = bytes.chunks_exact(4);
        for w in words.by_ref() {
            self.sum = self
                .sum
                .wrapping_add(u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        }

        let rest = words.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    pub fn finish(&self) -> u32 {
        if self.pending_len == 0 {
            return self.sum;
        }
        let mut last = [0u8; 4];
        last[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
        self.sum.wrapping_add(u32::from_le_bytes(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_little_endian() {
        assert_eq!(sum16(&[0x01, 0x02, 0x03, 0x04]), 0x0201 + 0x0403);
        assert_eq!(sum32(&[0x01, 0x02, 0x03, 0x04]), 0x0403_0201);
    }

    #[test]
    fn sums_wrap() {
        assert_eq!(sum16(&[0xFF, 0xFF, 0x02, 0x00]), 0x0001);
        assert_eq!(sum32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0, 0, 0]), 0x0000_0001);
    }

    #[test]
    fn partial_words_are_zero_padded() {
        assert_eq!(sum16(&[0x10, 0x00, 0x05]), 0x15);
        assert_eq!(sum32(&[0, 0, 0, 0, 0xAA, 0xBB]), 0xBBAA);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1027).collect();

        let mut checksum = Checksum32::new();
        for piece in data.chunks(7) {
            checksum.update(piece);
        }
        assert_eq!(checksum.finish(), sum32(&data));
    }
}
