use crate::error::{OgmError, Result};

/// Widest header the reader holds, in bytes.
pub const MAX_HEADER_BYTES: usize = 8;

/// Reads big-endian bit fields out of a fixed-layout frame header.
///
/// The header is loaded into a single 64 bit word up front, so a reader
/// covers at most [`MAX_HEADER_BYTES`] bytes.
///
/// ```
/// use ogmkit::utils::BitReader;
///
/// let mut reader = BitReader::new(&[0xFF, 0xFB]).unwrap();
/// assert_eq!(reader.read_bits(11).unwrap(), 0x7FF); // MPEG sync
/// assert_eq!(reader.read_bits(2).unwrap(), 0b11);
/// assert!(!reader.read_bit().unwrap());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BitReader {
    word: u64,
    len: u32,
    pos: u32,
}

impl BitReader {
    pub fn new(header: &[u8]) -> Result<Self> {
        if header.len() > MAX_HEADER_BYTES {
            return Err(OgmError::Parser(format!(
                "frame header of {} bytes is longer than {}",
                header.len(),
                MAX_HEADER_BYTES
            )));
        }
        let word = header.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        Ok(BitReader {
            word,
            len: header.len() as u32 * 8,
            pos: 0,
        })
    }

    /// Reads `n` bits, at most 32.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(OgmError::Parser("too many bits requested".into()));
        }
        if n > self.remaining() {
            return Err(OgmError::Parser("reached end of header data".into()));
        }
        if n == 0 {
            return Ok(0);
        }
        let shift = self.len - self.pos - n;
        let mask = (1u64 << n) - 1;
        self.pos += n;
        Ok(((self.word >> shift) & mask) as u32)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if n > self.remaining() {
            return Err(OgmError::Parser("reached end of header data".into()));
        }
        self.pos += n;
        Ok(())
    }

    /// Bits left to read.
    pub fn remaining(&self) -> u32 {
        self.len - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_fields_across_bytes() {
        let mut reader = BitReader::new(&[0b1011_0011, 0b0101_1010]).unwrap();
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b1001_1010);
        assert_eq!(reader.remaining(), 5);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        // AC-3 sync word followed by the CRC
        let mut reader = BitReader::new(&[0x0B, 0x77, 0x12, 0x34, 0x54, 0, 0, 0]).unwrap();
        assert_eq!(reader.read_bits(16).unwrap(), 0x0B77);
        reader.skip_bits(16).unwrap();
        assert_eq!(reader.read_bits(2).unwrap(), 0b01);
        assert_eq!(reader.read_bits(6).unwrap(), 0b010100);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut reader = BitReader::new(&[0xFF]).unwrap();
        assert!(reader.read_bits(33).is_err());
        reader.read_bits(8).unwrap();
        assert!(reader.read_bit().is_err());
        assert!(reader.skip_bits(1).is_err());
        assert!(BitReader::new(&[0; 9]).is_err());
    }

    #[quickcheck]
    fn prop_fields_match_bit_by_bit(data: Vec<u8>, n: u8) -> bool {
        let data: Vec<u8> = data.into_iter().take(MAX_HEADER_BYTES).collect();
        let n = (n % 33) as usize;
        let Ok(mut reader) = BitReader::new(&data) else {
            return false;
        };
        match reader.read_bits(n as u32) {
            Ok(value) => {
                let expected = (0..n).fold(0u32, |acc, i| {
                    let bit = (data[i / 8] >> (7 - i % 8)) & 1;
                    (acc << 1) | bit as u32
                });
                value == expected
            }
            Err(_) => data.len() * 8 < n,
        }
    }
}
