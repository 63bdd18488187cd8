use crate::utils::BitReader;
use crate::{OgmError, Result};

/// Samples per AC-3 sync frame.
pub const AC3_SAMPLES_PER_FRAME: u32 = 1536;

/// Bytes needed to decode everything up to and including `lfeon`.
pub const AC3_HEADER_SIZE: usize = 8;

const BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

const SAMPLE_RATES: [u32; 3] = [48000, 44100, 32000];

const ACMOD_CHANNELS: [u16; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Header {
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
    pub bsid: u8,
    pub acmod: u8,
    pub lfe: bool,
    /// Complete sync frame length in bytes.
    pub frame_size: usize,
}

impl Ac3Header {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < AC3_HEADER_SIZE {
            return Err(OgmError::Parser("AC-3 header too short".into()));
        }

        let mut reader = BitReader::new(&data[..AC3_HEADER_SIZE])?;

        if reader.read_bits(16)? != 0x0B77 {
            return Err(OgmError::Parser("invalid AC-3 sync word".into()));
        }
        reader.skip_bits(16)?; // crc1

        let fscod = reader.read_bits(2)? as usize;
        let frmsizecod = reader.read_bits(6)? as usize;
        let bsid = reader.read_bits(5)? as u8;
        reader.skip_bits(3)?; // bsmod
        let acmod = reader.read_bits(3)? as u8;

        if fscod == 3 {
            return Err(OgmError::Parser("reserved AC-3 sample rate".into()));
        }
        if frmsizecod >= 2 * BITRATES.len() {
            return Err(OgmError::Parser("invalid AC-3 frame size code".into()));
        }
        if bsid > 10 {
            return Err(OgmError::Parser(format!("unsupported AC-3 bsid {}", bsid)));
        }

        if acmod & 1 != 0 && acmod != 1 {
            reader.skip_bits(2)?; // cmixlev
        }
        if acmod & 4 != 0 {
            reader.skip_bits(2)?; // surmixlev
        }
        if acmod == 2 {
            reader.skip_bits(2)?; // dsurmod
        }
        let lfe = reader.read_bit()?;

        let bitrate_kbps = BITRATES[frmsizecod / 2];
        let words = match fscod {
            0 => bitrate_kbps * 2,
            1 => bitrate_kbps * 1536 * 1000 / (44100 * 16) + (frmsizecod as u32 & 1),
            _ => bitrate_kbps * 3,
        };

        Ok(Ac3Header {
            sample_rate: SAMPLE_RATES[fscod],
            bitrate_kbps,
            bsid,
            acmod,
            lfe,
            frame_size: words as usize * 2,
        })
    }

    pub fn channels(&self) -> u16 {
        ACMOD_CHANNELS[self.acmod as usize] + self.lfe as u16
    }

    /// Milliseconds of audio covered by one frame, derived from the frame size
    /// and bitrate.
    pub fn ms_per_frame(&self) -> f64 {
        self.frame_size as f64 * 1000.0 / (self.bitrate_kbps as f64 * 1000.0 / 8.0)
    }
}

/// Finds the first offset at which a valid sync frame header starts.
pub fn find_header(data: &[u8]) -> Option<(usize, Ac3Header)> {
    if data.len() < AC3_HEADER_SIZE {
        return None;
    }
    (0..=data.len() - AC3_HEADER_SIZE).find_map(|pos| {
        if data[pos] != 0x0B || data[pos + 1] != 0x77 {
            return None;
        }
        Ac3Header::parse(&data[pos..]).ok().map(|header| (pos, header))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 48 kHz, 192 kbps, 3/2 + LFE sync frame with a filler body.
    pub fn ac3_frame() -> Vec<u8> {
        // fscod 00, frmsizecod 010100 (192 kbps); bsid 8, bsmod 0;
        // acmod 111, cmixlev 00, surmixlev 00, lfeon 1
        let mut frame = vec![0x0B, 0x77, 0x00, 0x00, 0x14, 0x40, 0xE1, 0x00];
        frame.resize(768, 0xAA);
        frame
    }

    #[test]
    fn test_parse_header() {
        let header = Ac3Header::parse(&ac3_frame()).unwrap();
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.bitrate_kbps, 192);
        assert_eq!(header.bsid, 8);
        assert_eq!(header.acmod, 7);
        assert!(header.lfe);
        assert_eq!(header.channels(), 6);
        assert_eq!(header.frame_size, 768);
        assert_eq!(header.ms_per_frame(), 32.0);
    }

    #[test]
    fn test_44khz_frame_sizes() {
        // 44.1 kHz, 32 kbps without and with the extra word
        let header = Ac3Header::parse(&[0x0B, 0x77, 0, 0, 0x40, 0x40, 0x40, 0x00]).unwrap();
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.frame_size, 69 * 2);
        let header = Ac3Header::parse(&[0x0B, 0x77, 0, 0, 0x41, 0x40, 0x40, 0x00]).unwrap();
        assert_eq!(header.frame_size, 70 * 2);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Ac3Header::parse(&[0x0B, 0x77, 0, 0]).is_err());
        assert!(Ac3Header::parse(&[0x0B, 0x78, 0, 0, 0x14, 0x40, 0xE0, 0x40]).is_err());
        assert!(Ac3Header::parse(&[0x0B, 0x77, 0, 0, 0xD4, 0x40, 0xE0, 0x40]).is_err());
        assert!(Ac3Header::parse(&[0x0B, 0x77, 0, 0, 0x3F, 0x40, 0xE0, 0x40]).is_err());
    }

    #[test]
    fn test_find_header() {
        let mut data = vec![0x00, 0x0B, 0x00];
        data.extend_from_slice(&ac3_frame());
        let (pos, _) = find_header(&data).unwrap();
        assert_eq!(pos, 3);
    }
}
