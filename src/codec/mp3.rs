use crate::utils::BitReader;
use crate::{OgmError, Result};

/// Samples per layer III frame as recorded in the OGM lacing of every packet.
pub const MP3_SAMPLES_PER_FRAME: u32 = 1152;

pub const MP3_HEADER_SIZE: usize = 4;

const BITRATES_V1: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const BITRATES_V2: [[u32; 15]; 3] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    fn index(&self) -> usize {
        match self {
            MpegVersion::Mpeg1 => 0,
            MpegVersion::Mpeg2 => 1,
            MpegVersion::Mpeg25 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Header {
    pub version: MpegVersion,
    pub layer: u8,          // 1, 2 or 3
    pub protected: bool,    // CRC follows the header
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: u8,   // 3 = mono
    /// Complete frame length including the 4 header bytes.
    pub frame_size: usize,
}

impl Mp3Header {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MP3_HEADER_SIZE {
            return Err(OgmError::Parser("MPEG audio header too short".into()));
        }

        let mut reader = BitReader::new(&data[..MP3_HEADER_SIZE])?;

        if reader.read_bits(11)? != 0x7FF {
            return Err(OgmError::Parser("invalid MPEG audio sync word".into()));
        }

        let version = match reader.read_bits(2)? {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return Err(OgmError::Parser("reserved MPEG version".into())),
        };
        let layer = match reader.read_bits(2)? {
            0b01 => 3,
            0b10 => 2,
            0b11 => 1,
            _ => return Err(OgmError::Parser("reserved MPEG layer".into())),
        };
        let protected = !reader.read_bit()?;

        let bitrate_index = reader.read_bits(4)? as usize;
        let rate_index = reader.read_bits(2)? as usize;
        let padding = reader.read_bit()?;
        reader.skip_bits(1)?; // private
        let channel_mode = reader.read_bits(2)? as u8;

        if bitrate_index == 0 || bitrate_index == 15 {
            return Err(OgmError::Parser("unsupported MPEG audio bitrate index".into()));
        }
        if rate_index == 3 {
            return Err(OgmError::Parser("reserved MPEG audio sample rate".into()));
        }

        let table = if version == MpegVersion::Mpeg1 {
            &BITRATES_V1
        } else {
            &BITRATES_V2
        };
        let bitrate_kbps = table[(layer - 1) as usize][bitrate_index];
        let sample_rate = SAMPLE_RATES[version.index()][rate_index];

        let bitrate = bitrate_kbps * 1000;
        let pad = padding as u32;
        let frame_size = match (layer, version) {
            (1, _) => (12 * bitrate / sample_rate + pad) * 4,
            (3, MpegVersion::Mpeg2) | (3, MpegVersion::Mpeg25) => 72 * bitrate / sample_rate + pad,
            _ => 144 * bitrate / sample_rate + pad,
        } as usize;

        Ok(Mp3Header {
            version,
            layer,
            protected,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
            frame_size,
        })
    }

    pub fn is_layer3(&self) -> bool {
        self.layer == 3
    }

    pub fn channels(&self) -> u16 {
        if self.channel_mode == 3 {
            1
        } else {
            2
        }
    }

    /// Milliseconds of audio covered by one frame, as used for A/V sync.
    pub fn ms_per_frame(&self) -> f64 {
        1000.0 * MP3_SAMPLES_PER_FRAME as f64 / self.sample_rate as f64
    }
}

/// Finds the first offset at which a valid frame header starts.
pub fn find_header(data: &[u8]) -> Option<(usize, Mp3Header)> {
    if data.len() < MP3_HEADER_SIZE {
        return None;
    }
    (0..=data.len() - MP3_HEADER_SIZE).find_map(|pos| {
        if data[pos] != 0xFF || data[pos + 1] & 0xE0 != 0xE0 {
            return None;
        }
        Mp3Header::parse(&data[pos..]).ok().map(|header| (pos, header))
    })
}
