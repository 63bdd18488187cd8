use crate::{OgmError, Result};
use bytes::Bytes;

/// Parameters from a Vorbis identification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VorbisInfo {
    pub version: u32,
    pub channels: u8,
    pub rate: u32,
    pub bitrate_upper: i32,
    pub bitrate_nominal: i32,
    pub bitrate_lower: i32,
}

impl VorbisInfo {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < 30 || packet[0] != 0x01 || !is_vorbis_packet(packet) {
            return Err(OgmError::MalformedHeader(
                "not a Vorbis identification header".into(),
            ));
        }

        let le32 = |at: usize| u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]]);

        let info = VorbisInfo {
            version: le32(7),
            channels: packet[11],
            rate: le32(12),
            bitrate_upper: le32(16) as i32,
            bitrate_nominal: le32(20) as i32,
            bitrate_lower: le32(24) as i32,
        };

        if info.rate == 0 || info.channels == 0 {
            return Err(OgmError::MalformedHeader(
                "Vorbis header with zero rate or channels".into(),
            ));
        }

        Ok(info)
    }
}

/// Returns true if the packet carries the `vorbis` tag after its type byte.
pub fn is_vorbis_packet(packet: &[u8]) -> bool {
    packet.len() >= 7 && &packet[1..7] == b"vorbis"
}

/// Encoder seam used to prepend silence to a Vorbis stream.
///
/// Implementations wrap an actual Vorbis encoder configured from the stream's
/// three header packets; this crate never encodes audio itself.
pub trait SilenceEncoder {
    /// Encodes `samples` samples of silence and returns the packets with
    /// their granule positions relative to the start of the stream.
    fn encode_silence(&mut self, info: &VorbisInfo, samples: u64) -> Result<Vec<(Bytes, i64)>>;
}
