use super::{PACKET_TYPE_BITS, PACKET_TYPE_HEADER};
use crate::{OgmError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the header as written, including tail padding.
pub const STREAM_HEADER_SIZE: usize = 56;

/// Bytes needed to read every field.
pub const STREAM_HEADER_MIN_SIZE: usize = 52;

/// The `streamtype` tag of a legacy stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Video,
    Audio,
    Text,
    Index,
    Image,
}

impl HeaderKind {
    pub fn tag(&self) -> &'static str {
        match self {
            HeaderKind::Video => "video",
            HeaderKind::Audio => "audio",
            HeaderKind::Text => "text",
            HeaderKind::Index => "index",
            HeaderKind::Image => "image",
        }
    }

    fn from_tag(raw: &[u8]) -> Result<Self> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        match &raw[..end] {
            b"video" => Ok(HeaderKind::Video),
            b"audio" => Ok(HeaderKind::Audio),
            b"text" => Ok(HeaderKind::Text),
            b"index" => Ok(HeaderKind::Index),
            b"image" => Ok(HeaderKind::Image),
            other => Err(OgmError::UnknownStreamType(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// Parameters in the union at the end of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParams {
    Video { width: u32, height: u32 },
    Audio { channels: u16, blockalign: u16, avgbytespersec: u32 },
    Raw([u8; 8]),
}

/// The legacy fixed-layout stream header. All fields are little-endian on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub kind: HeaderKind,
    pub subtype: [u8; 4],
    pub size: u32,
    pub time_unit: i64,
    pub samples_per_unit: i64,
    pub default_len: u32,
    pub buffersize: u32,
    pub bits_per_sample: u16,
    pub params: HeaderParams,
}

impl StreamHeader {
    pub fn new(kind: HeaderKind) -> Self {
        let params = match kind {
            HeaderKind::Video => HeaderParams::Video { width: 0, height: 0 },
            HeaderKind::Audio => HeaderParams::Audio {
                channels: 0,
                blockalign: 0,
                avgbytespersec: 0,
            },
            _ => HeaderParams::Raw([0; 8]),
        };
        Self {
            kind,
            subtype: [0; 4],
            size: STREAM_HEADER_SIZE as u32,
            time_unit: 0,
            samples_per_unit: 0,
            default_len: 1,
            buffersize: 0,
            bits_per_sample: 0,
            params,
        }
    }

    pub fn with_subtype(mut self, subtype: [u8; 4]) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn with_time_unit(mut self, time_unit: i64) -> Self {
        self.time_unit = time_unit;
        self
    }

    pub fn with_samples_per_unit(mut self, samples_per_unit: i64) -> Self {
        self.samples_per_unit = samples_per_unit;
        self
    }

    pub fn with_default_len(mut self, default_len: u32) -> Self {
        self.default_len = default_len;
        self
    }

    pub fn with_buffersize(mut self, buffersize: u32) -> Self {
        self.buffersize = buffersize;
        self
    }

    pub fn with_bits_per_sample(mut self, bits_per_sample: u16) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn with_params(mut self, params: HeaderParams) -> Self {
        self.params = params;
        self
    }

    /// Parses a header from the bytes following the packet type byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < STREAM_HEADER_MIN_SIZE {
            return Err(OgmError::MalformedHeader(format!(
                "stream header needs {} bytes, got {}",
                STREAM_HEADER_MIN_SIZE,
                data.len()
            )));
        }

        let kind = HeaderKind::from_tag(&data[0..8])?;
        let le16 = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);
        let le32 = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let le64 = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[at..at + 8]);
            i64::from_le_bytes(raw)
        };

        let params = match kind {
            HeaderKind::Video => HeaderParams::Video {
                width: le32(44),
                height: le32(48),
            },
            HeaderKind::Audio => HeaderParams::Audio {
                channels: le16(44),
                blockalign: le16(46),
                avgbytespersec: le32(48),
            },
            _ => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[44..52]);
                HeaderParams::Raw(raw)
            }
        };

        let mut subtype = [0u8; 4];
        subtype.copy_from_slice(&data[8..12]);

        Ok(StreamHeader {
            kind,
            subtype,
            size: le32(12),
            time_unit: le64(16),
            samples_per_unit: le64(24),
            default_len: le32(32),
            buffersize: le32(36),
            bits_per_sample: le16(40),
            params,
        })
    }

    /// Parses a complete header packet, type byte included.
    pub fn from_packet(packet: &[u8]) -> Result<Self> {
        match packet.first() {
            Some(&flags) if flags & PACKET_TYPE_BITS == PACKET_TYPE_HEADER => Self::parse(&packet[1..]),
            _ => Err(OgmError::MalformedHeader(
                "packet is not a stream header".into(),
            )),
        }
    }

    /// Writes the 56 byte wire layout.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut streamtype = [0u8; 8];
        let tag = self.kind.tag().as_bytes();
        streamtype[..tag.len()].copy_from_slice(tag);

        buf.put_slice(&streamtype);
        buf.put_slice(&self.subtype);
        buf.put_u32_le(self.size);
        buf.put_i64_le(self.time_unit);
        buf.put_i64_le(self.samples_per_unit);
        buf.put_u32_le(self.default_len);
        buf.put_u32_le(self.buffersize);
        buf.put_u16_le(self.bits_per_sample);
        buf.put_u16_le(0); // padding
        match self.params {
            HeaderParams::Video { width, height } => {
                buf.put_u32_le(width);
                buf.put_u32_le(height);
            }
            HeaderParams::Audio {
                channels,
                blockalign,
                avgbytespersec,
            } => {
                buf.put_u16_le(channels);
                buf.put_u16_le(blockalign);
                buf.put_u32_le(avgbytespersec);
            }
            HeaderParams::Raw(raw) => buf.put_slice(&raw),
        }
        buf.put_u32_le(0); // tail padding
    }

    /// Builds the header packet: type byte followed by the header.
    pub fn to_packet(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + STREAM_HEADER_SIZE);
        buf.put_u8(PACKET_TYPE_HEADER);
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Granules per second: frames for video, samples for audio and
    /// milliseconds for text.
    pub fn sample_rate(&self) -> f64 {
        match self.kind {
            HeaderKind::Audio => self.samples_per_unit as f64,
            _ if self.time_unit > 0 => 10_000_000.0 / self.time_unit as f64,
            _ => 0.0,
        }
    }

    pub fn subtype_str(&self) -> String {
        String::from_utf8_lossy(&self.subtype)
            .trim_end_matches('\0')
            .to_string()
    }

    /// Subtype as the little-endian number audio headers store as hex text.
    pub fn audio_codec(&self) -> Option<u32> {
        u32::from_str_radix(self.subtype_str().trim(), 16).ok()
    }

    pub fn width(&self) -> u32 {
        match self.params {
            HeaderParams::Video { width, .. } => width,
            _ => 0,
        }
    }

    pub fn height(&self) -> u32 {
        match self.params {
            HeaderParams::Video { height, .. } => height,
            _ => 0,
        }
    }

    pub fn channels(&self) -> u16 {
        match self.params {
            HeaderParams::Audio { channels, .. } => channels,
            _ => 0,
        }
    }

    pub fn blockalign(&self) -> u16 {
        match self.params {
            HeaderParams::Audio { blockalign, .. } => blockalign,
            _ => 0,
        }
    }

    pub fn avgbytespersec(&self) -> u32 {
        match self.params {
            HeaderParams::Audio { avgbytespersec, .. } => avgbytespersec,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn video_header() -> StreamHeader {
        StreamHeader::new(HeaderKind::Video)
            .with_subtype(*b"XVID")
            .with_time_unit(400_000)
            .with_samples_per_unit(1)
            .with_buffersize(65536)
            .with_bits_per_sample(24)
            .with_params(HeaderParams::Video { width: 640, height: 352 })
    }

    #[test]
    fn test_video_wire_layout() {
        let packet = video_header().to_packet();
        assert_eq!(packet.len(), 1 + STREAM_HEADER_SIZE);
        assert_eq!(packet[0], PACKET_TYPE_HEADER);
        assert_eq!(&packet[1..9], b"video\0\0\0");
        assert_eq!(&packet[9..13], b"XVID");
        assert_eq!(&packet[13..17], &56u32.to_le_bytes());
        assert_eq!(&packet[17..25], &400_000i64.to_le_bytes());
        assert_eq!(&packet[45..49], &640u32.to_le_bytes());
        assert_eq!(&packet[49..53], &352u32.to_le_bytes());

        let parsed = StreamHeader::from_packet(&packet).unwrap();
        assert_eq!(parsed, video_header());
        assert_eq!(parsed.sample_rate(), 25.0);
        assert_eq!(parsed.width(), 640);
    }

    #[test]
    fn test_audio_fields() {
        let header = StreamHeader::new(HeaderKind::Audio)
            .with_subtype(*b"0055")
            .with_time_unit(10_000_000)
            .with_samples_per_unit(44100)
            .with_params(HeaderParams::Audio {
                channels: 2,
                blockalign: 1152,
                avgbytespersec: 16000,
            });
        let parsed = StreamHeader::from_packet(&header.to_packet()).unwrap();
        assert_eq!(parsed.channels(), 2);
        assert_eq!(parsed.blockalign(), 1152);
        assert_eq!(parsed.avgbytespersec(), 16000);
        assert_eq!(parsed.sample_rate(), 44100.0);
        assert_eq!(parsed.audio_codec(), Some(0x55));
    }

    #[test]
    fn test_accepts_short_legacy_header() {
        let packet = video_header().to_packet();
        assert!(StreamHeader::parse(&packet[1..1 + STREAM_HEADER_MIN_SIZE]).is_ok());
        assert!(matches!(
            StreamHeader::parse(&packet[1..40]),
            Err(OgmError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_unknown_stream_type() {
        let mut packet = video_header().to_packet().to_vec();
        packet[1..9].copy_from_slice(b"teletex\0");
        match StreamHeader::from_packet(&packet) {
            Err(OgmError::UnknownStreamType(tag)) => assert_eq!(tag, "teletex"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_text_rate() {
        let header = StreamHeader::new(HeaderKind::Text).with_time_unit(10_000);
        assert_eq!(header.sample_rate(), 1000.0);
    }
}
