use super::comments::CommentSet;
use super::header::{HeaderKind, StreamHeader};
use super::lacing::decode_lacing;
use super::page::PageKind;
use super::PACKET_TYPE_BITS;
use crate::av::{Packet, StreamKind};
use crate::codec::vorbis::is_vorbis_packet;
use crate::codec::VorbisInfo;
use crate::{OgmError, Result};
use log::{debug, info, warn};
use ogg::PacketReader;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Tag of the DirectShow headers some early muxers wrote.
const DIRECTSHOW_TAG: &[u8] = b"Direct Show Samples embedded in Ogg";

/// Audio codec of a legacy audio stream, from its hex subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Pcm,
    Mp3,
    Ac3,
    Vorbis,
    Other(u32),
}

impl AudioCodec {
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0x0001 => AudioCodec::Pcm,
            0x0055 => AudioCodec::Mp3,
            0x2000 => AudioCodec::Ac3,
            0xffff => AudioCodec::Vorbis,
            other => AudioCodec::Other(other),
        }
    }

    pub fn tag(&self) -> u32 {
        match self {
            AudioCodec::Pcm => 0x0001,
            AudioCodec::Mp3 => 0x0055,
            AudioCodec::Ac3 => 0x2000,
            AudioCodec::Vorbis => 0xffff,
            AudioCodec::Other(tag) => *tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Pcm => "PCM",
            AudioCodec::Mp3 => "MP3",
            AudioCodec::Ac3 => "AC3",
            AudioCodec::Vorbis => "Vorbis",
            AudioCodec::Other(_) => "unknown",
        }
    }
}

/// A logical stream found in the begin-of-stream pages of a file.
#[derive(Debug, Clone)]
pub struct ElementaryStream {
    pub serial: u32,
    pub kind: StreamKind,
    /// One-based position among the streams sharing the kind's letter.
    pub number: usize,
    /// Granules per second.
    pub rate: f64,
    pub header: Option<StreamHeader>,
    pub vorbis: Option<VorbisInfo>,
    /// Header class packets in the order they were read.
    pub header_packets: Vec<Packet>,
    pub comments: Option<CommentSet>,
}

impl ElementaryStream {
    /// Classifies a stream by its first packet.
    pub fn from_bos_packet(serial: u32, data: &[u8]) -> Result<Self> {
        let stream = |kind, rate, header, vorbis| ElementaryStream {
            serial,
            kind,
            number: 0,
            rate,
            header,
            vorbis,
            header_packets: Vec::new(),
            comments: None,
        };

        if is_vorbis_packet(data) {
            let info = VorbisInfo::parse(data)?;
            return Ok(stream(StreamKind::Vorbis, info.rate as f64, None, Some(info)));
        }
        if data.len() > DIRECTSHOW_TAG.len() && data[1..].starts_with(DIRECTSHOW_TAG) {
            return Err(OgmError::UnknownStreamType(format!(
                "old DirectShow header in stream {}",
                serial
            )));
        }
        if data.first().map_or(true, |&b| b & PACKET_TYPE_BITS != super::PACKET_TYPE_HEADER) {
            return Err(OgmError::MalformedHeader(format!(
                "stream {} does not start with a stream header",
                serial
            )));
        }

        let header = StreamHeader::from_packet(data)?;
        let kind = match header.kind {
            HeaderKind::Video => StreamKind::Video,
            HeaderKind::Audio => StreamKind::Audio,
            HeaderKind::Text => StreamKind::Text,
            HeaderKind::Image => StreamKind::Image,
            HeaderKind::Index => StreamKind::Index,
        };
        let rate = match kind {
            StreamKind::Index => 0.0,
            _ => header.sample_rate(),
        };
        Ok(stream(kind, rate, Some(header), None))
    }

    /// Number of header class packets the stream starts with.
    pub fn header_count(&self) -> usize {
        match self.kind {
            StreamKind::Vorbis => 3,
            _ => 2,
        }
    }

    pub fn headers_complete(&self) -> bool {
        self.header_packets.len() >= self.header_count()
    }

    /// Short name such as `a1` or `v2`.
    pub fn label(&self) -> String {
        format!("{}{}", self.kind.letter(), self.number)
    }

    pub fn audio_codec(&self) -> Option<AudioCodec> {
        match self.kind {
            StreamKind::Vorbis => Some(AudioCodec::Vorbis),
            StreamKind::Audio => self
                .header
                .as_ref()
                .and_then(StreamHeader::audio_codec)
                .map(AudioCodec::from_tag),
            _ => None,
        }
    }

    /// Milliseconds covered by `granulepos` granules.
    pub fn granule_to_ms(&self, granulepos: i64) -> f64 {
        if self.rate > 0.0 {
            granulepos as f64 * 1000.0 / self.rate
        } else {
            0.0
        }
    }

    /// Frame size of the embedded video, if any.
    pub fn video_size(&self) -> Option<(u32, u32)> {
        match (&self.header, self.kind) {
            (Some(header), StreamKind::Video) => Some((header.width(), header.height())),
            _ => None,
        }
    }
}

/// Frames (or samples, or milliseconds) a data packet covers according to
/// its lacing. Packets without lacing count as one.
pub fn frames_in_packet(data: &[u8]) -> u64 {
    decode_lacing(data).map_or(1, |(_, frames)| frames)
}

/// A packet read from an OGM file together with where it sits.
#[derive(Debug, Clone)]
pub struct InputPacket {
    pub serial: u32,
    pub packet: Packet,
    /// Granule of the page the packet ends on.
    pub page_granulepos: i64,
    /// Granule of the stream's previous page.
    pub previous_page_granulepos: i64,
    /// Position among the stream's header packets.
    pub header_index: Option<usize>,
}

impl InputPacket {
    pub fn is_header(&self) -> bool {
        self.header_index.is_some()
    }
}

#[derive(Debug, Default)]
struct PageTrack {
    packets: usize,
    in_page: bool,
    this_granulepos: i64,
    last_granulepos: i64,
}

/// Reads the streams of an OGM file packet by packet.
///
/// The begin-of-stream pages are read on construction and classify every
/// stream; an unknown stream type is an error for the whole file.
pub struct OgmReader<R: Read + Seek> {
    reader: PacketReader<R>,
    streams: Vec<ElementaryStream>,
    index: HashMap<u32, usize>,
    tracks: Vec<PageTrack>,
    pending: VecDeque<ogg::Packet>,
}

impl OgmReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| OgmError::file(path, e))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> OgmReader<R> {
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = OgmReader {
            reader: PacketReader::new(inner),
            streams: Vec::new(),
            index: HashMap::new(),
            tracks: Vec::new(),
            pending: VecDeque::new(),
        };

        while let Some(packet) = reader.reader.read_packet()? {
            if !packet.first_in_stream() {
                reader.pending.push_back(packet);
                break;
            }
            let serial = packet.stream_serial();
            if reader.index.contains_key(&serial) {
                return Err(OgmError::MalformedStream(format!(
                    "serial {} starts twice",
                    serial
                )));
            }
            let mut stream = ElementaryStream::from_bos_packet(serial, &packet.data)?;
            stream.number = 1 + reader
                .streams
                .iter()
                .filter(|s| s.kind.letter() == stream.kind.letter())
                .count();
            info!(
                "({}/serial {}) {} stream",
                stream.label(),
                serial,
                stream.kind.name()
            );
            reader.index.insert(serial, reader.streams.len());
            reader.streams.push(stream);
            reader.tracks.push(PageTrack::default());
            reader.pending.push_back(packet);
        }

        Ok(reader)
    }

    /// Streams in the order their first pages appear.
    pub fn streams(&self) -> &[ElementaryStream] {
        &self.streams
    }

    pub fn stream(&self, serial: u32) -> Option<&ElementaryStream> {
        self.index.get(&serial).map(|&i| &self.streams[i])
    }

    pub fn into_streams(self) -> Vec<ElementaryStream> {
        self.streams
    }

    /// Reads every remaining packet until all streams have their header
    /// packets. Returns the packets consumed on the way.
    pub fn read_headers(&mut self) -> Result<Vec<InputPacket>> {
        let mut packets = Vec::new();
        while !self.streams.iter().all(ElementaryStream::headers_complete) {
            match self.next_packet()? {
                Some(packet) => packets.push(packet),
                None => break,
            }
        }
        Ok(packets)
    }

    /// The next packet of a known stream, or `None` at the end of the file.
    pub fn next_packet(&mut self) -> Result<Option<InputPacket>> {
        loop {
            let raw = match self.pending.pop_front() {
                Some(packet) => packet,
                None => match self.reader.read_packet()? {
                    Some(packet) => packet,
                    None => return Ok(None),
                },
            };

            let serial = raw.stream_serial();
            let Some(&i) = self.index.get(&serial) else {
                debug!("packet for unknown serial {}", serial);
                continue;
            };

            let track = &mut self.tracks[i];
            if !track.in_page {
                track.last_granulepos = track.this_granulepos;
                track.this_granulepos = raw.absgp_page() as i64;
            }
            track.in_page = !raw.last_in_page();
            let page_granulepos = track.this_granulepos;
            let previous_page_granulepos = track.last_granulepos;
            let packetno = track.packets;
            track.packets += 1;

            let packet = Packet::from(raw).with_packetno(packetno as i64);
            let stream = &mut self.streams[i];
            let header_index = if packetno < stream.header_count()
                && PageKind::of_packet(packet.flags()).is_header_class()
            {
                Some(packetno)
            } else {
                None
            };

            if header_index.is_some() {
                if PageKind::of_packet(packet.flags()) == PageKind::Comment {
                    match CommentSet::parse(&packet.data) {
                        Ok(comments) => stream.comments = Some(comments),
                        Err(e) => warn!("({}) unreadable comment packet: {}", stream.label(), e),
                    }
                }
                stream.header_packets.push(packet.clone());
            }

            return Ok(Some(InputPacket {
                serial,
                packet,
                page_granulepos,
                previous_page_granulepos,
                header_index,
            }));
        }
    }
}
