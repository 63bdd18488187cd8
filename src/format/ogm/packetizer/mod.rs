//! Per elementary stream packetizers.
//!
//! Every packetizer turns raw input (PCM bytes, compressed frames, subtitle
//! cues, already framed Ogg packets) into OGM packets and queues them as
//! pages. The set of kinds is closed, so they are held in the [`Packetizer`]
//! enum and dispatched by `match`.

mod ac3;
mod audio;
mod copy;
mod index;
mod mp3;
mod pcm;
mod textsubs;
mod video;
mod vobsub;
mod vorbis;

pub use ac3::Ac3Packetizer;
pub use copy::CopyPacketizer;
pub use index::{IndexEntry, IndexPacketizer};
pub use mp3::Mp3Packetizer;
pub use pcm::{PcmPacketizer, PcmParams};
pub use textsubs::TextSubsPacketizer;
pub use video::{VideoPacketizer, VideoParams};
pub use vobsub::VobsubPacketizer;
pub use vorbis::VorbisPacketizer;

use super::clock::StampClock;
use super::comments::CommentSet;
use super::header::StreamHeader;
use super::page::{Page, PageKind};
use super::queue::Queue;
use crate::av::{Packet, StreamKind};
use crate::config::Config;
use crate::{OgmError, Result};

/// Outcome of a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The packetizer wants more input.
    MoreData,
    /// The stream has ended; further input is ignored.
    Finished,
}

/// Audio/video synchronization applied to a stream: a millisecond offset
/// followed by a linear drift factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSync {
    pub displacement: i64,
    pub linear: f64,
}

impl Default for AudioSync {
    fn default() -> Self {
        AudioSync {
            displacement: 0,
            linear: 1.0,
        }
    }
}

impl AudioSync {
    pub fn new(displacement: i64, linear: f64) -> Self {
        AudioSync {
            displacement,
            linear,
        }
    }
}

/// The part of the input to keep, in seconds. An `end` of zero means "until
/// the end of the input".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub start: f64,
    pub end: f64,
}

impl Range {
    pub fn new(start: f64, end: f64) -> Self {
        Range { start, end }
    }

    /// The same range in another unit.
    pub fn scaled(&self, factor: f64) -> Range {
        Range {
            start: self.start * factor,
            end: self.end * factor,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == 0.0
    }
}

/// Input handed to [`Packetizer::process`].
#[derive(Debug, Clone)]
pub enum PacketInput<'a> {
    /// A chunk of a byte stream (PCM samples or MP3/AC3 frames).
    Bytes { data: &'a [u8], last: bool },
    /// One or more video frames.
    Frame {
        data: &'a [u8],
        num_frames: u32,
        key: bool,
        last: bool,
    },
    /// A subtitle cue with times in milliseconds.
    Cue {
        start: i64,
        end: i64,
        data: &'a [u8],
        last: bool,
    },
    /// Seek table entries.
    Index(&'a [IndexEntry]),
    /// A packet read from an Ogg stream, with the granule of the page it
    /// ended on for packets that carry none.
    Ogg { packet: Packet, page_granulepos: i64 },
}

impl PacketInput<'_> {
    fn name(&self) -> &'static str {
        match self {
            PacketInput::Bytes { .. } => "byte chunk",
            PacketInput::Frame { .. } => "video frame",
            PacketInput::Cue { .. } => "subtitle cue",
            PacketInput::Index(_) => "index entries",
            PacketInput::Ogg { .. } => "Ogg packet",
        }
    }
}

pub(crate) fn unexpected_input(kind: &str, input: &PacketInput<'_>) -> OgmError {
    OgmError::InvalidInput(format!("{} packetizer cannot take a {}", kind, input.name()))
}

/// State every packetizer shares: stream identity, packet counters, sync
/// parameters and the page queue.
pub struct PacketizerCore {
    pub(crate) serial: u32,
    pub(crate) packetno: i64,
    pub(crate) last_granulepos: i64,
    pub(crate) sync: AudioSync,
    pub(crate) range: Range,
    pub(crate) comments: CommentSet,
    pub(crate) queue: Queue,
}

impl PacketizerCore {
    pub(crate) fn new(
        serial: u32,
        clock: StampClock,
        config: &Config,
        sync: AudioSync,
        range: Range,
        comments: CommentSet,
    ) -> Self {
        PacketizerCore {
            serial,
            packetno: 0,
            last_granulepos: 0,
            sync,
            range,
            comments,
            queue: Queue::new(serial, clock).with_max_queued_bytes(config.max_queued_bytes),
        }
    }

    /// Queues the stream header as the first packet and flushes it onto its
    /// own page.
    pub(crate) fn submit_stream_header(&mut self, header: &StreamHeader) -> Result<()> {
        self.submit_header_packet(Packet::new(header.to_packet()), PageKind::Header)
    }

    /// Queues a comment packet and flushes it onto its own page.
    pub(crate) fn submit_comments(&mut self, comments: &CommentSet) -> Result<()> {
        self.submit_header_packet(Packet::new(comments.to_packet()), PageKind::Comment)
    }

    pub(crate) fn submit_header_packet(&mut self, packet: Packet, kind: PageKind) -> Result<()> {
        let packet = packet
            .with_granulepos(0)
            .with_packetno(self.packetno)
            .with_bos(kind == PageKind::Header);
        self.queue.add_packet(packet)?;
        self.packetno += 1;
        self.queue.flush_pages(kind)?;
        Ok(())
    }

    /// Queues a data packet numbered with the current packet number.
    pub(crate) fn submit(&mut self, packet: Packet) -> Result<()> {
        log::trace!(
            "stream {}: packet {} with {} bytes, granule {}{}",
            self.serial,
            self.packetno,
            packet.len(),
            packet.granulepos,
            if packet.eos { " (eos)" } else { "" }
        );
        self.queue.add_packet(packet.with_packetno(self.packetno))
    }
}

/// One packetizer per output stream.
pub enum Packetizer {
    Video(VideoPacketizer),
    Pcm(PcmPacketizer),
    Mp3(Mp3Packetizer),
    Ac3(Ac3Packetizer),
    TextSubs(TextSubsPacketizer),
    Vobsub(VobsubPacketizer),
    Index(IndexPacketizer),
    Vorbis(VorbisPacketizer),
    Copy(CopyPacketizer),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Packetizer::Video($p) => $body,
            Packetizer::Pcm($p) => $body,
            Packetizer::Mp3($p) => $body,
            Packetizer::Ac3($p) => $body,
            Packetizer::TextSubs($p) => $body,
            Packetizer::Vobsub($p) => $body,
            Packetizer::Index($p) => $body,
            Packetizer::Vorbis($p) => $body,
            Packetizer::Copy($p) => $body,
        }
    };
}

impl Packetizer {
    fn core(&self) -> &PacketizerCore {
        dispatch!(self, p => &p.core)
    }

    fn core_mut(&mut self) -> &mut PacketizerCore {
        dispatch!(self, p => &mut p.core)
    }

    /// Feeds input to the packetizer.
    pub fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        dispatch!(self, p => p.process(input))
    }

    /// Queues the header packets. Most packetizers also do this on their
    /// first `process` call.
    pub fn produce_header_packets(&mut self) -> Result<()> {
        dispatch!(self, p => p.produce_header_packets())
    }

    /// Ends the stream if it has not ended yet.
    pub fn produce_eos_packet(&mut self) -> Result<()> {
        dispatch!(self, p => p.produce_eos_packet())
    }

    /// Presentation timestamp in microseconds for a page ending at
    /// `granulepos`. Advances the stream's timestamp state.
    pub fn make_timestamp(&mut self, granulepos: i64) -> i64 {
        self.core_mut().queue.clock_mut().stamp(granulepos)
    }

    /// Drops buffered input and queued pages.
    pub fn reset(&mut self) {
        dispatch!(self, p => p.reset())
    }

    pub fn serial(&self) -> u32 {
        self.core().serial
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            Packetizer::Video(_) => StreamKind::Video,
            Packetizer::Pcm(_) | Packetizer::Mp3(_) | Packetizer::Ac3(_) => StreamKind::Audio,
            Packetizer::TextSubs(_) => StreamKind::Text,
            Packetizer::Vobsub(_) => StreamKind::Image,
            Packetizer::Index(_) => StreamKind::Index,
            Packetizer::Vorbis(_) => StreamKind::Vorbis,
            Packetizer::Copy(p) => p.kind(),
        }
    }

    /// True once the end-of-stream packet has been queued.
    pub fn ended(&self) -> bool {
        self.core().queue.ended()
    }

    pub fn flush_pages(&mut self) -> Result<usize> {
        self.core_mut().queue.flush_pages(PageKind::Data)
    }

    pub fn queue_pages(&mut self) -> Result<usize> {
        self.core_mut().queue.queue_pages(PageKind::Data)
    }

    pub fn page_available(&self) -> bool {
        self.core().queue.page_available()
    }

    pub fn header_page_available(&self) -> bool {
        self.core().queue.any_header_page_available()
    }

    pub fn get_page(&mut self) -> Option<Page> {
        self.core_mut().queue.pop_next()
    }

    pub fn get_header_page(&mut self, kind: PageKind) -> Option<Page> {
        self.core_mut().queue.pop_header_class(kind)
    }

    pub fn smallest_timestamp(&self) -> i64 {
        self.core().queue.smallest_timestamp()
    }

    pub fn queued_bytes(&self) -> usize {
        self.core().queue.queued_bytes()
    }

    /// Replaces the comments sent in the comment header.
    pub fn set_comments(&mut self, comments: CommentSet) {
        self.core_mut().comments = comments;
    }
}

macro_rules! impl_from_packetizer {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Packetizer {
                fn from(p: $ty) -> Self {
                    Packetizer::$variant(p)
                }
            }
        )*
    };
}

impl_from_packetizer!(
    Video(VideoPacketizer),
    Pcm(PcmPacketizer),
    Mp3(Mp3Packetizer),
    Ac3(Ac3Packetizer),
    TextSubs(TextSubsPacketizer),
    Vobsub(VobsubPacketizer),
    Index(IndexPacketizer),
    Vorbis(VorbisPacketizer),
    Copy(CopyPacketizer),
);
