//! Concatenation of OGM files whose streams match.
//!
//! The first file fixes the stream layout, serial numbers and comments.
//! Every following file continues the same streams; their granules are
//! shifted by a per stream offset computed when the previous file ends.

use super::mux::Multiplexer;
use super::packetizer::{CopyPacketizer, PacketInput, Packetizer};
use super::stream::{frames_in_packet, ElementaryStream, InputPacket, OgmReader};
use super::PACKET_IS_SYNCPOINT;
use crate::av::{Packet, StreamKind};
use crate::config::Config;
use crate::format::PageSink;
use crate::{OgmError, Result};
use log::{debug, info, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::str::FromStr;

/// How granule offsets are derived when moving to the next file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Add each stream's last granule.
    LastGranule,
    /// Add the granule of each stream's second to last page.
    PreviousGranule,
    /// Derive every non-video offset from the video end plus one frame.
    VideoAfterEnd,
    /// Derive every non-video offset from the video end.
    VideoEnd,
    /// Derive every non-video offset from the start of the last video frame.
    #[default]
    VideoLastFrame,
}

impl SyncMode {
    pub fn index(&self) -> u8 {
        match self {
            SyncMode::LastGranule => 0,
            SyncMode::PreviousGranule => 1,
            SyncMode::VideoAfterEnd => 2,
            SyncMode::VideoEnd => 3,
            SyncMode::VideoLastFrame => 4,
        }
    }

    /// Frames to add to the video frame count when deriving offsets from it.
    fn video_frame_shift(&self) -> i64 {
        match self {
            SyncMode::VideoAfterEnd => 1,
            SyncMode::VideoLastFrame => -1,
            _ => 0,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl FromStr for SyncMode {
    type Err = OgmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(SyncMode::LastGranule),
            "1" => Ok(SyncMode::PreviousGranule),
            "2" => Ok(SyncMode::VideoAfterEnd),
            "3" => Ok(SyncMode::VideoEnd),
            "4" => Ok(SyncMode::VideoLastFrame),
            other => Err(OgmError::InvalidInput(format!(
                "sync mode must be 0..4, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatOptions {
    pub sync_mode: SyncMode,
    /// Refuse files whose stream parameters differ.
    pub safety_checks: bool,
}

impl Default for CatOptions {
    fn default() -> Self {
        CatOptions {
            sync_mode: SyncMode::default(),
            safety_checks: true,
        }
    }
}

/// One input file.
pub struct CatSource<R: Read + Seek> {
    pub name: String,
    pub reader: OgmReader<R>,
    /// Extra offset in milliseconds applied from this file on.
    pub manual_sync_ms: f64,
}

impl CatSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, manual_sync_ms: f64) -> Result<Self> {
        let path = path.as_ref();
        Ok(CatSource {
            name: path.display().to_string(),
            reader: OgmReader::open(path)?,
            manual_sync_ms,
        })
    }
}

impl<R: Read + Seek> CatSource<R> {
    pub fn new(name: impl Into<String>, inner: R, manual_sync_ms: f64) -> Result<Self> {
        Ok(CatSource {
            name: name.into(),
            reader: OgmReader::new(inner)?,
            manual_sync_ms,
        })
    }
}

/// Index of the first file's stream a serial continues. A single stream
/// first file matches any serial, since Ogg audio files usually carry
/// random serial numbers.
fn find_stream(first: &[ElementaryStream], serial: u32) -> Option<usize> {
    if first.len() == 1 {
        return Some(0);
    }
    first.iter().position(|s| s.serial == serial)
}

fn mismatch(safety: bool, message: String) -> Result<()> {
    if safety {
        Err(OgmError::StreamMismatch(message))
    } else {
        warn!("{}", message);
        Ok(())
    }
}

/// Compares the streams of a later file with those of the first one.
pub fn check_streams(
    first_name: &str,
    first: &[ElementaryStream],
    name: &str,
    streams: &[ElementaryStream],
    safety: bool,
) -> Result<()> {
    if streams.is_empty() {
        mismatch(safety, format!("'{}' does not contain any stream", name))?;
    }

    for other in streams {
        let Some(i) = find_stream(first, other.serial) else {
            return Err(OgmError::StreamMismatch(format!(
                "'{}' contains a {} stream (serial {}) that is not present in '{}'",
                name,
                other.kind.name(),
                other.serial,
                first_name
            )));
        };
        let stream = &first[i];
        let prefix = format!(
            "stream parameter mismatch for '{}' and '{}': serial {}",
            first_name, name, other.serial
        );

        if other.kind != stream.kind {
            mismatch(
                safety,
                format!(
                    "{}, type {} != {}",
                    prefix,
                    other.kind.name(),
                    stream.kind.name()
                ),
            )?;
            continue;
        }

        match (other.kind, &other.header, &stream.header) {
            (StreamKind::Vorbis, _, _) => {
                if let (Some(a), Some(b)) = (other.vorbis, stream.vorbis) {
                    if a.rate != b.rate {
                        mismatch(safety, format!("{}, type Vorbis, rate {} != {}", prefix, a.rate, b.rate))?;
                    }
                    if a.channels != b.channels {
                        mismatch(
                            safety,
                            format!("{}, type Vorbis, channels {} != {}", prefix, a.channels, b.channels),
                        )?;
                    }
                }
            }
            (StreamKind::Video, Some(a), Some(b)) => {
                if a.subtype != b.subtype {
                    mismatch(
                        safety,
                        format!("{}, type video, codec {} != {}", prefix, a.subtype_str(), b.subtype_str()),
                    )?;
                }
                if a.time_unit != b.time_unit {
                    mismatch(
                        safety,
                        format!(
                            "{}, type video, fps {:.3} != {:.3}",
                            prefix,
                            a.sample_rate(),
                            b.sample_rate()
                        ),
                    )?;
                }
                if a.width() != b.width() {
                    mismatch(safety, format!("{}, type video, width {} != {}", prefix, a.width(), b.width()))?;
                }
                if a.height() != b.height() {
                    mismatch(
                        safety,
                        format!("{}, type video, height {} != {}", prefix, a.height(), b.height()),
                    )?;
                }
            }
            (StreamKind::Audio, Some(a), Some(b)) => {
                if a.subtype != b.subtype {
                    mismatch(
                        safety,
                        format!("{}, type audio, codec {} != {}", prefix, a.subtype_str(), b.subtype_str()),
                    )?;
                }
                if a.samples_per_unit != b.samples_per_unit {
                    mismatch(
                        safety,
                        format!(
                            "{}, type audio, samples per second {} != {}",
                            prefix, a.samples_per_unit, b.samples_per_unit
                        ),
                    )?;
                }
                if a.bits_per_sample != b.bits_per_sample {
                    mismatch(
                        safety,
                        format!(
                            "{}, type audio, bits per sample {} != {}",
                            prefix, a.bits_per_sample, b.bits_per_sample
                        ),
                    )?;
                }
                if a.channels() != b.channels() {
                    mismatch(
                        safety,
                        format!("{}, type audio, channels {} != {}", prefix, a.channels(), b.channels()),
                    )?;
                }
            }
            (StreamKind::Text, Some(a), Some(b)) => {
                if a.time_unit != b.time_unit {
                    mismatch(
                        safety,
                        format!("{}, type text, time unit {} != {}", prefix, a.time_unit, b.time_unit),
                    )?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Runs [`check_streams`] for every file after the first.
pub fn check_sources<R: Read + Seek>(sources: &[CatSource<R>], safety: bool) -> Result<()> {
    let Some((first, rest)) = sources.split_first() else {
        return Err(OgmError::InvalidInput("no input files".into()));
    };
    for source in rest {
        check_streams(
            &first.name,
            first.reader.streams(),
            &source.name,
            source.reader.streams(),
            safety,
        )?;
    }
    Ok(())
}

/// Per output stream state.
#[derive(Debug)]
struct CatStream {
    serial: u32,
    kind: StreamKind,
    rate: f64,
    eos: bool,
    this_granulepos: i64,
    last_granulepos: i64,
    /// Running frame counter of video streams.
    granulepos: i64,
    /// Offset added to the granules of non-video streams.
    granulepos_add: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatSummary {
    pub sources: usize,
    pub bytes_written: u64,
}

struct Concatenation<S: PageSink> {
    mux: Multiplexer<S>,
    streams: Vec<CatStream>,
    first: Vec<ElementaryStream>,
}

impl<S: PageSink> Concatenation<S> {
    fn packetizer(&mut self, serial: u32) -> Result<&mut Packetizer> {
        self.mux
            .packetizer_mut(serial)
            .ok_or_else(|| OgmError::InvalidInput(format!("no stream with serial {}", serial)))
    }

    fn handle(&mut self, input: InputPacket, first_source: bool, last_source: bool) -> Result<()> {
        let Some(i) = find_stream(&self.first, input.serial) else {
            debug!("packet for the unknown serial {}, skipped", input.serial);
            return Ok(());
        };
        {
            let stream = &mut self.streams[i];
            stream.last_granulepos = input.previous_page_granulepos;
            stream.this_granulepos = input.page_granulepos;
        }
        if input.is_header() {
            if first_source {
                let serial = self.streams[i].serial;
                let packet = input.packet.with_granulepos(0);
                self.packetizer(serial)?.process(PacketInput::Ogg {
                    packet,
                    page_granulepos: 0,
                })?;
            }
            return Ok(());
        }

        let stream = &mut self.streams[i];
        if stream.eos {
            return Ok(());
        }
        let mut packet = input.packet;
        if packet.eos && last_source {
            stream.eos = true;
        } else if packet.eos && packet.len() <= 1 {
            return Ok(());
        } else {
            packet.eos = false;
        }
        if packet.granulepos == -1 {
            packet.granulepos = stream.this_granulepos;
        }

        let serial = stream.serial;
        let kind = stream.kind;
        let syncpoint = packet.flags() & PACKET_IS_SYNCPOINT != 0;
        if kind == StreamKind::Video {
            let frames = frames_in_packet(&packet.data) as i64;
            packet.granulepos = stream.granulepos + frames - 1;
            stream.granulepos += frames;
        } else {
            packet.granulepos += stream.granulepos_add;
        }

        let granulepos = packet.granulepos;
        let p = self.packetizer(serial)?;
        if kind == StreamKind::Video && syncpoint {
            p.flush_pages()?;
        }
        p.process(PacketInput::Ogg {
            packet,
            page_granulepos: granulepos,
        })?;
        if kind.is_text() {
            p.flush_pages()?;
        }
        Ok(())
    }

    /// Recomputes the granule offsets before the next file starts.
    fn advance(&mut self, sync_mode: SyncMode, manual_sync_ms: f64) {
        let video = self
            .streams
            .iter()
            .find(|s| s.kind == StreamKind::Video)
            .map(|v| (v.granulepos, v.rate));

        for stream in &mut self.streams {
            match (video, sync_mode) {
                (None, _) | (_, SyncMode::LastGranule) => {
                    stream.granulepos_add += stream.this_granulepos;
                }
                (_, SyncMode::PreviousGranule) => {
                    stream.granulepos_add += stream.last_granulepos;
                }
                (Some((frames, fps)), mode) => {
                    if stream.kind != StreamKind::Video && fps > 0.0 {
                        let vtime = (frames + mode.video_frame_shift()) as f64 * 1000.0 / fps;
                        stream.granulepos_add = (vtime * stream.rate / 1000.0) as i64;
                    }
                }
            }
            let manual = (manual_sync_ms * stream.rate / 1000.0) as i64;
            stream.granulepos_add += manual;
            debug!(
                "stream {}, type {}, current granulepos {}, granulepos offset {} (manual sync {})",
                stream.serial,
                stream.kind.name(),
                stream.this_granulepos,
                stream.granulepos_add,
                manual
            );
        }
    }

    /// Ends every stream still open with a one byte packet.
    fn produce_eos_packets(&mut self) -> Result<()> {
        for i in 0..self.streams.len() {
            let stream = &mut self.streams[i];
            if stream.eos {
                continue;
            }
            stream.eos = true;
            let granulepos = match stream.kind {
                StreamKind::Video => (stream.granulepos - 1).max(0),
                _ => stream.this_granulepos + stream.granulepos_add,
            };
            let serial = stream.serial;
            let packet = Packet::new(vec![0u8])
                .with_granulepos(granulepos)
                .with_eos(true);
            self.packetizer(serial)?.process(PacketInput::Ogg {
                packet,
                page_granulepos: granulepos,
            })?;
        }
        self.mux.write_all_winner_pages()?;
        Ok(())
    }
}

/// Concatenates the sources into `sink`.
///
/// Header packets come from the first file only. Files after the first
/// must carry the same streams; see [`check_streams`].
pub fn concatenate<R: Read + Seek, S: PageSink>(
    sources: Vec<CatSource<R>>,
    sink: S,
    options: &CatOptions,
    config: &Config,
) -> Result<(S, CatSummary)> {
    check_sources(&sources, options.safety_checks)?;

    let first = sources[0].reader.streams().to_vec();
    if options.sync_mode == SyncMode::PreviousGranule && !first.iter().any(|s| s.kind == StreamKind::Video) {
        return Err(OgmError::InvalidInput(format!(
            "sync mode {} only works if the source files contain at least one video stream",
            options.sync_mode
        )));
    }
    let mut cat = Concatenation {
        mux: Multiplexer::with_sink(sink),
        streams: Vec::with_capacity(first.len()),
        first,
    };
    for s in &cat.first {
        cat.mux.add(CopyPacketizer::new(s.serial, s.kind, s.rate, config))?;
        cat.streams.push(CatStream {
            serial: s.serial,
            kind: s.kind,
            rate: s.rate,
            eos: false,
            this_granulepos: 0,
            last_granulepos: 0,
            granulepos: 0,
            granulepos_add: 0,
        });
    }

    let count = sources.len();
    let manual_syncs: Vec<f64> = sources.iter().map(|s| s.manual_sync_ms).collect();
    for (n, mut source) in sources.into_iter().enumerate() {
        info!("processing input file '{}'", source.name);
        let first_source = n == 0;
        let last_source = n + 1 == count;

        if first_source {
            let (headers, data): (Vec<_>, Vec<_>) = source
                .reader
                .read_headers()?
                .into_iter()
                .partition(InputPacket::is_header);
            for input in headers {
                cat.handle(input, true, last_source)?;
            }
            cat.mux.write_header_pages()?;
            for input in data {
                cat.handle(input, true, last_source)?;
                cat.mux.write_all_winner_pages()?;
            }
        }

        while let Some(input) = source.reader.next_packet()? {
            cat.handle(input, first_source, last_source)?;
            cat.mux.write_all_winner_pages()?;
        }

        if !last_source {
            cat.advance(options.sync_mode, manual_syncs[n + 1]);
        }
    }

    cat.produce_eos_packets()?;
    cat.mux.finish()?;
    let summary = CatSummary {
        sources: count,
        bytes_written: cat.mux.bytes_written_all(),
    };
    info!("{} files, {} bytes written", summary.sources, summary.bytes_written);
    let sink = cat
        .mux
        .close()?
        .ok_or_else(|| OgmError::InvalidInput("output closed early".into()))?;
    Ok((sink, summary))
}
