//! Splitting an OGM file at video keyframes.
//!
//! The input is read twice. The first pass runs the whole file through the
//! multiplexer without writing anything and records a [`SplitPoint`] at
//! every keyframe of the first video stream. The second pass writes the
//! output files, rolling over at the split point chosen for the size or
//! time budget. Cut mode writes one file per [`Cut`] instead.

use super::chapters::adjust_chapters;
use super::comments::CommentSet;
use super::format_ms;
use super::mux::Multiplexer;
use super::packetizer::{CopyPacketizer, PacketInput, Packetizer};
use super::stream::{frames_in_packet, InputPacket, OgmReader};
use super::PACKET_IS_SYNCPOINT;
use crate::av::{Packet, StreamKind};
use crate::config::Config;
use crate::format::PageSink;
use crate::{OgmError, Result};
use log::{debug, info};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Split size used when no mode is given: 700 MiB.
pub const DEFAULT_SPLIT_SIZE: u64 = 700 * 1024 * 1024;

/// End of an open ended cut, in milliseconds.
const OPEN_CUT_END: f64 = 999_999.0 * 1000.0;

/// End of the chapter window of the last file.
const OPEN_CHAPTER_END: f64 = 9_999_999_999.0;

/// A keyframe of the video stream seen during the first pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    /// Output bytes produced before the keyframe, queued pages included.
    pub pos_bytes: u64,
    /// Time of the keyframe in milliseconds.
    pub pos_time: f64,
    /// Video frame number of the keyframe.
    pub frameno: i64,
}

/// A time range to keep, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    /// Roll over before a file would exceed this many bytes.
    Size(u64),
    /// Roll over once a file covers this many milliseconds.
    Time(f64),
    /// Write one file per cut.
    Cuts(Vec<Cut>),
}

impl Default for SplitMode {
    fn default() -> Self {
        SplitMode::Size(DEFAULT_SPLIT_SIZE)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitOptions {
    pub mode: SplitMode,
    /// Upper bound for the number of files; the last one takes the rest.
    pub max_files: Option<usize>,
}

impl SplitOptions {
    pub fn validate(&self) -> Result<()> {
        if let (SplitMode::Cuts(_), Some(_)) = (&self.mode, self.max_files) {
            return Err(OgmError::InvalidCutOrSplitArgument(
                "a maximum number of files has no effect with cuts".into(),
            ));
        }
        if self.max_files == Some(0) {
            return Err(OgmError::InvalidCutOrSplitArgument(
                "the maximum number of files must be positive".into(),
            ));
        }
        match &self.mode {
            SplitMode::Size(0) => Err(OgmError::InvalidCutOrSplitArgument("split size must be positive".into())),
            SplitMode::Time(t) if *t <= 0.0 => {
                Err(OgmError::InvalidCutOrSplitArgument("split time must be positive".into()))
            }
            SplitMode::Cuts(cuts) => check_cuts(cuts),
            _ => Ok(()),
        }
    }
}

fn invalid(message: impl Into<String>) -> OgmError {
    OgmError::InvalidCutOrSplitArgument(message.into())
}

/// Parses `HH:MM:SS.mmm`, `MM:SS`, or plain seconds into seconds.
pub fn parse_time(s: &str) -> Result<f64> {
    let s = s.trim();
    let (whole, fraction) = match s.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (s, None),
    };
    if let Some(c) = whole.chars().find(|c| *c != ':' && !c.is_ascii_digit()) {
        return Err(invalid(format!("illegal character '{}' in time '{}'", c, s)));
    }
    let parts: Vec<&str> = whole.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid(format!("illegal time '{}'", s)));
    }

    let mut seconds = 0.0;
    for part in parts {
        let value: u64 = if part.is_empty() { 0 } else { part.parse()? };
        seconds = seconds * 60.0 + value as f64;
    }
    if let Some(fraction) = fraction.filter(|f| !f.is_empty()) {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!("illegal fraction in time '{}'", s)));
        }
        seconds += format!("0.{}", fraction).parse::<f64>()?;
    }
    Ok(seconds)
}

/// Parses a split size: a number optionally followed by `MiB`/`MB`
/// (the default unit) or `b` for bytes.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let (number, unit) = s.split_at(digits);
    let unit_size = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "mib" | "mb" => 1024 * 1024,
        "b" => 1,
        _ => return Err(invalid(format!("'{}' is not a valid size", s))),
    };
    let size = number
        .parse::<u64>()
        .map_err(|_| invalid(format!("'{}' is not a valid size", s)))?
        .saturating_mul(unit_size);
    if size == 0 {
        return Err(invalid(format!("'{}' is not a valid size", s)));
    }
    Ok(size)
}

fn check_cuts(cuts: &[Cut]) -> Result<()> {
    if cuts.is_empty() {
        return Err(invalid("no cuts given"));
    }
    let mut last_end = 0.0;
    for cut in cuts {
        if cut.start < last_end || cut.start >= cut.end {
            return Err(invalid("cuts must be in order and not overlapping"));
        }
        last_end = cut.end;
    }
    Ok(())
}

/// Parses a comma separated list of `start-end` or `start+length` cuts.
/// A missing start continues from the previous cut's end, a missing end
/// keeps everything to the end of the file.
pub fn parse_cuts(s: &str) -> Result<Vec<Cut>> {
    let mut cuts = Vec::new();
    let mut last_end = 0.0;
    for item in s.split(',') {
        let (pos, sep) = item
            .find('-')
            .map(|i| (i, '-'))
            .or_else(|| item.find('+').map(|i| (i, '+')))
            .ok_or_else(|| {
                invalid("cuts must be of the form start-end or start+length; either start or end can be omitted")
            })?;
        let (start, rest) = (&item[..pos], &item[pos + 1..]);
        let start = if start.trim().is_empty() {
            last_end
        } else {
            parse_time(start)? * 1000.0
        };
        let end = match (sep, rest.trim().is_empty()) {
            ('-', true) => OPEN_CUT_END,
            ('-', false) => parse_time(rest)? * 1000.0,
            (_, true) => return Err(invalid("a cut of the form start+length needs a length")),
            (_, false) => start + parse_time(rest)? * 1000.0,
        };
        if start < last_end || start >= end {
            return Err(invalid("cuts must be in order and not overlapping"));
        }
        last_end = end;
        cuts.push(Cut { start, end });
    }
    Ok(cuts)
}

/// Splits `name.ext` into the output base and extension; `ogm` if there is
/// no extension.
pub fn output_base(path: &Path) -> (PathBuf, String) {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => (path.with_extension(""), ext.to_string()),
        None => (path.to_path_buf(), "ogm".to_string()),
    }
}

/// Name of the `number`th output file, counting from 1.
pub fn output_name(base: &Path, ext: &str, number: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("-{:06}.{}", number, ext));
    PathBuf::from(name)
}

/// Index of the split point to roll over at next, given the one the
/// current file started at. The chosen point is the last one whose offset
/// still fits into the budget, but never the starting point itself so
/// every file gets at least one keyframe interval.
pub fn find_next_splitpoint(
    points: &[SplitPoint],
    start: usize,
    mode: &SplitMode,
    bytes_written_all: u64,
    current_time: f64,
) -> Option<usize> {
    for i in start + 1..points.len() {
        let beyond = match mode {
            SplitMode::Size(size) => bytes_written_all + size < points[i].pos_bytes,
            SplitMode::Time(time) => current_time + time + 1.0 < points[i].pos_time,
            SplitMode::Cuts(_) => return None,
        };
        if beyond {
            return Some((i - 1).max(start + 1));
        }
    }
    None
}

#[derive(Debug)]
struct SplitStream {
    serial: u32,
    kind: StreamKind,
    rate: f64,
    header_packets: Vec<Packet>,
    comments: Option<CommentSet>,
    eos: bool,
    this_granulepos: i64,
    last_granulepos: i64,
    /// Frames written to the current file (video only).
    granulepos: i64,
    granulepos_sub: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    FindSplitPoints,
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub files: usize,
    pub bytes_written: u64,
}

/// The state of one pass over the input.
struct SplitSession<'a, S: PageSink> {
    pass: Pass,
    mode: &'a SplitMode,
    max_files: usize,
    config: &'a Config,
    mux: Multiplexer<S>,
    streams: Vec<SplitStream>,
    video: usize,
    points: Vec<SplitPoint>,
    next_sp: Option<usize>,
    cut: usize,
    current_time: f64,
    last_split: f64,
    files_opened: usize,
    do_open: bool,
    do_close: bool,
    done: bool,
}

impl<'a, S: PageSink> SplitSession<'a, S> {
    fn new<R: Read + Seek>(
        pass: Pass,
        reader: &OgmReader<R>,
        options: &'a SplitOptions,
        config: &'a Config,
    ) -> Result<Self> {
        let video = reader
            .streams()
            .iter()
            .position(|s| s.kind == StreamKind::Video)
            .ok_or_else(|| OgmError::InvalidInput("found no video stream, not splitting".into()))?;
        let mut mux = Multiplexer::new();
        mux.set_count_only(pass == Pass::FindSplitPoints);
        let streams = reader
            .streams()
            .iter()
            .map(|s| SplitStream {
                serial: s.serial,
                kind: s.kind,
                rate: s.rate,
                header_packets: Vec::new(),
                comments: None,
                eos: false,
                this_granulepos: 0,
                last_granulepos: 0,
                granulepos: 0,
                granulepos_sub: 0.0,
            })
            .collect::<Vec<_>>();
        for s in &streams {
            mux.add(CopyPacketizer::new(s.serial, s.kind, s.rate, config))?;
        }
        Ok(SplitSession {
            pass,
            mode: &options.mode,
            max_files: options.max_files.unwrap_or(usize::MAX),
            config,
            mux,
            streams,
            video,
            points: Vec::new(),
            next_sp: None,
            cut: 0,
            current_time: 0.0,
            last_split: 0.0,
            files_opened: 0,
            do_open: false,
            do_close: false,
            done: false,
        })
    }

    fn cuts(&self) -> Option<&'a [Cut]> {
        match self.mode {
            SplitMode::Cuts(cuts) => Some(cuts),
            _ => None,
        }
    }

    fn current_cut(&self) -> Option<Cut> {
        self.cuts().and_then(|cuts| cuts.get(self.cut).copied())
    }

    fn packetizer(&mut self, serial: u32) -> Result<&mut Packetizer> {
        self.mux
            .packetizer_mut(serial)
            .ok_or_else(|| OgmError::InvalidInput(format!("no stream with serial {}", serial)))
    }

    /// Starts a fresh set of streams on a new output and writes their
    /// header pages, with the video chapters windowed to the new file.
    fn write_stream_headers(&mut self) -> Result<()> {
        let window = match (self.mode, self.current_cut()) {
            (SplitMode::Cuts(_), Some(cut)) => Some((cut.start, cut.end)),
            (SplitMode::Cuts(_), None) => None,
            _ => match self.next_sp {
                Some(sp) if self.files_opened < self.max_files => {
                    Some((self.current_time, self.points[sp].pos_time))
                }
                _ => Some((self.current_time, OPEN_CHAPTER_END)),
            },
        };

        for i in 0..self.streams.len() {
            let stream = &mut self.streams[i];
            stream.eos = false;
            stream.granulepos = 0;
            let (serial, kind, rate) = (stream.serial, stream.kind, stream.rate);
            let mut headers = stream.header_packets.clone();
            if let (StreamKind::Video, Some(comments), Some((start, end))) = (kind, &stream.comments, window) {
                if let Some(packet) = headers.get_mut(1) {
                    let adjusted = adjust_chapters(comments, start, end);
                    *packet = Packet::new(adjusted.to_packet()).with_packetno(1);
                }
            }

            self.mux.replace(CopyPacketizer::new(serial, kind, rate, self.config))?;
            let p = self.packetizer(serial)?;
            for packet in headers {
                p.process(PacketInput::Ogg {
                    packet: packet.with_granulepos(0),
                    page_granulepos: 0,
                })?;
            }
        }
        self.mux.write_header_pages()
    }

    fn open_file<F>(&mut self, create: &mut F) -> Result<()>
    where
        F: FnMut(usize) -> Result<S>,
    {
        self.files_opened += 1;
        let sink = create(self.files_opened)?;
        info!("starting file {}", self.files_opened);
        self.mux.open(sink);
        self.write_stream_headers()
    }

    fn close_file(&mut self, outputs: &mut Vec<S>) -> Result<()> {
        self.produce_eos_packets()?;
        self.mux.finish()?;
        let elapsed = (self.current_time - self.last_split) as i64;
        info!(
            "closing file after writing {} bytes ({} bytes written in all files), {} in this file ({} elapsed)",
            self.mux.bytes_written(),
            self.mux.bytes_written_all(),
            format_ms(elapsed, '.'),
            format_ms(self.current_time as i64, '.')
        );
        if let Some(sink) = self.mux.close()? {
            outputs.push(sink);
        }
        Ok(())
    }

    fn produce_eos_packets(&mut self) -> Result<()> {
        for i in 0..self.streams.len() {
            let stream = &mut self.streams[i];
            if stream.eos {
                continue;
            }
            stream.eos = true;
            let granulepos = match stream.kind {
                StreamKind::Video => (stream.granulepos - 1).max(0),
                _ => stream.this_granulepos - stream.granulepos_sub as i64,
            };
            let serial = stream.serial;
            let packet = Packet::new(vec![0u8]).with_granulepos(granulepos).with_eos(true);
            self.packetizer(serial)?.process(PacketInput::Ogg {
                packet,
                page_granulepos: granulepos,
            })?;
        }
        self.mux.write_all_winner_pages()?;
        Ok(())
    }

    fn handle<F>(&mut self, input: InputPacket, create: &mut F, outputs: &mut Vec<S>) -> Result<()>
    where
        F: FnMut(usize) -> Result<S>,
    {
        let Some(i) = self.streams.iter().position(|s| s.serial == input.serial) else {
            debug!("packet for the unknown serial {}, skipped", input.serial);
            return Ok(());
        };
        {
            let stream = &mut self.streams[i];
            stream.last_granulepos = input.previous_page_granulepos;
            stream.this_granulepos = input.page_granulepos;
        }
        if input.is_header() {
            let stream = &mut self.streams[i];
            if input.header_index == Some(1) && stream.kind == StreamKind::Video {
                stream.comments = CommentSet::parse(&input.packet.data).ok();
            }
            stream.header_packets.push(input.packet);
            return Ok(());
        }

        let mut packet = input.packet;
        let stream = &self.streams[i];
        let (serial, kind) = (stream.serial, stream.kind);
        if packet.granulepos == -1 {
            packet.granulepos = stream.this_granulepos;
        }
        self.current_time = if stream.rate > 0.0 {
            stream.last_granulepos as f64 * 1000.0 / stream.rate
        } else {
            0.0
        };

        let cut = self.current_cut();
        if self.pass == Pass::Split {
            match (self.cuts(), cut) {
                (Some(_), Some(cut)) => {
                    if !self.mux.is_open() && self.current_time == 0.0 && cut.start == 0.0 {
                        self.open_file(create)?;
                    }
                    if self.current_time >= cut.end && self.mux.is_open() {
                        self.do_close = true;
                    }
                }
                (Some(_), None) => {}
                (None, _) => {
                    if !self.mux.is_open() {
                        self.open_file(create)?;
                        self.do_open = false;
                    }
                }
            }
        }

        let syncpoint = packet.flags() & PACKET_IS_SYNCPOINT != 0;
        if kind == StreamKind::Video && syncpoint {
            self.packetizer(serial)?.flush_pages()?;
            match self.pass {
                Pass::FindSplitPoints if i == self.video => {
                    let point = SplitPoint {
                        pos_bytes: self.mux.bytes_written_all() + self.mux.queued_bytes(),
                        pos_time: self.current_time,
                        frameno: self.streams[i].granulepos,
                    };
                    debug!(
                        "split point {}: frameno {}, bytes {}, start {}",
                        self.points.len(),
                        point.frameno,
                        point.pos_bytes,
                        format_ms(point.pos_time as i64, '.')
                    );
                    self.points.push(point);
                }
                Pass::FindSplitPoints => {}
                Pass::Split => match cut {
                    Some(cut) => {
                        if !self.mux.is_open() && self.current_time >= cut.start {
                            self.do_open = true;
                        }
                    }
                    None if self.cuts().is_none() => {
                        if let Some(sp) = self.next_sp {
                            let point = self.points[sp];
                            let reached = match self.mode {
                                SplitMode::Size(_) => {
                                    self.mux.bytes_written_all() + self.mux.queued_bytes() >= point.pos_bytes
                                }
                                SplitMode::Time(_) => self.current_time >= point.pos_time,
                                SplitMode::Cuts(_) => false,
                            };
                            if self.files_opened < self.max_files && reached {
                                self.do_open = true;
                                self.do_close = true;
                            }
                        }
                    }
                    None => {}
                },
            }
        }

        if kind == StreamKind::Video {
            if self.pass == Pass::Split {
                if self.do_close {
                    self.close_file(outputs)?;
                    if self.cuts().is_some() {
                        self.cut += 1;
                        if self.current_cut().is_none() {
                            self.done = true;
                            return Ok(());
                        }
                    }
                }
                if self.do_open {
                    if self.cuts().is_none() {
                        self.next_sp = self.next_sp.and_then(|sp| {
                            find_next_splitpoint(
                                &self.points,
                                sp,
                                self.mode,
                                self.mux.bytes_written_all(),
                                self.current_time,
                            )
                        });
                    }
                    self.open_file(create)?;
                    self.last_split = self.current_time;
                    for stream in &mut self.streams {
                        stream.granulepos_sub = self.current_time * stream.rate / 1000.0;
                    }
                }
            }
            self.do_open = false;
            self.do_close = false;

            let stream = &mut self.streams[i];
            let frames = frames_in_packet(&packet.data) as i64;
            packet.granulepos = stream.granulepos + frames - 1;
            stream.granulepos += frames;
        } else {
            packet.granulepos -= self.streams[i].granulepos_sub as i64;
        }

        if packet.eos {
            self.streams[i].eos = true;
        }
        let write = match (self.cuts(), self.current_cut()) {
            (Some(_), Some(cut)) => self.current_time >= cut.start,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let counting = self.mux.count_only();
        if !write {
            self.mux.set_count_only(true);
        }
        let granulepos = packet.granulepos;
        let p = self.packetizer(serial)?;
        p.process(PacketInput::Ogg {
            packet,
            page_granulepos: granulepos,
        })?;
        if kind.is_text() {
            p.flush_pages()?;
        }
        self.mux.write_all_winner_pages()?;
        self.mux.set_count_only(counting);
        Ok(())
    }

    fn run<R, F>(mut self, reader: &mut OgmReader<R>, mut create: F) -> Result<(Self, Vec<S>)>
    where
        R: Read + Seek,
        F: FnMut(usize) -> Result<S>,
    {
        let mut outputs = Vec::new();
        if self.pass == Pass::FindSplitPoints {
            // Headers still count towards the first file.
            let headers = reader.read_headers()?;
            for input in headers {
                self.handle(input, &mut create, &mut outputs)?;
            }
            self.write_stream_headers()?;
        } else if self.cuts().is_none() {
            self.next_sp = find_next_splitpoint(&self.points, 0, self.mode, 0, 0.0);
        }

        while let Some(input) = reader.next_packet()? {
            self.handle(input, &mut create, &mut outputs)?;
            if self.done {
                return Ok((self, outputs));
            }
        }

        if self.pass == Pass::FindSplitPoints || self.mux.is_open() {
            self.close_file(&mut outputs)?;
        }
        Ok((self, outputs))
    }
}

/// Runs the first pass and returns the split points of the first video
/// stream.
pub fn find_splitpoints<R: Read + Seek>(mut reader: OgmReader<R>, config: &Config) -> Result<Vec<SplitPoint>> {
    let options = SplitOptions::default();
    let session: SplitSession<'_, crate::format::WriteSink<std::io::Sink>> =
        SplitSession::new(Pass::FindSplitPoints, &reader, &options, config)?;
    let (session, _) = session.run(&mut reader, |_| {
        Err(OgmError::InvalidInput("no output while finding split points".into()))
    })?;
    info!("found {} split points", session.points.len());
    Ok(session.points)
}

/// Splits the input. `open` is called once per pass and must return a
/// reader positioned at the start of the file; `create` opens output
/// number `n`, counting from 1. Returns the outputs in order.
pub fn split<R, S, O, F>(
    mut open: O,
    options: &SplitOptions,
    config: &Config,
    create: F,
) -> Result<(Vec<S>, SplitSummary)>
where
    R: Read + Seek,
    S: PageSink,
    O: FnMut() -> Result<OgmReader<R>>,
    F: FnMut(usize) -> Result<S>,
{
    options.validate()?;

    info!("first pass: finding split points");
    let points = find_splitpoints(open()?, config)?;
    if !matches!(options.mode, SplitMode::Cuts(_)) && points.len() <= 1 {
        info!("no split points found, nothing to do");
        return Ok((
            Vec::new(),
            SplitSummary {
                files: 0,
                bytes_written: 0,
            },
        ));
    }

    info!("second pass: splitting the file");
    let mut reader = open()?;
    let mut session = SplitSession::new(Pass::Split, &reader, options, config)?;
    let known: Vec<u32> = session.streams.iter().map(|s| s.serial).collect();
    if let Some(stream) = reader.streams().iter().find(|s| !known.contains(&s.serial)) {
        return Err(OgmError::MalformedStream(format!(
            "stream {} was not seen in the first pass",
            stream.serial
        )));
    }
    session.points = points;
    let (session, outputs) = session.run(&mut reader, create)?;
    let summary = SplitSummary {
        files: outputs.len(),
        bytes_written: session.mux.bytes_written_all(),
    };
    Ok((outputs, summary))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::ogm::stream::tests::{data_packet, pcm_header, video_header};
    use crate::format::tests::MemorySink;
    use ogg::{PacketWriteEndInfo, PacketWriter};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// `frames` video frames at 25 fps with a keyframe every tenth frame,
    /// each followed by 40 ms of 8 kHz PCM. The video stream carries two
    /// chapters.
    pub fn movie(frames: u64) -> Vec<u8> {
        let mut w = PacketWriter::new(Vec::new());
        let page = PacketWriteEndInfo::EndPage;
        w.write_packet(video_header().to_packet().to_vec(), 1, page, 0).unwrap();
        w.write_packet(pcm_header(8000).to_packet().to_vec(), 2, page, 0).unwrap();
        let chapters = CommentSet::from_user(
            "t",
            [
                "CHAPTER01=00:00:00.000",
                "CHAPTER01NAME=Intro",
                "CHAPTER02=00:00:01.000",
                "CHAPTER02NAME=Main",
            ],
        );
        w.write_packet(chapters.to_packet().to_vec(), 1, page, 0).unwrap();
        w.write_packet(CommentSet::new("t").to_packet().to_vec(), 2, page, 0).unwrap();

        for i in 0..frames {
            let last = i + 1 == frames;
            let end = if last { PacketWriteEndInfo::EndStream } else { page };
            let flags = if i % 10 == 0 { PACKET_IS_SYNCPOINT } else { 0 };
            w.write_packet(data_packet(flags | 0x80, 1, &[7; 1000]), 1, end, i).unwrap();
            w.write_packet(data_packet(0x88, 320, &[0; 640]), 2, end, 320 * (i + 1)).unwrap();
        }
        w.into_inner()
    }

    fn open(data: &[u8]) -> impl FnMut() -> Result<OgmReader<Cursor<Vec<u8>>>> + '_ {
        move || OgmReader::new(Cursor::new(data.to_vec()))
    }

    /// Video data packets (payload longer than one byte) of an output.
    fn video_frames(sink: &MemorySink) -> Vec<InputPacket> {
        let mut reader = OgmReader::new(Cursor::new(sink.bytes())).unwrap();
        let mut out = Vec::new();
        while let Some(p) = reader.next_packet().unwrap() {
            if p.serial == 1 && !p.is_header() && p.packet.len() > 1 {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:05:00.000").unwrap(), 300.0);
        assert_eq!(parse_time("300").unwrap(), 300.0);
        assert_eq!(parse_time("1:30").unwrap(), 90.0);
        assert_eq!(parse_time("12.5").unwrap(), 12.5);
        assert!(parse_time("1:2:3:4").is_err());
        assert!(parse_time("1h").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("700").unwrap(), DEFAULT_SPLIT_SIZE);
        assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("1000b").unwrap(), 1000);
        assert!(parse_size("0").is_err());
        assert!(parse_size("10kb").is_err());
    }

    #[test]
    fn test_parse_cuts() {
        assert_eq!(
            parse_cuts("0-60,+30,120-").unwrap(),
            vec![
                Cut { start: 0.0, end: 60_000.0 },
                Cut { start: 60_000.0, end: 90_000.0 },
                Cut { start: 120_000.0, end: OPEN_CUT_END },
            ]
        );
        assert_eq!(parse_cuts("10+5").unwrap(), vec![Cut { start: 10_000.0, end: 15_000.0 }]);
        assert!(parse_cuts("10-20,15-30").is_err());
        assert!(parse_cuts("20-10").is_err());
        assert!(parse_cuts("10+").is_err());
        assert!(parse_cuts("abc").is_err());
    }

    #[test]
    fn test_output_name() {
        let (base, ext) = output_base(Path::new("movie.ogm"));
        assert_eq!(output_name(&base, &ext, 3), PathBuf::from("movie-000003.ogm"));
        let (base, ext) = output_base(Path::new("movie"));
        assert_eq!(output_name(&base, &ext, 12), PathBuf::from("movie-000012.ogm"));
    }

    #[test]
    fn test_rolls_over_before_budget() {
        const MIB: u64 = 1024 * 1024;
        let points: Vec<_> = [2, 6, 9, 11, 15]
            .iter()
            .map(|&m| SplitPoint {
                pos_bytes: m * MIB,
                pos_time: 0.0,
                frameno: 0,
            })
            .collect();
        let mode = SplitMode::Size(10 * MIB);
        assert_eq!(find_next_splitpoint(&points, 0, &mode, 0, 0.0), Some(2));
        assert_eq!(find_next_splitpoint(&points, 2, &mode, 9 * MIB, 0.0), None);
        // A budget below one keyframe interval still moves forward.
        let small = SplitMode::Size(MIB);
        assert_eq!(find_next_splitpoint(&points, 0, &small, 0, 0.0), Some(1));
    }

    #[test]
    fn test_finds_keyframes() {
        let data = movie(50);
        let points = find_splitpoints(OgmReader::new(Cursor::new(data)).unwrap(), &Config::default()).unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points.iter().map(|p| p.frameno).collect::<Vec<_>>(), vec![0, 10, 20, 30, 40]);
        assert_eq!(points[1].pos_time, 360.0);
        assert!(points.windows(2).all(|w| w[0].pos_bytes < w[1].pos_bytes));
    }

    #[test]
    fn test_split_by_time() {
        let data = movie(50);
        let options = SplitOptions {
            mode: SplitMode::Time(500.0),
            max_files: None,
        };
        let (outputs, summary) =
            split(open(&data), &options, &Config::default(), |_| Ok(MemorySink::new())).unwrap();
        assert_eq!(summary.files, 4);
        assert_eq!(outputs.len(), 4);

        let frames: Vec<_> = outputs.iter().map(|sink| video_frames(sink)).collect();
        assert_eq!(frames.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 10, 20]);
        for file in &frames {
            assert!(file[0].packet.flags() & PACKET_IS_SYNCPOINT != 0);
        }

        // Chapters follow each file's window.
        let mut reader = OgmReader::new(Cursor::new(outputs[0].bytes())).unwrap();
        reader.read_headers().unwrap();
        let comments = reader.stream(1).and_then(|s| s.comments.clone()).unwrap();
        assert_eq!(comments.get("CHAPTER01NAME"), Some("Intro"));
        assert_eq!(comments.get("CHAPTER02"), None);
    }

    #[test]
    fn test_split_respects_max_files() {
        let data = movie(50);
        let options = SplitOptions {
            mode: SplitMode::Time(500.0),
            max_files: Some(2),
        };
        let (outputs, _) = split(open(&data), &options, &Config::default(), |_| Ok(MemorySink::new())).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(video_frames(&outputs[1]).len(), 40);
    }

    #[test]
    fn test_split_by_cuts() {
        let data = movie(50);
        let options = SplitOptions {
            mode: SplitMode::Cuts(parse_cuts("0-0.5,1-1.5").unwrap()),
            max_files: None,
        };
        let mut names = Vec::new();
        let (outputs, _) = split(open(&data), &options, &Config::default(), |n| {
            names.push(n);
            Ok(MemorySink::new())
        })
        .unwrap();
        assert_eq!(names, vec![1, 2]);
        assert_eq!(video_frames(&outputs[0]).len(), 14);
        assert_eq!(video_frames(&outputs[1]).len(), 9);
    }

    #[test]
    fn test_invalid_options() {
        let options = SplitOptions {
            mode: SplitMode::Cuts(vec![Cut { start: 0.0, end: 1.0 }]),
            max_files: Some(3),
        };
        assert!(options.validate().is_err());
        assert!(SplitOptions {
            mode: SplitMode::Size(0),
            max_files: None
        }
        .validate()
        .is_err());
    }
}
