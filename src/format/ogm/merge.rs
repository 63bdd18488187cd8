//! Readers that turn source files into packetizer input, and the session
//! that interleaves them into a new file.
//!
//! Every input owns one output stream. [`open_input`] probes the file type
//! and builds the matching reader and packetizer; [`MuxSession`] drives all
//! readers until each packetizer has a page waiting, then lets the
//! multiplexer write the pages in timestamp order.

use super::comments::CommentSet;
use super::mux::Multiplexer;
use super::packetizer::{
    Ac3Packetizer, AudioSync, Mp3Packetizer, PacketInput, Packetizer, PcmPacketizer, PcmParams,
    ProcessStatus, Range, TextSubsPacketizer, VorbisPacketizer,
};
use super::stream::OgmReader;
use super::subtitles::{parse_srt, probe_srt, Subtitles};
use crate::av::StreamKind;
use crate::codec::{ac3, mp3};
use crate::config::Config;
use crate::format::PageSink;
use crate::{OgmError, Result};
use bytes::Buf;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read from compressed audio inputs per call.
const READ_CHUNK: usize = 4096;

/// Bytes looked at when probing the input type.
const PROBE_SIZE: usize = 4096;

/// Per input settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    pub sync: AudioSync,
    /// Seconds of the input to keep.
    pub range: Range,
    /// `TAG=value` comments for the stream.
    pub comments: Vec<String>,
}

impl InputOptions {
    pub fn comment_set(&self, vendor: &str) -> CommentSet {
        CommentSet::from_user(vendor, &self.comments)
    }
}

/// Source file types ogmmerge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    OggVorbis,
    Wav,
    Srt,
    Ac3,
    Mp3,
}

impl InputType {
    /// Guesses the type from the first bytes of a file.
    pub fn probe(head: &[u8]) -> Option<InputType> {
        if head.starts_with(b"OggS") {
            return Some(InputType::OggVorbis);
        }
        if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WAVE" {
            return Some(InputType::Wav);
        }
        if let Ok(text) = std::str::from_utf8(head) {
            if probe_srt(text) {
                return Some(InputType::Srt);
            }
        }
        if matches!(ac3::find_header(head), Some((0, _))) {
            return Some(InputType::Ac3);
        }
        if head.starts_with(b"ID3") || matches!(mp3::find_header(head), Some((0, _))) {
            return Some(InputType::Mp3);
        }
        None
    }
}

/// Source of packetizer input.
pub trait InputReader {
    /// Feeds input that must reach the packetizer before the file headers
    /// are written.
    fn prime(&mut self, _packetizer: &mut Packetizer) -> Result<()> {
        Ok(())
    }

    /// Feeds the next piece of input. `Finished` means the input is
    /// exhausted.
    fn read(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus>;
}

/// Reads up to `size` bytes, fewer only at the end of the input.
fn read_chunk<R: Read>(inner: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(size);
    inner.by_ref().take(size as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// PCM samples from a RIFF WAVE file.
pub struct WavReader<R: Read> {
    inner: R,
    params: PcmParams,
    remaining: u64,
    chunk: usize,
}

impl<R: Read> WavReader<R> {
    /// Reads the RIFF header up to the start of the sample data.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut riff = [0u8; 12];
        inner.read_exact(&mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(OgmError::InvalidInput("not a RIFF WAVE file".into()));
        }

        let mut params = None;
        loop {
            let mut chunk = [0u8; 8];
            inner.read_exact(&mut chunk).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    OgmError::InvalidInput("WAVE file without a data chunk".into())
                }
                _ => OgmError::Io(e),
            })?;
            let mut len_bytes = &chunk[4..8];
            let len = len_bytes.get_u32_le();

            match &chunk[0..4] {
                b"fmt " => {
                    let fmt = read_chunk(&mut inner, len as usize + (len as usize & 1))?;
                    if fmt.len() < 16 {
                        return Err(OgmError::InvalidInput("WAVE format chunk is truncated".into()));
                    }
                    let mut fmt = &fmt[..];
                    let format_tag = fmt.get_u16_le();
                    if format_tag != 0x0001 && format_tag != 0xFFFE {
                        return Err(OgmError::InvalidInput(format!(
                            "WAVE format 0x{:04x} is not PCM",
                            format_tag
                        )));
                    }
                    let channels = fmt.get_u16_le();
                    let sample_rate = fmt.get_u32_le();
                    fmt.advance(6);
                    let bits_per_sample = fmt.get_u16_le();
                    params = Some(PcmParams {
                        sample_rate,
                        channels,
                        bits_per_sample,
                    });
                }
                b"data" => {
                    let params = params.ok_or_else(|| {
                        OgmError::InvalidInput("WAVE data chunk before the format chunk".into())
                    })?;
                    // Streamed files leave the length at zero or all ones.
                    let remaining = match len {
                        0 | u32::MAX => u64::MAX,
                        len => len as u64,
                    };
                    let block_align = params.block_align().max(1);
                    let chunk = (params.bytes_per_second() / block_align * block_align).max(block_align);
                    debug!(
                        "WAVE: {} Hz, {} channels, {} bits, {} data bytes",
                        params.sample_rate, params.channels, params.bits_per_sample, len
                    );
                    return Ok(WavReader {
                        inner,
                        params,
                        remaining,
                        chunk,
                    });
                }
                _ => {
                    let skip = len as u64 + (len as u64 & 1);
                    io::copy(&mut inner.by_ref().take(skip), &mut io::sink())?;
                }
            }
        }
    }

    pub fn params(&self) -> PcmParams {
        self.params
    }
}

impl<R: Read> InputReader for WavReader<R> {
    fn read(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus> {
        let want = self.remaining.min(self.chunk as u64) as usize;
        let data = read_chunk(&mut self.inner, want)?;
        self.remaining -= data.len() as u64;
        let last = self.remaining == 0 || data.len() < want;
        packetizer.process(PacketInput::Bytes { data: &data, last })?;
        Ok(if last {
            ProcessStatus::Finished
        } else {
            ProcessStatus::MoreData
        })
    }
}

/// A plain stream of MP3 or AC3 frames.
pub struct FrameReader<R: Read> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let pending = read_chunk(&mut inner, READ_CHUNK)?;
        Ok(FrameReader { inner, pending })
    }
}

impl<R: Read> InputReader for FrameReader<R> {
    fn read(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus> {
        let following = read_chunk(&mut self.inner, READ_CHUNK)?;
        let last = following.is_empty();
        let data = std::mem::replace(&mut self.pending, following);
        packetizer.process(PacketInput::Bytes { data: &data, last })?;
        Ok(if last {
            ProcessStatus::Finished
        } else {
            ProcessStatus::MoreData
        })
    }
}

/// SRT subtitles, handed over in one go.
pub struct SrtReader {
    subtitles: Subtitles,
}

impl SrtReader {
    pub fn new(text: &str) -> Result<Self> {
        let mut subtitles = parse_srt(text)?;
        if !subtitles.check() {
            warn!("SRT input has entries that begin after they end");
        }
        Ok(SrtReader { subtitles })
    }
}

impl InputReader for SrtReader {
    fn read(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus> {
        if self.subtitles.is_empty() {
            packetizer.produce_eos_packet()?;
            return Ok(ProcessStatus::Finished);
        }
        self.subtitles.process(packetizer)?;
        Ok(ProcessStatus::Finished)
    }
}

/// The first Vorbis stream of an Ogg file.
pub struct VorbisReader<R: Read + Seek> {
    reader: OgmReader<R>,
    serial: u32,
}

impl<R: Read + Seek> VorbisReader<R> {
    pub fn new(inner: R) -> Result<Self> {
        let reader = OgmReader::new(inner)?;
        let serial = reader
            .streams()
            .iter()
            .find(|s| s.kind == StreamKind::Vorbis)
            .map(|s| s.serial)
            .ok_or_else(|| OgmError::InvalidInput("no Vorbis stream in the Ogg file".into()))?;
        if reader.streams().len() > 1 {
            info!("using the first Vorbis stream (serial {}) only", serial);
        }
        Ok(VorbisReader { reader, serial })
    }

    fn feed_next(&mut self, packetizer: &mut Packetizer) -> Result<Option<ProcessStatus>> {
        while let Some(input) = self.reader.next_packet()? {
            if input.serial != self.serial {
                continue;
            }
            let status = packetizer.process(PacketInput::Ogg {
                packet: input.packet,
                page_granulepos: input.page_granulepos,
            })?;
            return Ok(Some(status));
        }
        Ok(None)
    }
}

impl<R: Read + Seek> InputReader for VorbisReader<R> {
    fn prime(&mut self, packetizer: &mut Packetizer) -> Result<()> {
        for _ in 0..3 {
            if self.feed_next(packetizer)?.is_none() {
                return Err(OgmError::MalformedStream(
                    "Vorbis stream ends inside its headers".into(),
                ));
            }
        }
        Ok(())
    }

    fn read(&mut self, packetizer: &mut Packetizer) -> Result<ProcessStatus> {
        match self.feed_next(packetizer)? {
            Some(status) => Ok(status),
            None => {
                packetizer.produce_eos_packet()?;
                Ok(ProcessStatus::Finished)
            }
        }
    }
}

/// A reader paired with the packetizer it feeds.
pub struct Input {
    pub reader: Box<dyn InputReader>,
    pub packetizer: Packetizer,
}

impl Input {
    /// Builds the reader and packetizer for an input of a known type.
    pub fn from_reader<R: Read + Seek + 'static>(
        mut inner: R,
        input_type: InputType,
        serial: u32,
        options: &InputOptions,
        config: &Config,
    ) -> Result<Input> {
        let comments = options.comment_set(&config.vendor);
        let (reader, packetizer): (Box<dyn InputReader>, Packetizer) = match input_type {
            InputType::Wav => {
                let reader = WavReader::new(inner)?;
                let p = PcmPacketizer::new(serial, reader.params(), options.sync, options.range, comments, config)?;
                (Box::new(reader), p.into())
            }
            InputType::Mp3 | InputType::Ac3 => {
                let reader = FrameReader::new(inner)?;
                let p: Packetizer = if input_type == InputType::Mp3 {
                    let (_, header) = mp3::find_header(&reader.pending)
                        .ok_or_else(|| OgmError::InvalidInput("no MPEG audio frame found".into()))?;
                    Mp3Packetizer::new(serial, header, options.sync, comments, config)?.into()
                } else {
                    let (_, header) = ac3::find_header(&reader.pending)
                        .ok_or_else(|| OgmError::InvalidInput("no AC3 frame found".into()))?;
                    Ac3Packetizer::new(serial, header, options.sync, comments, config)?.into()
                };
                (Box::new(reader), p)
            }
            InputType::Srt => {
                let mut text = String::new();
                inner.read_to_string(&mut text)?;
                let reader = SrtReader::new(&text)?;
                let p = TextSubsPacketizer::new(serial, options.sync, options.range, comments, config)?;
                (Box::new(reader), p.into())
            }
            InputType::OggVorbis => {
                inner.seek(SeekFrom::Start(0))?;
                let reader = VorbisReader::new(inner)?;
                let p = VorbisPacketizer::new(serial, options.sync, options.range, comments, config)?;
                (Box::new(reader), p.into())
            }
        };
        Ok(Input { reader, packetizer })
    }
}

/// Opens a source file, probing its type.
pub fn open_input(
    path: impl AsRef<Path>,
    serial: u32,
    options: &InputOptions,
    config: &Config,
) -> Result<Input> {
    let path = path.as_ref();
    let mut file = BufReader::new(File::open(path).map_err(|e| OgmError::file(path, e))?);
    let head = read_chunk(&mut file, PROBE_SIZE).map_err(|e| match e {
        OgmError::Io(e) => OgmError::file(path, e),
        other => other,
    })?;
    let input_type = InputType::probe(&head).ok_or_else(|| {
        OgmError::InvalidInput(format!("{}: unknown file type", path.display()))
    })?;
    file.seek(SeekFrom::Start(0))?;
    info!("{}: {:?} input, serial {}", path.display(), input_type, serial);
    Input::from_reader(file, input_type, serial, options, config)
}

/// Totals reported after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub streams: usize,
    pub bytes_written: u64,
}

/// Interleaves several inputs into one output.
pub struct MuxSession<S: PageSink> {
    mux: Multiplexer<S>,
    readers: Vec<(u32, Box<dyn InputReader>)>,
}

impl<S: PageSink> MuxSession<S> {
    pub fn new(sink: S) -> Self {
        MuxSession {
            mux: Multiplexer::with_sink(sink),
            readers: Vec::new(),
        }
    }

    /// Serial number for the next input.
    pub fn next_serial(&mut self) -> u32 {
        self.mux.next_serial()
    }

    pub fn add(&mut self, input: Input) -> Result<u32> {
        let serial = self.mux.add(input.packetizer)?;
        self.readers.push((serial, input.reader));
        Ok(serial)
    }

    pub fn packetizer_mut(&mut self, serial: u32) -> Option<&mut Packetizer> {
        self.mux.packetizer_mut(serial)
    }

    /// Reads every input to the end and returns the sink.
    pub fn run(mut self) -> Result<(S, MergeSummary)> {
        if self.readers.is_empty() {
            return Err(OgmError::InvalidInput("no inputs".into()));
        }

        for (serial, reader) in &mut self.readers {
            let packetizer = packetizer_of(&mut self.mux, *serial)?;
            reader.prime(packetizer)?;
        }
        self.mux.write_header_pages()?;

        let mut done = vec![false; self.readers.len()];
        while done.iter().any(|d| !d) {
            for (i, (serial, reader)) in self.readers.iter_mut().enumerate() {
                if done[i] {
                    continue;
                }
                let packetizer = packetizer_of(&mut self.mux, *serial)?;
                while !packetizer.page_available() && !packetizer.ended() {
                    if reader.read(packetizer)? == ProcessStatus::Finished {
                        done[i] = true;
                        break;
                    }
                }
                if done[i] || packetizer.ended() {
                    done[i] = true;
                    packetizer.produce_eos_packet()?;
                }
            }
            self.mux.write_all_winner_pages()?;
        }

        self.mux.finish()?;
        let summary = MergeSummary {
            streams: self.mux.len(),
            bytes_written: self.mux.bytes_written_all(),
        };
        info!("{} streams, {} bytes written", summary.streams, summary.bytes_written);
        let sink = self
            .mux
            .close()?
            .ok_or_else(|| OgmError::InvalidInput("output closed early".into()))?;
        Ok((sink, summary))
    }
}

fn packetizer_of<S: PageSink>(mux: &mut Multiplexer<S>, serial: u32) -> Result<&mut Packetizer> {
    mux.packetizer_mut(serial)
        .ok_or_else(|| OgmError::InvalidInput(format!("no stream with serial {}", serial)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::mp3::tests::mp3_frame;
    use crate::codec::vorbis::tests::id_header;
    use crate::format::ogm::header::StreamHeader;
    use crate::format::ogm::page::PageKind;
    use crate::format::tests::MemorySink;
    use crate::format::WriteSink;
    use ogg::{PacketWriteEndInfo, PacketWriter};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// A mono 16 bit WAVE file with a LIST chunk before the samples.
    pub fn wav_file(rate: u32, samples: usize) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((4 + 24 + 12 + 8 + data_len) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"LIST");
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(b"INFO");
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        out.extend((0..samples).flat_map(|i| (i as i16).to_le_bytes()));
        out
    }

    pub fn vorbis_file() -> Vec<u8> {
        let mut w = PacketWriter::new(Vec::new());
        let end = PacketWriteEndInfo::EndPage;
        w.write_packet(id_header(1, 8000), 9, end, 0).unwrap();
        w.write_packet(CommentSet::new("enc").to_packet().to_vec(), 9, end, 0).unwrap();
        w.write_packet(b"\x05vorbis-setup".to_vec(), 9, end, 0).unwrap();
        w.write_packet(vec![1u8; 30], 9, end, 4000).unwrap();
        w.write_packet(vec![2u8; 30], 9, PacketWriteEndInfo::EndStream, 8000).unwrap();
        w.into_inner()
    }

    fn input(data: Vec<u8>, serial: u32, options: &InputOptions) -> Input {
        let input_type = InputType::probe(&data).unwrap();
        Input::from_reader(Cursor::new(data), input_type, serial, options, &Config::default()).unwrap()
    }

    #[test]
    fn test_probe() {
        assert_eq!(InputType::probe(&wav_file(8000, 10)), Some(InputType::Wav));
        assert_eq!(InputType::probe(&vorbis_file()), Some(InputType::OggVorbis));
        assert_eq!(InputType::probe(&mp3_frame(false)), Some(InputType::Mp3));
        assert_eq!(
            InputType::probe(b"1\n00:00:01,000 --> 00:00:02,000\nhi\n"),
            Some(InputType::Srt)
        );
        assert_eq!(InputType::probe(b"plain text"), None);
    }

    #[test]
    fn test_wav_header_skips_unknown_chunks() {
        let reader = WavReader::new(Cursor::new(wav_file(8000, 100))).unwrap();
        assert_eq!(
            reader.params(),
            PcmParams {
                sample_rate: 8000,
                channels: 1,
                bits_per_sample: 16
            }
        );
        assert_eq!(reader.remaining, 200);
        assert!(WavReader::new(Cursor::new(b"RIFF\0\0\0\0AVI ".to_vec())).is_err());
    }

    #[test]
    fn test_merge_wav_and_srt() {
        let options = InputOptions {
            comments: vec!["LANGUAGE=English".into()],
            ..Default::default()
        };
        let mut session = MuxSession::new(MemorySink::new());
        let serial = session.next_serial();
        session.add(input(wav_file(8000, 16000), serial, &options)).unwrap();
        let serial = session.next_serial();
        let srt = b"1\n00:00:00,500 --> 00:00:01,000\nhi\n\n2\n00:00:01,500 --> 00:00:01,900\nyo\n".to_vec();
        session.add(input(srt, serial, &InputOptions::default())).unwrap();

        let (sink, summary) = session.run().unwrap();
        assert_eq!(summary.streams, 2);
        assert_eq!(summary.bytes_written, sink.bytes().len() as u64);

        // Headers first, then comments, then data in timestamp order.
        let kinds: Vec<_> = sink.pages.iter().take(4).map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PageKind::Header, PageKind::Header, PageKind::Comment, PageKind::Comment]
        );
        let first = &sink.pages[0];
        let header = StreamHeader::from_packet(&first.data[first.header_len..]).unwrap();
        assert_eq!(header.samples_per_unit, 8000);
        let stamps: Vec<_> = sink.pages[4..].iter().map(|p| p.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{:?}", stamps);
        assert_eq!(sink.pages.iter().filter(|p| p.is_eos()).count(), 2);

        let reader = OgmReader::new(Cursor::new(sink.bytes())).unwrap();
        assert_eq!(reader.streams().len(), 2);
    }

    #[test]
    fn test_merge_vorbis_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ogg");
        let mut session = MuxSession::new(WriteSink::create(&path).unwrap());
        let serial = session.next_serial();
        session.add(input(vorbis_file(), serial, &InputOptions::default())).unwrap();
        session.run().unwrap();

        let mut reader = OgmReader::open(&path).unwrap();
        assert_eq!(reader.streams()[0].kind, StreamKind::Vorbis);
        let mut granules = Vec::new();
        while let Some(p) = reader.next_packet().unwrap() {
            if !p.is_header() {
                granules.push(p.packet.granulepos);
            }
        }
        assert_eq!(granules.last(), Some(&8000));
    }
}
