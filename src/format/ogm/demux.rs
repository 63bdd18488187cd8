//! Extraction of the streams of an OGM file into files of their own.

use super::lacing::decode_lacing;
use super::page::PageKind;
use super::stream::{AudioCodec, ElementaryStream, InputPacket, OgmReader};
use super::{format_ms, is_header_class};
use crate::av::StreamKind;
use crate::{OgmError, Result};
use log::{debug, info, trace};
use ogg::{PacketWriteEndInfo, PacketWriter};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const WAV_HEADER_LEN: u32 = 44;

/// Destination for the packets of one demuxed stream
pub trait StreamWriter {
    /// Write one packet read from the input
    fn write_packet(&mut self, input: &InputPacket) -> Result<()>;

    /// Complete the output after the last packet
    fn finish(&mut self) -> Result<()>;

    /// Payload bytes written so far
    fn bytes_written(&self) -> u64;
}

/// The payload of a data packet, after the flag byte and lacing.
fn payload(data: &[u8]) -> &[u8] {
    match decode_lacing(data) {
        Ok((width, _)) => &data[1 + width..],
        Err(_) => &[],
    }
}

fn is_header(input: &InputPacket) -> bool {
    input.is_header() || input.packet.data.first().is_some_and(|&b| is_header_class(b))
}

/// Writes bare payloads, dropping header and comment packets.
pub struct PayloadWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> PayloadWriter<W> {
    pub fn new(inner: W) -> Self {
        PayloadWriter { inner, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> StreamWriter for PayloadWriter<W> {
    fn write_packet(&mut self, input: &InputPacket) -> Result<()> {
        if is_header(input) {
            return Ok(());
        }
        let data = payload(&input.packet.data);
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Writes Vorbis packets without framing: the identification header as
/// is, every other packet without its first byte.
pub struct RawVorbisWriter<W: Write> {
    inner: W,
    packets: u64,
    written: u64,
}

impl<W: Write> RawVorbisWriter<W> {
    pub fn new(inner: W) -> Self {
        RawVorbisWriter {
            inner,
            packets: 0,
            written: 0,
        }
    }
}

impl<W: Write> StreamWriter for RawVorbisWriter<W> {
    fn write_packet(&mut self, input: &InputPacket) -> Result<()> {
        let data = &input.packet.data;
        let data = if self.packets == 0 { &data[..] } else { data.get(1..).unwrap_or(&[]) };
        self.inner.write_all(data)?;
        self.packets += 1;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// PCM samples in a RIFF/WAVE file. The length fields are filled in when
/// the writer finishes.
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    channels: u16,
    rate: u32,
    bits_per_sample: u16,
    written: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(inner: W, channels: u16, rate: u32, bits_per_sample: u16) -> Result<Self> {
        let mut writer = WavWriter {
            inner,
            channels,
            rate,
            bits_per_sample,
            written: 0,
        };
        let header = writer.header();
        writer.inner.write_all(&header)?;
        Ok(writer)
    }

    fn header(&self) -> Vec<u8> {
        let block_align = self.channels * self.bits_per_sample / 8;
        let data_len = self.written.min((u32::MAX - WAV_HEADER_LEN) as u64) as u32;
        let mut h = Vec::with_capacity(WAV_HEADER_LEN as usize);
        h.extend_from_slice(b"RIFF");
        h.extend_from_slice(&(data_len + WAV_HEADER_LEN - 8).to_le_bytes());
        h.extend_from_slice(b"WAVE");
        h.extend_from_slice(b"fmt ");
        h.extend_from_slice(&16u32.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes());
        h.extend_from_slice(&self.channels.to_le_bytes());
        h.extend_from_slice(&self.rate.to_le_bytes());
        h.extend_from_slice(&(self.rate * block_align as u32).to_le_bytes());
        h.extend_from_slice(&block_align.to_le_bytes());
        h.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        h.extend_from_slice(b"data");
        h.extend_from_slice(&data_len.to_le_bytes());
        h
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> StreamWriter for WavWriter<W> {
    fn write_packet(&mut self, input: &InputPacket) -> Result<()> {
        if is_header(input) {
            return Ok(());
        }
        let data = payload(&input.packet.data);
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let header = self.header();
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&header)?;
        self.inner.seek(SeekFrom::End(0))?;
        Ok(self.inner.flush()?)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Text cues as SubRip entries.
pub struct SrtWriter<W: Write> {
    inner: W,
    rate: f64,
    entries: usize,
    written: u64,
}

impl<W: Write> SrtWriter<W> {
    /// `rate` is the stream's granule rate.
    pub fn new(inner: W, rate: f64) -> Self {
        SrtWriter {
            inner,
            rate,
            entries: 0,
            written: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> StreamWriter for SrtWriter<W> {
    fn write_packet(&mut self, input: &InputPacket) -> Result<()> {
        if is_header(input) || self.rate <= 0.0 {
            return Ok(());
        }
        let data = &input.packet.data;
        let Ok((width, duration)) = decode_lacing(data) else {
            return Ok(());
        };
        let raw = &data[1 + width..];
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\0');
        // Gap packets are empty and the end of stream packet is a space.
        if text.is_empty() || text == " " {
            return Ok(());
        }

        let granulepos = match input.packet.granulepos {
            -1 => input.page_granulepos,
            gp => gp,
        };
        let start = (granulepos as f64 * 1000.0 / self.rate) as i64;
        let end = start + (duration as f64 * 1000.0 / self.rate) as i64;
        self.entries += 1;
        let entry = format!(
            "{}\r\n{} --> {}\r\n{}\r\n\r\n",
            self.entries,
            format_ms(start, ','),
            format_ms(end, ','),
            text.trim_end_matches(['\r', '\n'])
        );
        self.inner.write_all(entry.as_bytes())?;
        self.written += entry.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Re-frames a Vorbis stream into a standalone Ogg Vorbis file.
pub struct OggVorbisWriter<W: Write> {
    writer: PacketWriter<'static, W>,
    serial: u32,
    packets: u64,
    max_granulepos: i64,
    eos: bool,
    written: u64,
}

impl<W: Write> OggVorbisWriter<W> {
    pub fn new(inner: W, serial: u32) -> Self {
        OggVorbisWriter {
            writer: PacketWriter::new(inner),
            serial,
            packets: 0,
            max_granulepos: 0,
            eos: false,
            written: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> StreamWriter for OggVorbisWriter<W> {
    fn write_packet(&mut self, input: &InputPacket) -> Result<()> {
        if self.eos {
            return Ok(());
        }
        let packet = &input.packet;
        let granulepos = match packet.granulepos {
            -1 => input.page_granulepos,
            gp => gp,
        }
        .max(0);
        self.max_granulepos = self.max_granulepos.max(granulepos);

        let end = if packet.eos {
            self.eos = true;
            PacketWriteEndInfo::EndStream
        } else if self.packets == 0 || self.packets == 2 {
            // The identification header and the setup end their pages.
            PacketWriteEndInfo::EndPage
        } else {
            PacketWriteEndInfo::NormalPacket
        };
        self.writer
            .write_packet(packet.data.to_vec(), self.serial, end, granulepos as u64)?;
        self.packets += 1;
        self.written += packet.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.eos && self.packets > 0 {
            self.writer.write_packet(
                Vec::new(),
                self.serial,
                PacketWriteEndInfo::EndStream,
                self.max_granulepos as u64,
            )?;
            self.eos = true;
        }
        Ok(self.writer.inner_mut().flush()?)
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Which streams of one kind to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub disabled: bool,
    /// One-based stream numbers; empty selects every stream.
    pub numbers: Vec<usize>,
}

impl Selection {
    pub fn wants(&self, number: usize) -> bool {
        !self.disabled && (self.numbers.is_empty() || self.numbers.contains(&number))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxOptions {
    /// Write bare payloads instead of WAV, SRT or Ogg files.
    pub raw: bool,
    pub audio: Selection,
    pub video: Selection,
    pub text: Selection,
}

impl DemuxOptions {
    pub fn wants(&self, stream: &ElementaryStream) -> bool {
        match stream.kind {
            StreamKind::Audio | StreamKind::Vorbis => self.audio.wants(stream.number),
            StreamKind::Video => self.video.wants(stream.number),
            StreamKind::Text => self.text.wants(stream.number),
            StreamKind::Image | StreamKind::Index => false,
        }
    }
}

/// File extension for an extracted stream.
pub fn extension(stream: &ElementaryStream, raw: bool) -> &'static str {
    if raw {
        return "raw";
    }
    match (stream.kind, stream.audio_codec()) {
        (StreamKind::Vorbis, _) => "ogg",
        (StreamKind::Audio, Some(AudioCodec::Pcm)) => "wav",
        (StreamKind::Audio, Some(AudioCodec::Mp3)) => "mp3",
        (StreamKind::Audio, Some(AudioCodec::Ac3)) => "ac3",
        (StreamKind::Audio, _) => "audio",
        (StreamKind::Text, _) => "srt",
        // AVI output is left to external tools.
        _ => "raw",
    }
}

/// `{base}-{letter}{number}.{ext}`.
pub fn output_name(base: &str, stream: &ElementaryStream, raw: bool) -> String {
    format!("{}-{}.{}", base, stream.label(), extension(stream, raw))
}

/// Picks the writer matching a stream's kind and codec.
pub fn writer_for<W: Write + Seek + 'static>(
    stream: &ElementaryStream,
    raw: bool,
    out: W,
) -> Result<Box<dyn StreamWriter>> {
    let writer: Box<dyn StreamWriter> = match (stream.kind, raw) {
        (StreamKind::Vorbis, true) => Box::new(RawVorbisWriter::new(out)),
        (StreamKind::Vorbis, false) => Box::new(OggVorbisWriter::new(out, stream.serial)),
        (StreamKind::Text, false) => Box::new(SrtWriter::new(out, stream.rate)),
        (StreamKind::Audio, false) if stream.audio_codec() == Some(AudioCodec::Pcm) => {
            let header = stream.header.as_ref().ok_or_else(|| {
                OgmError::MalformedHeader(format!("({}) PCM stream without a header", stream.label()))
            })?;
            Box::new(WavWriter::new(
                out,
                header.channels(),
                header.samples_per_unit as u32,
                header.bits_per_sample,
            )?)
        }
        _ => Box::new(PayloadWriter::new(out)),
    };
    Ok(writer)
}

/// One extracted stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub label: String,
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemuxSummary {
    pub streams: Vec<Extracted>,
    /// Largest timestamp seen in any stream, in milliseconds.
    pub highest_ms: f64,
}

/// Routes the packets of an input to per stream writers.
pub struct Demuxer<R: Read + Seek> {
    reader: OgmReader<R>,
    writers: Vec<(u32, String, Box<dyn StreamWriter>)>,
}

impl<R: Read + Seek> Demuxer<R> {
    pub fn new(reader: OgmReader<R>) -> Self {
        Demuxer {
            reader,
            writers: Vec::new(),
        }
    }

    pub fn streams(&self) -> &[ElementaryStream] {
        self.reader.streams()
    }

    pub fn add_writer(&mut self, serial: u32, name: impl Into<String>, writer: Box<dyn StreamWriter>) {
        self.writers.push((serial, name.into(), writer));
    }

    pub fn run(mut self) -> Result<DemuxSummary> {
        let mut highest_ms: f64 = 0.0;
        while let Some(input) = self.reader.next_packet()? {
            if let Some(stream) = self.reader.stream(input.serial) {
                if input.packet.granulepos > 0 {
                    highest_ms = highest_ms.max(stream.granule_to_ms(input.packet.granulepos));
                }
                trace!(
                    "{}: {} bytes, granulepos {}{}",
                    stream.label(),
                    input.packet.len(),
                    input.packet.granulepos,
                    if PageKind::of_packet(input.packet.flags()) == PageKind::Data { "" } else { " (header)" }
                );
            }
            if let Some((_, _, writer)) = self.writers.iter_mut().find(|(serial, _, _)| *serial == input.serial) {
                writer.write_packet(&input)?;
            }
        }

        let mut streams = Vec::with_capacity(self.writers.len());
        for (serial, name, mut writer) in self.writers {
            writer.finish()?;
            let label = self
                .reader
                .stream(serial)
                .map(ElementaryStream::label)
                .unwrap_or_default();
            debug!("{}: {} bytes written to '{}'", label, writer.bytes_written(), name);
            streams.push(Extracted {
                label,
                name,
                bytes: writer.bytes_written(),
            });
        }
        Ok(DemuxSummary { streams, highest_ms })
    }
}

/// Output base for an input path: its file name without directories.
pub fn default_base(input: &Path) -> String {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Extracts the selected streams of `input` into files named after
/// `base`, which may include a directory.
pub fn demux_file(input: &Path, base: &Path, options: &DemuxOptions) -> Result<DemuxSummary> {
    let reader = OgmReader::open(input)?;
    let mut demuxer = Demuxer::new(reader);
    let base = base.to_string_lossy().into_owned();

    let wanted: Vec<ElementaryStream> = demuxer
        .streams()
        .iter()
        .filter(|s| options.wants(s))
        .cloned()
        .collect();
    for stream in wanted {
        let name = output_name(&base, &stream, options.raw);
        let path = PathBuf::from(&name);
        let file = File::create(&path).map_err(|e| OgmError::file(&path, e))?;
        let writer = writer_for(&stream, options.raw, BufWriter::new(file))?;
        info!("extracting {} to '{}'", stream.label(), name);
        demuxer.add_writer(stream.serial, name, writer);
    }
    demuxer.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::Packet;
    use crate::format::ogm::merge::tests::vorbis_file;
    use crate::format::ogm::stream::tests::{data_packet, pcm_header, sample_file};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn input(data: Vec<u8>, granulepos: i64, header_index: Option<usize>) -> InputPacket {
        InputPacket {
            serial: 1,
            packet: Packet::new(data).with_granulepos(granulepos),
            page_granulepos: granulepos,
            previous_page_granulepos: 0,
            header_index,
        }
    }

    #[test]
    fn test_output_names() {
        let reader = OgmReader::new(Cursor::new(sample_file())).unwrap();
        let streams = reader.streams();
        assert_eq!(output_name("movie.ogm", &streams[0], false), "movie.ogm-v1.raw");
        assert_eq!(output_name("movie.ogm", &streams[1], false), "movie.ogm-a1.wav");
        assert_eq!(output_name("movie.ogm", &streams[1], true), "movie.ogm-a1.raw");
        assert_eq!(default_base(Path::new("/tmp/x/movie.ogm")), "movie.ogm");
    }

    #[test]
    fn test_selection() {
        let reader = OgmReader::new(Cursor::new(sample_file())).unwrap();
        let streams = reader.streams();
        let mut options = DemuxOptions::default();
        assert!(options.wants(&streams[0]) && options.wants(&streams[1]));
        options.audio.numbers = vec![2];
        assert!(!options.wants(&streams[1]));
        options.video.disabled = true;
        assert!(!options.wants(&streams[0]));
    }

    #[test]
    fn test_srt_entries() {
        let mut w = SrtWriter::new(Vec::new(), 1000.0);
        w.write_packet(&input(vec![0x01, b'x'], 0, Some(0))).unwrap();
        w.write_packet(&input(data_packet(0, 1000, b""), 0, None)).unwrap();
        w.write_packet(&input(data_packet(0, 1500, b"Hello\r\nworld\r\n\0"), 1000, None))
            .unwrap();
        w.write_packet(&input(data_packet(0, 1, b" \0"), 2500, None)).unwrap();
        assert_eq!(
            String::from_utf8(w.into_inner()).unwrap(),
            "1\r\n00:00:01,000 --> 00:00:02,500\r\nHello\r\nworld\r\n\r\n"
        );
    }

    #[test]
    fn test_wav_lengths_patched() {
        let mut w = WavWriter::new(Cursor::new(Vec::new()), 2, 8000, 16).unwrap();
        w.write_packet(&input(pcm_header(8000).to_packet().to_vec(), 0, Some(0))).unwrap();
        for gp in [160, 320] {
            w.write_packet(&input(data_packet(0x88, 160, &[1; 640]), gp, None)).unwrap();
        }
        w.finish().unwrap();
        let out = w.into_inner().into_inner();
        assert_eq!(out.len(), 44 + 1280);
        assert_eq!(&out[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([out[4], out[5], out[6], out[7]]), 1280 + 36);
        assert_eq!(u16::from_le_bytes([out[32], out[33]]), 4);
        assert_eq!(u32::from_le_bytes([out[28], out[29], out[30], out[31]]), 32000);
        assert_eq!(u32::from_le_bytes([out[40], out[41], out[42], out[43]]), 1280);
    }

    #[test]
    fn test_demux_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("movie.ogm");
        std::fs::write(&input, sample_file()).unwrap();
        let base = dir.path().join("out");

        let summary = demux_file(&input, &base, &DemuxOptions::default()).unwrap();
        assert_eq!(summary.streams.len(), 2);
        assert_eq!(summary.highest_ms, 80.0);

        let video = std::fs::read(dir.path().join("out-v1.raw")).unwrap();
        assert_eq!(video, b"frameframeframe");
        let wav = std::fs::read(dir.path().join("out-a1.wav")).unwrap();
        assert_eq!(wav.len(), 44 + 1280);
    }

    #[test]
    fn test_vorbis_to_ogg() {
        let reader = OgmReader::new(Cursor::new(vorbis_file())).unwrap();
        let stream = reader.streams()[0].clone();
        assert_eq!(extension(&stream, false), "ogg");

        let mut demuxer = Demuxer::new(reader);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a1.ogg");
        let file = File::create(&path).unwrap();
        demuxer.add_writer(stream.serial, "a1.ogg", writer_for(&stream, false, file).unwrap());
        let summary = demuxer.run().unwrap();
        assert_eq!(summary.streams[0].label, "a1");

        let mut reader = ogg::PacketReader::new(Cursor::new(std::fs::read(&path).unwrap()));
        let mut packets = Vec::new();
        while let Some(p) = reader.read_packet().unwrap() {
            packets.push(p);
        }
        assert_eq!(packets.len(), 5);
        assert!(packets[0].first_in_stream());
        assert!(packets[4].last_in_stream());
        assert_eq!(packets[4].absgp_page(), 8000);
    }
}
