//! Stream listing and packet level inspection of OGM files.
//!
//! The verbosity levels:
//!
//! * 0: one line per stream
//! * 1: also the comment packets
//! * 2: one line per packet
//! * 3 and up: full stream header dumps

use super::comments::CommentSet;
use super::lacing::decode_lacing;
use super::page::PageKind;
use super::stream::{ElementaryStream, InputPacket, OgmReader};
use super::PACKET_IS_SYNCPOINT;
use crate::av::StreamKind;
use crate::config::TimestampRule;
use crate::Result;
use std::io::{Read, Seek, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoOptions {
    pub verbosity: u8,
    pub summary: bool,
    pub check_timing: bool,
    pub timestamp_rule: TimestampRule,
}

/// Totals collected for one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub label: String,
    pub serial: u32,
    pub rate: f64,
    pub packets: u64,
    pub size: u64,
    pub biggest_granulepos: i64,
    pub eos: bool,
    pub comment: bool,
}

impl StreamStats {
    fn new(stream: &ElementaryStream) -> Self {
        StreamStats {
            label: stream.label(),
            serial: stream.serial,
            rate: stream.rate,
            ..Default::default()
        }
    }

    /// Playing time in seconds.
    pub fn length(&self) -> f64 {
        if self.rate > 0.0 {
            self.biggest_granulepos as f64 / self.rate
        } else {
            0.0
        }
    }

    pub fn kbit_per_sec(&self) -> f64 {
        match self.length() {
            l if l > 0.0 => self.size as f64 * 8.0 / 1000.0 / l,
            _ => 0.0,
        }
    }

    pub fn kbyte_per_sec(&self) -> f64 {
        match self.length() {
            l if l > 0.0 => self.size as f64 / 1024.0 / l,
            _ => 0.0,
        }
    }
}

/// The one line description of a stream.
pub fn describe_stream(stream: &ElementaryStream) -> String {
    let prefix = format!("({}/serial {})", stream.label(), stream.serial);
    if let Some(vorbis) = &stream.vorbis {
        return format!(
            "{} Vorbis audio (channels {} rate {})",
            prefix, vorbis.channels, vorbis.rate
        );
    }
    let Some(header) = &stream.header else {
        return format!("{} {} stream", prefix, stream.kind.name());
    };

    match stream.kind {
        StreamKind::Video => {
            let s = header.subtype;
            format!(
                "{} fps: {:.3} width height: {}x{} codec: 0x{:08x} ({})",
                prefix,
                stream.rate,
                header.width(),
                header.height(),
                u32::from_be_bytes(s),
                header.subtype_str()
            )
        }
        StreamKind::Audio => {
            let codec = header.audio_codec().unwrap_or(0);
            format!(
                "{} codec: {} (0x{:04x}) ({}) bits per sample: {} channels: {}  samples per second: {} avgbytespersec: {} blockalign: {}",
                prefix,
                codec,
                codec,
                stream.audio_codec().map_or("unknown", |c| c.name()),
                header.bits_per_sample,
                header.channels(),
                header.samples_per_unit,
                header.avgbytespersec(),
                header.blockalign()
            )
        }
        StreamKind::Text => format!("{} text/subtitle stream", prefix),
        StreamKind::Image => format!("{} image/vobsub subtitle stream", prefix),
        StreamKind::Index => format!(
            "{} index stream for video stream with the serial {}",
            prefix,
            u32::from_le_bytes(header.subtype)
        ),
        StreamKind::Vorbis => format!("{} Vorbis audio", prefix),
    }
}

fn dump_header(stream: &ElementaryStream) -> Option<String> {
    let h = stream.header.as_ref()?;
    Some(format!(
        "({}/serial {}) Full stream_header dump: {{streamtype = \"{}\", subtype = \"{}\", size = {}, time_unit = {}, samples_per_unit = {}, default_len = {}, buffersize = {}, bits_per_sample = {}, params = {:?}}}",
        stream.label(),
        stream.serial,
        h.kind.tag(),
        h.subtype_str(),
        h.size,
        h.time_unit,
        h.samples_per_unit,
        h.default_len,
        h.buffersize,
        h.bits_per_sample,
        h.params
    ))
}

/// Walks a file and prints what it finds to `out`.
pub struct Inspector<W: Write> {
    out: W,
    options: InfoOptions,
    stats: Vec<StreamStats>,
    last_pts: f64,
}

impl<W: Write> Inspector<W> {
    pub fn new(out: W, options: InfoOptions) -> Self {
        Inspector {
            out,
            options,
            stats: Vec::new(),
            last_pts: 0.0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn run<R: Read + Seek>(&mut self, mut reader: OgmReader<R>) -> Result<Vec<StreamStats>> {
        self.stats = reader.streams().iter().map(StreamStats::new).collect();
        for stream in reader.streams() {
            writeln!(self.out, "{}", describe_stream(stream))?;
            if self.options.verbosity > 2 {
                if let Some(dump) = dump_header(stream) {
                    writeln!(self.out, "{}", dump)?;
                }
            }
        }
        if self.options.verbosity == 0 && !self.options.summary {
            return Ok(std::mem::take(&mut self.stats));
        }

        while let Some(input) = reader.next_packet()? {
            // Comments are all that is left to show at level one.
            if self.options.verbosity == 1 && !self.options.summary && !input.is_header() {
                break;
            }
            let Some(stream) = reader.stream(input.serial) else {
                continue;
            };
            let i = reader
                .streams()
                .iter()
                .position(|s| s.serial == input.serial)
                .unwrap_or_default();
            self.handle(stream, i, &input)?;
        }

        if self.options.verbosity > 0 || self.options.summary {
            self.report_missing()?;
        }
        if self.options.summary {
            self.print_summary()?;
        }
        Ok(std::mem::take(&mut self.stats))
    }

    fn handle(&mut self, stream: &ElementaryStream, i: usize, input: &InputPacket) -> Result<()> {
        let packet = &input.packet;
        let stats = &mut self.stats[i];
        if packet.eos {
            stats.eos = true;
        }
        stats.biggest_granulepos = stats.biggest_granulepos.max(input.page_granulepos);
        stats.packets += 1;
        stats.size += packet.len() as u64;

        let label = &stats.label;
        let kind = if input.is_header() {
            PageKind::of_packet(packet.flags())
        } else {
            PageKind::Data
        };
        match kind {
            PageKind::Comment => {
                stats.comment = true;
                if self.options.verbosity < 1 {
                    return Ok(());
                }
                match CommentSet::parse(&packet.data) {
                    Err(_) => writeln!(
                        self.out,
                        "{}: comment packet, length {}. This packet does NOT contain a valid comment packet!",
                        label,
                        packet.len()
                    )?,
                    Ok(set) if set.is_empty() => writeln!(
                        self.out,
                        "{}: comment packet, length {}, no user comment fields available.",
                        label,
                        packet.len()
                    )?,
                    Ok(set) => {
                        writeln!(
                            self.out,
                            "{}: comment packet, length {}, {} user comment field{}:",
                            label,
                            packet.len(),
                            set.len(),
                            if set.len() == 1 { "" } else { "s" }
                        )?;
                        for comment in set.iter() {
                            writeln!(self.out, "{}:   {}", label, comment)?;
                        }
                    }
                }
            }
            PageKind::Header | PageKind::Codebook => {
                if self.options.verbosity >= 2 {
                    writeln!(self.out, "{}: header packet, length {}", label, packet.len())?;
                }
            }
            PageKind::Data => {
                if self.options.verbosity < 2 {
                    return Ok(());
                }
                let mut line = String::new();
                let vorbis = stream.kind == StreamKind::Vorbis;
                let (width, duration) = if vorbis {
                    (0, 0)
                } else {
                    decode_lacing(&packet.data).unwrap_or((0, 1))
                };
                let bytes = if vorbis {
                    packet.len()
                } else {
                    packet.len().saturating_sub(1 + width)
                };

                if stream.kind == StreamKind::Index {
                    line.push_str(&format!("{}: {:7} bytes", label, bytes));
                } else {
                    line.push_str(&format!(
                        "{}: {:7} bytes granulepos: {:10} pno: {:10}",
                        label, bytes, input.page_granulepos, packet.packetno
                    ));
                    if self.options.check_timing && stream.rate > 0.0 {
                        line.push_str(&self.timing(stream, input));
                    }
                    if !vorbis {
                        line.push_str(&format!(" hdrlen: {}", width));
                        if width > 0 {
                            line.push_str(&format!(" duration: {}", duration));
                        }
                    }
                }
                if !vorbis && packet.flags() & PACKET_IS_SYNCPOINT != 0 {
                    line.push_str(" IS_SYNCPOINT");
                }
                if packet.eos {
                    line.push_str(" EOS");
                }
                writeln!(self.out, "{}", line)?;
            }
        }
        Ok(())
    }

    /// Start and end of the page a packet sits on, flagged when the
    /// interleaving went backwards in time.
    fn timing(&mut self, stream: &ElementaryStream, input: &InputPacket) -> String {
        let end_pts = stream.granule_to_ms(input.page_granulepos);
        let start_pts = stream.granule_to_ms(input.previous_page_granulepos);
        let text = stream.kind.is_text();
        let stamp = if self.options.timestamp_rule.uses_previous(text) {
            start_pts
        } else {
            end_pts
        };
        let verdict = if stamp < self.last_pts { "OUT_OF_SYNC" } else { "sync_ok" };
        self.last_pts = start_pts;
        format!(" start: {:13.2}ms  end: {:13.2}ms {}", start_pts, end_pts, verdict)
    }

    fn report_missing(&mut self) -> Result<()> {
        for stats in &self.stats {
            if !stats.eos {
                writeln!(
                    self.out,
                    "({}/serial {}) end-of-stream marker missing",
                    stats.label, stats.serial
                )?;
            }
            if !stats.comment && self.options.verbosity >= 1 {
                writeln!(
                    self.out,
                    "({}/serial {}) comment packet missing",
                    stats.label, stats.serial
                )?;
            }
        }
        Ok(())
    }

    fn print_summary(&mut self) -> Result<()> {
        for stats in &self.stats {
            writeln!(
                self.out,
                "({}/serial {}) stream size: {} bytes ({:.3} kbit/s, {:.3} KB/s), number of packets: {}, length in seconds: {:.3}",
                stats.label,
                stats.serial,
                stats.size,
                stats.kbit_per_sec(),
                stats.kbyte_per_sec(),
                stats.packets,
                stats.length()
            )?;
        }
        Ok(())
    }
}

/// Inspects one reader and returns the printed text with the totals.
pub fn inspect<R: Read + Seek>(
    reader: OgmReader<R>,
    options: InfoOptions,
) -> Result<(String, Vec<StreamStats>)> {
    let mut inspector = Inspector::new(Vec::new(), options);
    let stats = inspector.run(reader)?;
    let text = String::from_utf8_lossy(&inspector.into_inner()).into_owned();
    Ok((text, stats))
}
