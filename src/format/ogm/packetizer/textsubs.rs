use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::{HeaderKind, StreamHeader};
use crate::format::ogm::lacing::{len_bits, put_lacing};
use crate::format::ogm::page::PageKind;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::Result;
use bytes::{BufMut, BytesMut};

/// Subtitle granules are milliseconds.
pub(crate) const SUBTITLE_RATE: f64 = 1000.0;

/// Where a cue lands after sync and range are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CuePlacement {
    /// Entirely before the range.
    Early,
    /// Starts after the range.
    Late,
    /// Visible between the two times (ms, relative to the range start).
    Visible(i64, i64),
}

/// Applies displacement, drift and the range window to a cue.
pub(crate) fn place_cue(sync: &AudioSync, range: &Range, start: i64, end: i64) -> CuePlacement {
    let shift = |t: i64| (sync.linear * (t + sync.displacement) as f64) as i64 - range.start as i64;
    let mut start = shift(start);
    let mut end = shift(end);
    if end < 0 {
        return CuePlacement::Early;
    }
    let length = (range.end - range.start) as i64;
    if !range.is_open_ended() && start > length {
        return CuePlacement::Late;
    }
    start = start.max(0);
    if !range.is_open_ended() && end > length {
        end = length;
    }
    CuePlacement::Visible(start, end)
}

/// Header shared by the subtitle packetizers.
pub(crate) fn subtitle_header(kind: HeaderKind) -> StreamHeader {
    StreamHeader::new(kind)
        .with_time_unit(10_000)
        .with_samples_per_unit(1)
        .with_default_len(1)
        .with_buffersize(16384)
}

/// The packet that ends a subtitle stream: a one millisecond blank cue.
pub(crate) fn subtitle_eos_packet() -> Packet {
    Packet::new(vec![len_bits(1) | PACKET_IS_SYNCPOINT, 1, b' ', 0]).with_eos(true)
}

/// Converts line breaks to CRLF and drops trailing line breaks.
fn normalize_text(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 8);
    for &b in text {
        match b {
            b'\r' => {}
            b'\n' => out.extend_from_slice(b"\r\n"),
            _ => out.push(b),
        }
    }
    while matches!(out.last(), Some(b'\r' | b'\n')) {
        out.pop();
    }
    out
}

/// Packs text subtitles, one packet per cue plus blank gap packets between
/// cues.
pub struct TextSubsPacketizer {
    pub(crate) core: PacketizerCore,
    omit_empty_packets: bool,
}

impl TextSubsPacketizer {
    /// `range` is given in seconds.
    pub fn new(
        serial: u32,
        sync: AudioSync,
        range: Range,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        let clock = StampClock::new(SUBTITLE_RATE, config.timestamp_rule, true);
        Ok(TextSubsPacketizer {
            core: PacketizerCore::new(serial, clock, config, sync, range.scaled(1000.0), comments),
            omit_empty_packets: config.omit_empty_packets,
        })
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }
        self.core.submit_stream_header(&subtitle_header(HeaderKind::Text))?;
        let comments = self.core.comments.clone();
        self.core.submit_comments(&comments)?;
        self.core.last_granulepos = 0;
        Ok(())
    }

    fn submit_flushed(&mut self, packet: Packet) -> Result<()> {
        self.core.submit(packet)?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
        Ok(())
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (start, end, text, last) = match input {
            PacketInput::Cue {
                start,
                end,
                data,
                last,
            } => (start, end, data, last),
            other => return Err(unexpected_input("text subtitle", &other)),
        };

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let (start, end) = match place_cue(&self.core.sync, &self.core.range, start, end) {
            CuePlacement::Early if last => {
                self.produce_eos_packet()?;
                return Ok(ProcessStatus::Finished);
            }
            CuePlacement::Early => return Ok(ProcessStatus::MoreData),
            CuePlacement::Late => {
                self.produce_eos_packet()?;
                return Ok(ProcessStatus::Finished);
            }
            CuePlacement::Visible(start, end) => (start, end),
        };

        if !self.omit_empty_packets {
            let gap = (start - self.core.last_granulepos).max(0);
            let mut buf = BytesMut::with_capacity(4);
            put_lacing(&mut buf, PACKET_IS_SYNCPOINT, gap as u64)?;
            buf.put_u8(0);
            let granulepos = self.core.last_granulepos;
            self.submit_flushed(Packet::new(buf.freeze()).with_granulepos(granulepos))?;
        }

        let text = normalize_text(text);
        let mut buf = BytesMut::with_capacity(text.len() + 6);
        put_lacing(&mut buf, PACKET_IS_SYNCPOINT, (end - start).max(0) as u64)?;
        buf.extend_from_slice(&text);
        buf.put_u8(0);
        self.submit_flushed(
            Packet::new(buf.freeze())
                .with_granulepos(start)
                .with_eos(last),
        )?;
        self.core.last_granulepos = end;

        Ok(if last {
            ProcessStatus::Finished
        } else {
            ProcessStatus::MoreData
        })
    }

    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(());
        }
        let granulepos = self.core.last_granulepos;
        self.submit_flushed(subtitle_eos_packet().with_granulepos(granulepos))
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ogm::lacing::decode_lacing;
    use crate::format::ogm::packetizer::tests::{data_packets, drain, read_packets};
    use crate::format::ogm::packetizer::Packetizer;
    use pretty_assertions::assert_eq;

    fn packetizer(sync: AudioSync, range: Range, config: &Config) -> Packetizer {
        TextSubsPacketizer::new(2, sync, range, CommentSet::new("t"), config)
            .unwrap()
            .into()
    }

    fn cue(p: &mut Packetizer, start: i64, end: i64, text: &str, last: bool) -> ProcessStatus {
        p.process(PacketInput::Cue {
            start,
            end,
            data: text.as_bytes(),
            last,
        })
        .unwrap()
    }

    #[test]
    fn test_header() {
        let mut p = packetizer(AudioSync::default(), Range::default(), &Config::default());
        p.produce_header_packets().unwrap();
        let packets = read_packets(drain(&mut p));
        let header = StreamHeader::from_packet(&packets[0].data).unwrap();
        assert_eq!(header.kind, HeaderKind::Text);
        assert_eq!(header.time_unit, 10_000);
        assert_eq!(header.sample_rate(), 1000.0);
        assert_eq!(header.buffersize, 16384);
    }

    #[test]
    fn test_gap_and_cue_packets() {
        let mut p = packetizer(AudioSync::default(), Range::default(), &Config::default());
        cue(&mut p, 1000, 2500, "Hello\nWorld\n", false);
        cue(&mut p, 3000, 4000, "Bye", true);

        let packets = data_packets(&mut p);
        assert_eq!(packets.len(), 4);

        assert_eq!(decode_lacing(&packets[0].data).unwrap(), (2, 1000));
        assert_eq!(packets[0].data.last(), Some(&0));
        assert_eq!(packets[0].absgp_page(), 0);

        let (width, duration) = decode_lacing(&packets[1].data).unwrap();
        assert_eq!(duration, 1500);
        assert_eq!(&packets[1].data[1 + width..], b"Hello\r\nWorld\0");
        assert_eq!(packets[1].absgp_page(), 1000);

        assert_eq!(decode_lacing(&packets[2].data).unwrap().1, 500);
        assert_eq!(packets[2].absgp_page(), 2500);
        assert!(packets[3].last_in_stream());
        assert_eq!(packets[3].absgp_page(), 3000);
    }

    #[test]
    fn test_omit_empty_packets() {
        let config = Config {
            omit_empty_packets: true,
            ..Config::default()
        };
        let mut p = packetizer(AudioSync::default(), Range::default(), &config);
        cue(&mut p, 1000, 2000, "a", false);
        p.produce_eos_packet().unwrap();

        let packets = data_packets(&mut p);
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[1].data[..], &[0x48, 1, b' ', 0]);
        assert_eq!(packets[1].absgp_page(), 2000);
    }

    #[test]
    fn test_sync_and_range() {
        // Cues are shifted by 500 ms, then the range 2s..4s is cut out.
        let mut p = packetizer(AudioSync::new(500, 1.0), Range::new(2.0, 4.0), &Config::default());
        assert_eq!(cue(&mut p, 0, 1000, "early", false), ProcessStatus::MoreData);
        cue(&mut p, 1000, 2000, "clipped start", false);
        cue(&mut p, 3000, 5000, "clipped end", false);
        assert_eq!(cue(&mut p, 6000, 7000, "late", false), ProcessStatus::Finished);
        assert!(p.ended());

        let packets = data_packets(&mut p);
        let cues: Vec<_> = packets
            .iter()
            .filter(|packet| packet.data.len() > 4)
            .map(|packet| (packet.absgp_page(), decode_lacing(&packet.data).unwrap().1))
            .collect();
        assert_eq!(cues, vec![(0, 500), (1500, 500)]);
        assert!(packets.last().unwrap().last_in_stream());
    }

    #[test]
    fn test_drift_scales_times() {
        assert_eq!(
            place_cue(&AudioSync::new(0, 2.0), &Range::default(), 100, 200),
            CuePlacement::Visible(200, 400)
        );
        assert_eq!(
            place_cue(&AudioSync::new(-300, 1.0), &Range::default(), 100, 200),
            CuePlacement::Early
        );
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(b"a\r\nb\n\n"), b"a\r\nb".to_vec());
        assert_eq!(normalize_text(b"\n"), Vec::<u8>::new());
    }
}
