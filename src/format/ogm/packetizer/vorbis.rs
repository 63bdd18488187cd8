use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::codec::{SilenceEncoder, VorbisInfo};
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::page::PageKind;
use crate::Result;
use log::{debug, warn};

/// Re-packs a native Vorbis stream: the three header packets pass through
/// (the comments optionally replaced) and data granules are shifted by the
/// displacement, scaled by the drift factor and cut to the range.
pub struct VorbisPacketizer {
    pub(crate) core: PacketizerCore,
    info: Option<VorbisInfo>,
    silence: Option<Box<dyn SilenceEncoder>>,
    last_granulepos_seen: i64,
}

impl VorbisPacketizer {
    /// `range` is given in seconds. Non-empty `comments` replace the
    /// stream's own comment packet.
    pub fn new(
        serial: u32,
        sync: AudioSync,
        range: Range,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        // The rate is only known once the identification header arrives.
        let clock = StampClock::new(0.0, config.timestamp_rule, false);
        Ok(VorbisPacketizer {
            core: PacketizerCore::new(serial, clock, config, sync, range, comments),
            info: None,
            silence: None,
            last_granulepos_seen: 0,
        })
    }

    /// Encoder used to fill a positive displacement with silence. Without one
    /// the granules are shifted and the gap is left to the player.
    pub fn with_silence_encoder(mut self, encoder: Box<dyn SilenceEncoder>) -> Self {
        self.silence = Some(encoder);
        self
    }

    pub fn info(&self) -> Option<&VorbisInfo> {
        self.info.as_ref()
    }

    /// Header packets come from the input; there is nothing to produce
    /// up front.
    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        Ok(())
    }

    fn rate(&self) -> i64 {
        self.info.map_or(0, |info| info.rate as i64)
    }

    fn insert_silence(&mut self) -> Result<()> {
        let displacement = self.core.sync.displacement;
        let Some(info) = self.info else {
            return Ok(());
        };
        if displacement <= 0 {
            return Ok(());
        }
        let Some(encoder) = self.silence.as_mut() else {
            warn!(
                "stream {}: no Vorbis encoder available, {} ms of silence are not inserted",
                self.core.serial, displacement
            );
            return Ok(());
        };

        let samples = info.rate as u64 * displacement as u64 / 1000;
        let packets = encoder.encode_silence(&info, samples)?;
        debug!(
            "stream {}: inserting {} packets of silence ({} samples)",
            self.core.serial,
            packets.len(),
            samples
        );
        for (data, granulepos) in packets {
            self.core.submit(Packet::new(data).with_granulepos(granulepos))?;
            self.core.packetno += 1;
            self.core.queue.queue_pages(PageKind::Data)?;
            self.core.last_granulepos = granulepos;
        }
        Ok(())
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (packet, page_granulepos) = match input {
            PacketInput::Ogg {
                packet,
                page_granulepos,
            } => (packet, page_granulepos),
            other => return Err(unexpected_input("Vorbis", &other)),
        };

        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        match self.core.packetno {
            0 => {
                let info = VorbisInfo::parse(&packet.data)?;
                self.core.queue.clock_mut().set_rate(info.rate as f64);
                self.core.range = self.core.range.scaled(info.rate as f64);
                self.info = Some(info);
                self.core.submit_header_packet(packet, PageKind::Header)?;
            }
            1 => {
                let packet = if self.core.comments.is_empty() {
                    packet
                } else {
                    Packet::new(self.core.comments.to_packet())
                };
                self.core.submit_header_packet(packet, PageKind::Comment)?;
            }
            2 => {
                self.core.submit_header_packet(packet, PageKind::Codebook)?;
                self.insert_silence()?;
            }
            _ => self.process_data(packet, page_granulepos)?,
        }

        Ok(if self.core.queue.ended() {
            ProcessStatus::Finished
        } else {
            ProcessStatus::MoreData
        })
    }

    fn process_data(&mut self, packet: Packet, page_granulepos: i64) -> Result<()> {
        let sync = self.core.sync;
        let range = self.core.range;

        let mut granulepos = if packet.granulepos == -1 {
            page_granulepos
        } else {
            packet.granulepos
        };
        granulepos += self.rate() * sync.displacement / 1000;
        granulepos = (granulepos as f64 * sync.linear) as i64;
        let this_granulepos = granulepos;

        let start = range.start as i64;
        let in_range = granulepos >= start
            && self.last_granulepos_seen >= start
            && (range.is_open_ended() || granulepos <= range.end as i64);

        if in_range {
            let granulepos = granulepos - start;
            // Packets ending before a negative displacement are dropped.
            if sync.displacement >= 0 || granulepos > 0 {
                let eos = packet.eos;
                self.core.submit(
                    Packet::new(packet.data)
                        .with_granulepos(granulepos)
                        .with_eos(eos),
                )?;
                self.core.packetno += 1;
            }
            self.core.queue.queue_pages(PageKind::Data)?;
            self.core.last_granulepos = granulepos;
        } else if packet.eos {
            self.end_stream()?;
        }

        self.last_granulepos_seen = this_granulepos;
        Ok(())
    }

    fn end_stream(&mut self) -> Result<()> {
        self.core.queue.flush_pages(PageKind::Data)?;
        let granulepos = self.core.last_granulepos;
        self.core.submit(
            Packet::new(vec![0u8])
                .with_granulepos(granulepos)
                .with_eos(true),
        )?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
        Ok(())
    }

    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        if self.core.queue.ended() || self.core.packetno < 3 {
            return Ok(());
        }
        self.end_stream()
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vorbis::tests::id_header;
    use crate::format::ogm::packetizer::tests::{drain, read_packets};
    use crate::format::ogm::packetizer::Packetizer;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn packetizer(sync: AudioSync, range: Range, comments: CommentSet) -> Packetizer {
        VorbisPacketizer::new(7, sync, range, comments, &Config::default())
            .unwrap()
            .into()
    }

    fn feed(p: &mut Packetizer, packet: Packet) -> ProcessStatus {
        p.process(PacketInput::Ogg {
            packet,
            page_granulepos: -1,
        })
        .unwrap()
    }

    fn feed_headers(p: &mut Packetizer) {
        feed(p, Packet::new(id_header(2, 8000)));
        feed(p, Packet::new(CommentSet::from_user("enc", ["TITLE=orig"]).to_packet()));
        feed(p, Packet::new(&b"\x05vorbis-setup"[..]));
    }

    fn feed_data(p: &mut Packetizer, granules: &[i64]) {
        for (i, &granulepos) in granules.iter().enumerate() {
            let eos = i + 1 == granules.len();
            feed(p, Packet::new(vec![i as u8; 20]).with_granulepos(granulepos).with_eos(eos));
        }
    }

    /// Granule and end-of-stream flag of every data page.
    fn data_pages(p: &mut Packetizer) -> Vec<(i64, bool)> {
        std::iter::from_fn(|| p.get_page())
            .filter(|page| page.kind == PageKind::Data)
            .map(|page| (page.granulepos, page.is_eos()))
            .collect()
    }

    #[test]
    fn test_header_pages_are_classified() {
        let mut p = packetizer(AudioSync::default(), Range::default(), CommentSet::default());
        feed_headers(&mut p);

        assert!(p.header_page_available());
        assert_eq!(p.get_header_page(PageKind::Codebook).unwrap().body_len(), 13);
        let comment = p.get_header_page(PageKind::Comment).unwrap();
        assert_eq!(
            CommentSet::parse(&comment.data[comment.header_len..]).unwrap().get("TITLE"),
            Some("orig")
        );
        let header = p.get_header_page(PageKind::Header).unwrap();
        assert!(header.is_bos());
        assert!(!p.page_available());
    }

    #[test]
    fn test_user_comments_replace_stream_comments() {
        let comments = CommentSet::from_user("ogmkit", ["TITLE=new"]);
        let mut p = packetizer(AudioSync::default(), Range::default(), comments);
        feed_headers(&mut p);
        let comment = p.get_header_page(PageKind::Comment).unwrap();
        let parsed = CommentSet::parse(&comment.data[comment.header_len..]).unwrap();
        assert_eq!(parsed.vendor, "ogmkit");
        assert_eq!(parsed.get("TITLE"), Some("new"));
    }

    #[test]
    fn test_page_granule_fills_in_missing_granules() {
        let mut p = packetizer(AudioSync::default(), Range::default(), CommentSet::default());
        feed_headers(&mut p);
        for (granulepos, eos) in [(480, false), (960, true)] {
            p.process(PacketInput::Ogg {
                packet: Packet::new(vec![1u8; 10]).with_eos(eos),
                page_granulepos: granulepos,
            })
            .unwrap();
        }
        assert!(p.ended());
        assert_eq!(data_pages(&mut p), vec![(960, true)]);
    }

    #[test]
    fn test_drift_and_range() {
        // 8 kHz: the range 0.1 s..0.2 s is granule 800..1600.
        let mut p = packetizer(AudioSync::new(0, 1.0), Range::new(0.1, 0.2), CommentSet::default());
        feed_headers(&mut p);
        feed_data(&mut p, &[500, 1000, 1500, 2000]);
        assert_eq!(data_pages(&mut p), vec![(700, false), (700, true)]);
    }

    #[test]
    fn test_negative_displacement_drops_early_packets() {
        let mut p = packetizer(AudioSync::new(-100, 1.0), Range::default(), CommentSet::default());
        feed_headers(&mut p);
        feed_data(&mut p, &[500, 1000, 1500, 2000]);
        // -300 and 200 are dropped: the first ends before zero, the second
        // starts there.
        assert_eq!(data_pages(&mut p), vec![(1200, true)]);
    }

    struct FixedSilence;

    impl SilenceEncoder for FixedSilence {
        fn encode_silence(&mut self, info: &VorbisInfo, samples: u64) -> Result<Vec<(Bytes, i64)>> {
            assert_eq!(info.rate, 8000);
            Ok(vec![
                (Bytes::from_static(b"quiet"), samples as i64 / 2),
                (Bytes::from_static(b"quiet"), samples as i64),
            ])
        }
    }

    #[test]
    fn test_positive_displacement_inserts_silence() {
        let vorbis = VorbisPacketizer::new(
            7,
            AudioSync::new(100, 1.0),
            Range::default(),
            CommentSet::default(),
            &Config::default(),
        )
        .unwrap()
        .with_silence_encoder(Box::new(FixedSilence));
        let mut p: Packetizer = vorbis.into();
        feed_headers(&mut p);
        feed_data(&mut p, &[1000]);

        let packets: Vec<_> = read_packets(drain(&mut p)).into_iter().skip(3).collect();
        assert_eq!(packets.len(), 3);
        assert_eq!(&packets[0].data[..], b"quiet");
        assert_eq!(packets[2].absgp_page(), 1800);
        assert!(packets[2].last_in_stream());
    }
}
