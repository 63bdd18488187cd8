use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::{Packet, StreamKind};
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::page::PageKind;
use crate::Result;

/// Re-queues packets read from an existing stream without touching their
/// payload. Callers rewrite granules and decide when to flush; header
/// packets still get a page of their own.
pub struct CopyPacketizer {
    pub(crate) core: PacketizerCore,
    kind: StreamKind,
}

impl CopyPacketizer {
    /// `rate` is the stream's granule rate, used to stamp pages for
    /// interleaving.
    pub fn new(serial: u32, kind: StreamKind, rate: f64, config: &Config) -> Self {
        let clock = StampClock::new(rate, config.timestamp_rule, kind.is_text());
        CopyPacketizer {
            core: PacketizerCore::new(
                serial,
                clock,
                config,
                AudioSync::default(),
                Range::default(),
                CommentSet::new(config.vendor.clone()),
            ),
            kind,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let packet = match input {
            PacketInput::Ogg { packet, .. } => packet,
            other => return Err(unexpected_input("copy", &other)),
        };
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let kind = PageKind::of_packet(packet.flags());
        if kind.is_header_class() && self.core.packetno < 3 {
            self.core.submit_header_packet(packet, kind)?;
            return Ok(ProcessStatus::MoreData);
        }

        let eos = packet.eos;
        let granulepos = packet.granulepos;
        self.core.submit(packet)?;
        self.core.packetno += 1;
        self.core.last_granulepos = granulepos;
        if eos {
            self.core.queue.flush_pages(PageKind::Data)?;
            Ok(ProcessStatus::Finished)
        } else {
            self.core.queue.queue_pages(PageKind::Data)?;
            Ok(ProcessStatus::MoreData)
        }
    }

    /// Ends the stream with a one byte packet at the last granule.
    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        if self.core.queue.ended() {
            return Ok(());
        }
        let granulepos = self.core.last_granulepos;
        self.process(PacketInput::Ogg {
            packet: Packet::new(vec![0u8])
                .with_granulepos(granulepos)
                .with_eos(true),
            page_granulepos: granulepos,
        })
        .map(|_| ())
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ogm::header::{HeaderKind, StreamHeader};
    use crate::format::ogm::packetizer::tests::{drain, read_packets};
    use crate::format::ogm::packetizer::Packetizer;
    use pretty_assertions::assert_eq;

    fn ogg(packet: Packet) -> PacketInput<'static> {
        PacketInput::Ogg {
            packet,
            page_granulepos: -1,
        }
    }

    #[test]
    fn test_copies_headers_and_data() {
        let mut p: Packetizer = CopyPacketizer::new(3, StreamKind::Text, 1000.0, &Config::default()).into();
        assert_eq!(p.kind(), StreamKind::Text);

        let header = StreamHeader::new(HeaderKind::Text).with_time_unit(10_000);
        p.process(ogg(Packet::new(header.to_packet()))).unwrap();
        p.process(ogg(Packet::new(CommentSet::new("x").to_packet()))).unwrap();
        assert!(p.header_page_available());

        p.process(ogg(Packet::new(&b"\x08\x10data\0"[..]).with_granulepos(1500)))
            .unwrap();
        p.flush_pages().unwrap();
        // Text pages are stamped with their own granule.
        let pages: Vec<_> = std::iter::from_fn(|| p.get_page()).collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].timestamp, 1_500_000);

        p.produce_eos_packet().unwrap();
        assert!(p.ended());
        let mut stream: Vec<u8> = pages.iter().flat_map(|page| page.data.to_vec()).collect();
        stream.extend(drain(&mut p));
        let packets = read_packets(stream);
        assert_eq!(packets.len(), 4);
        assert_eq!(packets[3].absgp_page(), 1500);
        assert!(packets[3].last_in_stream());
    }

    #[test]
    fn test_header_bits_after_headers_are_data() {
        let mut p: Packetizer = CopyPacketizer::new(3, StreamKind::Audio, 8000.0, &Config::default()).into();
        for data in [&b"\x01a"[..], b"\x03b", b"\x05c", b"\x01d"] {
            p.process(ogg(Packet::new(data).with_granulepos(10))).unwrap();
        }
        for kind in [PageKind::Codebook, PageKind::Header, PageKind::Comment] {
            assert_eq!(p.get_header_page(kind).map(|page| page.body_len()), Some(2));
        }
        assert!(!p.page_available());
        p.flush_pages().unwrap();
        assert_eq!(p.get_page().map(|page| page.kind), Some(PageKind::Data));
    }
}
