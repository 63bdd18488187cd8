//! Seek index packetizer.
//!
//! A library entry point for callers that build a seek table for a video
//! stream they multiplex themselves.

use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::{HeaderKind, StreamHeader};
use crate::format::ogm::page::PageKind;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::Result;
use bytes::{Buf, BufMut, BytesMut};

/// Size of one serialized index entry.
pub const INDEX_ENTRY_SIZE: usize = 16;

/// A seek table entry: a video granule and the file offset of its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub granulepos: i64,
    pub filepos: i64,
}

impl IndexEntry {
    /// Reads the entries following the type byte of an index data packet.
    /// A trailing partial entry is ignored.
    pub fn parse_all(mut data: &[u8]) -> Vec<IndexEntry> {
        let mut entries = Vec::with_capacity(data.len() / INDEX_ENTRY_SIZE);
        while data.len() >= INDEX_ENTRY_SIZE {
            entries.push(IndexEntry {
                granulepos: data.get_i64_le(),
                filepos: data.get_i64_le(),
            });
        }
        entries
    }
}

/// Writes a seek table for one video stream as a single packet.
pub struct IndexPacketizer {
    pub(crate) core: PacketizerCore,
    video_serial: u32,
}

impl IndexPacketizer {
    pub fn new(serial: u32, video_serial: u32, config: &Config) -> Result<Self> {
        Ok(IndexPacketizer {
            core: PacketizerCore::new(
                serial,
                StampClock::constant(),
                config,
                AudioSync::default(),
                Range::default(),
                CommentSet::new(config.vendor.clone()),
            ),
            video_serial,
        })
    }

    pub fn video_serial(&self) -> u32 {
        self.video_serial
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }
        let header = StreamHeader::new(HeaderKind::Index)
            .with_subtype(self.video_serial.to_le_bytes())
            .with_time_unit(10_000_000)
            .with_default_len(0);
        self.core.submit_stream_header(&header)?;
        let comments = self.core.comments.clone();
        self.core.submit_comments(&comments)
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let entries = match input {
            PacketInput::Index(entries) => entries,
            other => return Err(unexpected_input("index", &other)),
        };

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let mut buf = BytesMut::with_capacity(1 + entries.len() * INDEX_ENTRY_SIZE);
        buf.put_u8(PACKET_IS_SYNCPOINT);
        for entry in entries {
            buf.put_i64_le(entry.granulepos);
            buf.put_i64_le(entry.filepos);
        }
        self.core.submit(
            Packet::new(buf.freeze())
                .with_granulepos(0)
                .with_eos(true),
        )?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
        Ok(ProcessStatus::Finished)
    }

    /// Ends the stream with an empty table if no entries were written.
    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        if self.core.queue.ended() {
            return Ok(());
        }
        self.process(PacketInput::Index(&[])).map(|_| ())
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ogm::packetizer::tests::{drain, read_packets};
    use crate::format::ogm::packetizer::Packetizer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_packet() {
        let entries = [
            IndexEntry { granulepos: 0, filepos: 0 },
            IndexEntry { granulepos: 250, filepos: 1_048_576 },
        ];
        let mut p: Packetizer = IndexPacketizer::new(8, 0x0102_0304, &Config::default())
            .unwrap()
            .into();
        assert_eq!(p.process(PacketInput::Index(&entries)).unwrap(), ProcessStatus::Finished);
        assert_eq!(p.smallest_timestamp(), 0);

        let packets = read_packets(drain(&mut p));
        let header = StreamHeader::from_packet(&packets[0].data).unwrap();
        assert_eq!(header.kind, HeaderKind::Index);
        assert_eq!(header.subtype, [0x04, 0x03, 0x02, 0x01]);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[2].data.len(), 1 + 2 * INDEX_ENTRY_SIZE);
        assert_eq!(packets[2].data[0], PACKET_IS_SYNCPOINT);
        assert_eq!(IndexEntry::parse_all(&packets[2].data[1..]), entries.to_vec());
        assert!(packets[2].last_in_stream());
    }
}
