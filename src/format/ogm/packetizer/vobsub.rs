//! Bitmap subtitle (vobsub) packetizer.
//!
//! A library entry point: callers that read the `.idx`/`.sub` pair supply
//! the cues and their comments.

use super::textsubs::{place_cue, subtitle_eos_packet, subtitle_header, CuePlacement, SUBTITLE_RATE};
use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::HeaderKind;
use crate::format::ogm::lacing::put_lacing;
use crate::format::ogm::page::PageKind;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::Result;
use bytes::{BufMut, BytesMut};

/// Packs bitmap subtitle (vobsub) cues. Unlike text subtitles no gap
/// packets are written between cues.
pub struct VobsubPacketizer {
    pub(crate) core: PacketizerCore,
}

impl VobsubPacketizer {
    /// `comments` should carry the `ID`, `INDEX`, `LANGIDX` and `PALETTE`
    /// entries of the source; see [`VobsubPacketizer::describe`].
    pub fn new(
        serial: u32,
        sync: AudioSync,
        range: Range,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        let clock = StampClock::new(SUBTITLE_RATE, config.timestamp_rule, true);
        Ok(VobsubPacketizer {
            core: PacketizerCore::new(serial, clock, config, sync, range.scaled(1000.0), comments),
        })
    }

    /// Adds the track description entries readers of bitmap subtitles expect.
    pub fn describe(comments: &mut CommentSet, id: &str, index: u32, langidx: u32, palette: &[u32]) {
        comments.add(format!("ID={}", id));
        comments.add(format!("INDEX={}", index));
        comments.add(format!("LANGIDX={}", langidx));
        let palette: Vec<String> = palette.iter().map(|c| format!("{:06x}", c)).collect();
        comments.add(format!("PALETTE={}", palette.join(", ")));
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }
        let header = subtitle_header(HeaderKind::Image).with_subtype(*b"VBSB");
        self.core.submit_stream_header(&header)?;
        let comments = self.core.comments.clone();
        self.core.submit_comments(&comments)?;
        self.core.last_granulepos = 0;
        Ok(())
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (start, end, data, last) = match input {
            PacketInput::Cue {
                start,
                end,
                data,
                last,
            } => (start, end, data, last),
            other => return Err(unexpected_input("vobsub", &other)),
        };

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let (start, end) = match place_cue(&self.core.sync, &self.core.range, start, end) {
            CuePlacement::Early if !last => return Ok(ProcessStatus::MoreData),
            CuePlacement::Early | CuePlacement::Late => {
                self.produce_eos_packet()?;
                return Ok(ProcessStatus::Finished);
            }
            CuePlacement::Visible(start, end) => (start, end),
        };

        let trimmed = data.len()
            - data
                .iter()
                .rev()
                .take_while(|&&b| b == b'\r' || b == b'\n')
                .count();
        let mut buf = BytesMut::with_capacity(trimmed + 6);
        put_lacing(&mut buf, PACKET_IS_SYNCPOINT, (end - start).max(0) as u64)?;
        buf.extend_from_slice(&data[..trimmed]);
        buf.put_u8(b'\r');

        self.core.submit(
            Packet::new(buf.freeze())
                .with_granulepos(start)
                .with_eos(last),
        )?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
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
        let packet = subtitle_eos_packet().with_granulepos(self.core.last_granulepos);
        self.core.submit(packet)?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}
