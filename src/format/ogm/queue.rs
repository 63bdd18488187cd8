use super::clock::StampClock;
use super::page::{split_pages, Page, PageKind};
use crate::av::Packet;
use crate::{OgmError, Result};
use bytes::BytesMut;
use ogg::{PacketWriteEndInfo, PacketWriter};
use std::collections::VecDeque;

/// Body size after which [`Queue::queue_pages`] closes the current page.
pub const PAGE_FILL_TARGET: usize = 4096;

/// Turns the packets of one logical stream into stamped pages.
///
/// The last submitted packet is held back until the next one arrives so a
/// later flush can still end the page right after it.
pub struct Queue {
    serial: u32,
    writer: PacketWriter<'static, Vec<u8>>,
    pending: Option<Packet>,
    unpaged_bytes: usize,
    pages: VecDeque<Page>,
    clock: StampClock,
    next_keyframe: Option<u32>,
    max_queued_bytes: usize,
    ended: bool,
}

impl Queue {
    pub fn new(serial: u32, clock: StampClock) -> Self {
        Self {
            serial,
            writer: PacketWriter::new(Vec::new()),
            pending: None,
            unpaged_bytes: 0,
            pages: VecDeque::new(),
            clock,
            next_keyframe: None,
            max_queued_bytes: usize::MAX,
            ended: false,
        }
    }

    pub fn with_max_queued_bytes(mut self, max: usize) -> Self {
        self.max_queued_bytes = max;
        self
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn clock_mut(&mut self) -> &mut StampClock {
        &mut self.clock
    }

    /// True once the end-of-stream packet has been submitted.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Submits a packet. End-of-stream packets close their page at once.
    pub fn add_packet(&mut self, packet: Packet) -> Result<()> {
        if self.ended {
            return Err(OgmError::MalformedStream(format!(
                "packet submitted after end of stream {}",
                self.serial
            )));
        }

        if let Some(previous) = self.pending.take() {
            self.write(previous, PacketWriteEndInfo::NormalPacket, PageKind::Data)?;
        }

        if packet.eos {
            self.ended = true;
            self.write(packet, PacketWriteEndInfo::EndStream, PageKind::Data)?;
        } else {
            self.unpaged_bytes += packet.len();
            self.pending = Some(packet);
        }

        let queued = self.queued_bytes();
        if queued > self.max_queued_bytes {
            return Err(OgmError::CapacityExceeded {
                size: queued,
                max: self.max_queued_bytes,
            });
        }
        Ok(())
    }

    /// Closes the current page if it has grown past [`PAGE_FILL_TARGET`].
    pub fn queue_pages(&mut self, kind: PageKind) -> Result<usize> {
        if self.unpaged_bytes < PAGE_FILL_TARGET {
            return Ok(0);
        }
        self.flush_pages(kind)
    }

    /// Forces every submitted packet out into pages tagged with `kind`.
    pub fn flush_pages(&mut self, kind: PageKind) -> Result<usize> {
        match self.pending.take() {
            Some(packet) => self.write(packet, PacketWriteEndInfo::EndPage, kind),
            None => Ok(0),
        }
    }

    fn write(&mut self, packet: Packet, info: PacketWriteEndInfo, kind: PageKind) -> Result<usize> {
        let closes_page = !matches!(info, PacketWriteEndInfo::NormalPacket);
        // -1 is carried through as all ones.
        let granulepos = packet.granulepos as u64;
        self.writer
            .write_packet(packet.data.to_vec(), self.serial, info, granulepos)?;

        let produced = std::mem::take(self.writer.inner_mut());
        let mut buf = BytesMut::from(&produced[..]);
        let pages = split_pages(&mut buf)?;
        if !buf.is_empty() {
            return Err(OgmError::MalformedStream("page writer left a partial page".into()));
        }

        let count = pages.len();
        for page in pages {
            self.unpaged_bytes = self.unpaged_bytes.saturating_sub(page.body_len());
            let timestamp = self.clock.stamp(page.granulepos);
            let page = page
                .with_timestamp(timestamp)
                .with_kind(kind)
                .with_keyframe_of(self.next_keyframe.take());
            self.pages.push_back(page);
        }
        if closes_page {
            self.unpaged_bytes = 0;
        }
        Ok(count)
    }

    /// Tags the next page this queue produces as starting with a keyframe
    /// of `serial`.
    pub fn mark_next_page_as_keyframe(&mut self, serial: u32) {
        self.next_keyframe = Some(serial);
    }

    pub fn page_available(&self) -> bool {
        !self.pages.is_empty()
    }

    pub fn header_page_available(&self, kind: PageKind) -> bool {
        self.pages.iter().any(|page| page.kind == kind)
    }

    pub fn any_header_page_available(&self) -> bool {
        self.pages.iter().any(|page| page.kind.is_header_class())
    }

    /// Removes the oldest page.
    pub fn pop_next(&mut self) -> Option<Page> {
        self.pages.pop_front()
    }

    /// Removes the first page of the given header class, wherever it is.
    pub fn pop_header_class(&mut self, kind: PageKind) -> Option<Page> {
        let index = self.pages.iter().position(|page| page.kind == kind)?;
        self.pages.remove(index)
    }

    /// Timestamp of the oldest page, `i64::MAX` when nothing is queued.
    pub fn smallest_timestamp(&self) -> i64 {
        self.pages.front().map_or(i64::MAX, |page| page.timestamp)
    }

    /// Header and body bytes of all queued pages.
    pub fn queued_bytes(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Drops queued pages and the held back packet.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.pending = None;
        self.unpaged_bytes = 0;
        self.next_keyframe = None;
    }
}
