use super::packetizer::Packetizer;
use super::page::{Page, PageKind};
use crate::format::PageSink;
use crate::{OgmError, Result};
use log::{debug, trace};
use std::collections::HashMap;

struct MuxStream {
    packetizer: Packetizer,
    /// Page taken from the packetizer and waiting to win.
    held: Option<Page>,
}

/// Interleaves the pages of several packetizers into one output.
///
/// Streams keep their insertion order. Of the pages waiting at the head of
/// each stream the one with the smallest timestamp is written first; ties
/// go to the stream added first.
pub struct Multiplexer<S: PageSink> {
    streams: Vec<MuxStream>,
    index: HashMap<u32, usize>,
    sink: Option<S>,
    bytes_written: u64,
    bytes_written_all: u64,
    count_only: bool,
    next_serial: u32,
}

impl<S: PageSink> Default for Multiplexer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PageSink> Multiplexer<S> {
    /// A multiplexer with no output open. Pages are dropped until
    /// [`Multiplexer::open`] is called, unless counting only.
    pub fn new() -> Self {
        Multiplexer {
            streams: Vec::new(),
            index: HashMap::new(),
            sink: None,
            bytes_written: 0,
            bytes_written_all: 0,
            count_only: false,
            next_serial: 1,
        }
    }

    pub fn with_sink(sink: S) -> Self {
        let mut mux = Self::new();
        mux.sink = Some(sink);
        mux
    }

    /// A serial number not used by any stream added so far.
    pub fn next_serial(&mut self) -> u32 {
        while self.index.contains_key(&self.next_serial) {
            self.next_serial = self.next_serial.wrapping_add(1);
        }
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        serial
    }

    /// Adds a stream. Its serial must be unique.
    pub fn add(&mut self, packetizer: impl Into<Packetizer>) -> Result<u32> {
        let packetizer = packetizer.into();
        let serial = packetizer.serial();
        if self.index.contains_key(&serial) {
            return Err(OgmError::InvalidInput(format!(
                "serial {} is already in use",
                serial
            )));
        }
        debug!("adding {} stream with serial {}", packetizer.kind().name(), serial);
        self.index.insert(serial, self.streams.len());
        self.streams.push(MuxStream {
            packetizer,
            held: None,
        });
        Ok(serial)
    }

    /// Swaps in a new packetizer for an existing serial, dropping whatever
    /// the old one still held.
    pub fn replace(&mut self, packetizer: impl Into<Packetizer>) -> Result<()> {
        let packetizer = packetizer.into();
        let serial = packetizer.serial();
        let &i = self.index.get(&serial).ok_or_else(|| {
            OgmError::InvalidInput(format!("no stream with serial {}", serial))
        })?;
        self.streams[i] = MuxStream {
            packetizer,
            held: None,
        };
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Serials in insertion order.
    pub fn serials(&self) -> Vec<u32> {
        self.streams.iter().map(|s| s.packetizer.serial()).collect()
    }

    pub fn packetizer(&self, serial: u32) -> Option<&Packetizer> {
        self.index.get(&serial).map(|&i| &self.streams[i].packetizer)
    }

    pub fn packetizer_mut(&mut self, serial: u32) -> Option<&mut Packetizer> {
        self.index
            .get(&serial)
            .copied()
            .map(move |i| &mut self.streams[i].packetizer)
    }

    pub fn packetizers_mut(&mut self) -> impl Iterator<Item = &mut Packetizer> {
        self.streams.iter_mut().map(|s| &mut s.packetizer)
    }

    /// Opens a new output, returning the previous one. Resets the per file
    /// byte counter.
    pub fn open(&mut self, sink: S) -> Option<S> {
        self.bytes_written = 0;
        self.sink.replace(sink)
    }

    /// Flushes and detaches the current output.
    pub fn close(&mut self) -> Result<Option<S>> {
        match self.sink.take() {
            Some(mut sink) => {
                sink.flush()?;
                Ok(Some(sink))
            }
            None => Ok(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// When set, pages are accounted for but not written.
    pub fn set_count_only(&mut self, count_only: bool) {
        self.count_only = count_only;
    }

    pub fn count_only(&self) -> bool {
        self.count_only
    }

    /// Bytes written to the current output.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes written to all outputs so far.
    pub fn bytes_written_all(&self) -> u64 {
        self.bytes_written_all
    }

    /// Bytes sitting in packetizer queues or waiting to win.
    pub fn queued_bytes(&self) -> u64 {
        self.streams
            .iter()
            .map(|s| s.packetizer.queued_bytes() + s.held.as_ref().map_or(0, Page::len))
            .sum::<usize>() as u64
    }

    /// Writes one page, or only counts it.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        if !self.count_only {
            match self.sink.as_mut() {
                Some(sink) => sink.write_page(page)?,
                None => return Ok(()),
            }
        }
        trace!(
            "serial {}: {} + {} bytes, granule {}",
            page.serial,
            page.header_len,
            page.body_len(),
            page.granulepos
        );
        self.bytes_written += page.len() as u64;
        self.bytes_written_all += page.len() as u64;
        Ok(())
    }

    /// Produces every stream's header packets and writes them out of band:
    /// all stream headers, then all comments, then all codebooks.
    pub fn write_header_pages(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            stream.packetizer.produce_header_packets()?;
        }
        for kind in [PageKind::Header, PageKind::Comment, PageKind::Codebook] {
            for i in 0..self.streams.len() {
                while let Some(page) = self.streams[i].packetizer.get_header_page(kind) {
                    self.write_page(&page)?;
                }
            }
        }
        Ok(())
    }

    /// Moves the next page of every stream into its slot. Returns false if
    /// a stream that has not ended has nothing to offer yet, or if no page
    /// is waiting at all.
    fn pages_available(&mut self) -> bool {
        let mut any = false;
        for stream in &mut self.streams {
            if stream.held.is_none() {
                stream.held = stream.packetizer.get_page();
            }
            if stream.held.is_some() {
                any = true;
            } else if !stream.packetizer.ended() {
                return false;
            }
        }
        any
    }

    fn winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, i64)> = None;
        for (i, stream) in self.streams.iter().enumerate() {
            if let Some(page) = &stream.held {
                match winner {
                    Some((_, timestamp)) if page.timestamp >= timestamp => {}
                    _ => winner = Some((i, page.timestamp)),
                }
            }
        }
        winner.map(|(i, _)| i)
    }

    /// Writes the waiting page with the smallest timestamp, returning it.
    pub fn write_winner_page(&mut self) -> Result<Option<Page>> {
        let Some(i) = self.winner() else {
            return Ok(None);
        };
        let Some(page) = self.streams[i].held.take() else {
            return Ok(None);
        };
        self.write_page(&page)?;
        Ok(Some(page))
    }

    /// Writes pages for as long as every live stream has one waiting.
    pub fn write_all_winner_pages(&mut self) -> Result<usize> {
        let mut written = 0;
        while self.pages_available() {
            if self.write_winner_page()?.is_none() {
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    /// Forces out every queued packet and writes all pages, still in
    /// timestamp order.
    pub fn flush_all(&mut self) -> Result<usize> {
        for stream in &mut self.streams {
            stream.packetizer.flush_pages()?;
        }
        let mut written = 0;
        loop {
            for stream in &mut self.streams {
                if stream.held.is_none() {
                    stream.held = stream.packetizer.get_page();
                }
            }
            if self.write_winner_page()?.is_none() {
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    /// Ends every stream that has not ended and writes everything left.
    pub fn finish(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            stream.packetizer.produce_eos_packet()?;
        }
        self.flush_all()?;
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::format::ogm::comments::CommentSet;
    use crate::format::ogm::packetizer::{
        AudioSync, PacketInput, PcmPacketizer, PcmParams, Range, TextSubsPacketizer,
    };
    use crate::format::tests::MemorySink;
    use pretty_assertions::assert_eq;

    fn pcm(serial: u32) -> PcmPacketizer {
        let params = PcmParams {
            sample_rate: 1000,
            channels: 1,
            bits_per_sample: 16,
        };
        PcmPacketizer::new(
            serial,
            params,
            AudioSync::default(),
            Range::default(),
            CommentSet::new("t"),
            &Config::default(),
        )
        .unwrap()
    }

    fn text(serial: u32) -> TextSubsPacketizer {
        TextSubsPacketizer::new(
            serial,
            AudioSync::default(),
            Range::default(),
            CommentSet::new("t"),
            &Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_serials_are_unique() {
        let mut mux: Multiplexer<MemorySink> = Multiplexer::new();
        mux.add(pcm(1)).unwrap();
        assert!(mux.add(pcm(1)).is_err());
        assert_eq!(mux.next_serial(), 2);
        assert_eq!(mux.next_serial(), 3);
        assert_eq!(mux.serials(), vec![1]);
    }

    #[test]
    fn test_header_pages_come_first() {
        let mut mux = Multiplexer::with_sink(MemorySink::new());
        mux.add(pcm(1)).unwrap();
        mux.add(text(2)).unwrap();
        mux.write_header_pages().unwrap();

        let sink = mux.sink().unwrap();
        let kinds: Vec<_> = sink.pages.iter().map(|p| (p.serial, p.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (1, PageKind::Header),
                (2, PageKind::Header),
                (1, PageKind::Comment),
                (2, PageKind::Comment),
            ]
        );
        assert_eq!(
            mux.bytes_written(),
            sink.pages.iter().map(|p| p.len() as u64).sum::<u64>()
        );
    }

    #[test]
    fn test_pages_are_written_in_timestamp_order() {
        let mut mux = Multiplexer::with_sink(MemorySink::new());
        mux.add(pcm(1)).unwrap();
        mux.add(text(2)).unwrap();
        mux.write_header_pages().unwrap();

        // Two seconds of audio, cues at 0.5 s and 1.5 s.
        let audio = vec![0u8; 4000];
        for chunk in audio.chunks(500) {
            let p = mux.packetizer_mut(1).unwrap();
            p.process(PacketInput::Bytes { data: chunk, last: false }).unwrap();
            p.flush_pages().unwrap();
        }
        let p = mux.packetizer_mut(2).unwrap();
        p.process(PacketInput::Cue { start: 500, end: 700, data: b"a", last: false }).unwrap();
        p.process(PacketInput::Cue { start: 1500, end: 1700, data: b"b", last: true }).unwrap();

        mux.write_all_winner_pages().unwrap();
        mux.finish().unwrap();

        let sink = mux.close().unwrap().unwrap();
        assert_eq!(sink.flushes, 2);
        let stamps: Vec<i64> = sink
            .pages
            .iter()
            .filter(|p| p.kind == PageKind::Data)
            .map(|p| p.timestamp)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{:?}", stamps);
        assert!(sink.pages.iter().filter(|p| p.is_eos()).count() == 2);
    }

    #[test]
    fn test_waits_for_live_streams() {
        let mut mux = Multiplexer::with_sink(MemorySink::new());
        mux.add(pcm(1)).unwrap();
        mux.add(text(2)).unwrap();
        mux.write_header_pages().unwrap();

        let p = mux.packetizer_mut(1).unwrap();
        p.process(PacketInput::Bytes { data: &[0u8; 200], last: false }).unwrap();
        p.flush_pages().unwrap();
        // The subtitle stream could still produce an earlier page.
        assert_eq!(mux.write_all_winner_pages().unwrap(), 0);
        assert!(mux.queued_bytes() > 0);
    }

    #[test]
    fn test_count_only() {
        let mut mux = Multiplexer::with_sink(MemorySink::new());
        mux.set_count_only(true);
        mux.add(pcm(1)).unwrap();
        mux.write_header_pages().unwrap();
        assert!(mux.bytes_written() > 0);
        assert_eq!(mux.bytes_written(), mux.bytes_written_all());
        assert!(mux.sink().unwrap().pages.is_empty());

        mux.set_count_only(false);
        let before = mux.bytes_written_all();
        mux.open(MemorySink::new());
        assert_eq!(mux.bytes_written(), 0);
        assert_eq!(mux.bytes_written_all(), before);
    }
}
