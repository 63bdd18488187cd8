use super::audio::{frame_packet, FrameBuffer, FrameSync};
use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::codec::mp3::{MP3_HEADER_SIZE, MP3_SAMPLES_PER_FRAME};
use crate::codec::Mp3Header;
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::{HeaderKind, HeaderParams, StreamHeader};
use crate::format::ogm::page::PageKind;
use crate::Result;
use log::warn;

/// Packs MPEG layer III frames, one frame per packet.
pub struct Mp3Packetizer {
    pub(crate) core: PacketizerCore,
    stream: Mp3Header,
    frames: FrameBuffer,
    frame_sync: FrameSync,
}

impl Mp3Packetizer {
    /// `stream` is the first frame header of the input and fixes the stream
    /// parameters.
    pub fn new(
        serial: u32,
        stream: Mp3Header,
        sync: AudioSync,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        let clock = StampClock::new(stream.sample_rate as f64, config.timestamp_rule, false);
        Ok(Mp3Packetizer {
            core: PacketizerCore::new(serial, clock, config, sync, Range::default(), comments),
            stream,
            frames: FrameBuffer::new(config.max_frame_buffer),
            frame_sync: FrameSync::new(sync.displacement),
        })
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }
        let rate = self.stream.sample_rate;
        let header = StreamHeader::new(HeaderKind::Audio)
            .with_subtype(*b"0055")
            .with_time_unit(10_000_000)
            .with_samples_per_unit(rate as i64)
            .with_default_len(1)
            .with_buffersize(rate)
            .with_bits_per_sample(0)
            .with_params(HeaderParams::Audio {
                channels: self.stream.channels(),
                blockalign: MP3_SAMPLES_PER_FRAME as u16,
                avgbytespersec: self.stream.bitrate_kbps * 1000 / 8,
            });
        self.core.submit_stream_header(&header)?;
        let comments = self.core.comments.clone();
        self.core.submit_comments(&comments)
    }

    fn emit(&mut self, frame: &[u8], eos: bool) -> Result<()> {
        let samples = (self.core.packetno - 2) * MP3_SAMPLES_PER_FRAME as i64;
        let granulepos = (samples as f64 * self.core.sync.linear) as i64;
        self.core.submit(
            Packet::new(frame_packet(MP3_SAMPLES_PER_FRAME, frame)?)
                .with_granulepos(granulepos)
                .with_eos(eos),
        )?;
        self.core.packetno += 1;
        Ok(())
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (data, last) = match input {
            PacketInput::Bytes { data, last } => (data, last),
            other => return Err(unexpected_input("MP3", &other)),
        };

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        self.frames.add(data)?;
        while let Some((header, frame)) = self.frames.next_frame::<Mp3Header>() {
            if !header.is_layer3() {
                warn!(
                    "stream {}: packet {} is not an MPEG layer III frame, skipped",
                    self.core.serial,
                    self.core.packetno - 2
                );
                continue;
            }

            let ms_per_frame = header.ms_per_frame();
            if self.frame_sync.drop_frame(ms_per_frame) {
                continue;
            }
            let padding = self.frame_sync.padding_frames(ms_per_frame);
            if padding > 0 {
                let mut silent = frame.to_vec();
                silent[MP3_HEADER_SIZE..].fill(0);
                for _ in 0..padding {
                    self.emit(&silent, false)?;
                }
            }

            let eos = last && !self.frames.frame_available::<Mp3Header>();
            self.emit(&frame, eos)?;
            if eos {
                break;
            }
        }

        if last {
            self.core.queue.flush_pages(PageKind::Data)?;
            Ok(ProcessStatus::Finished)
        } else {
            self.core.queue.queue_pages(PageKind::Data)?;
            Ok(ProcessStatus::MoreData)
        }
    }

    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(());
        }
        let granulepos = (self.core.packetno - 2) * MP3_SAMPLES_PER_FRAME as i64;
        self.core.submit(
            Packet::new(vec![0u8])
                .with_granulepos(granulepos)
                .with_eos(true),
        )?;
        self.core.packetno += 1;
        self.core.queue.flush_pages(PageKind::Data)?;
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.frames.clear();
        self.core.queue.clear();
    }
}
