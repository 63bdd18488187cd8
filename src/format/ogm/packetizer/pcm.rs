use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::config::Config;
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::{HeaderKind, HeaderParams, StreamHeader};
use crate::format::ogm::lacing::{len_bits, put_fixed_lacing};
use crate::format::ogm::page::PageKind;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::{OgmError, Result};
use bytes::BytesMut;

/// Width of the sample count prefix of every PCM packet.
const SAMPLES_LACING_BYTES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmParams {
    pub fn bytes_per_second(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize * self.sample_rate as usize / 8
    }

    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }
}

/// Packs raw PCM into packets of at most `1 / interleave` seconds.
pub struct PcmPacketizer {
    pub(crate) core: PacketizerCore,
    params: PcmParams,
    bytes_per_subpacket: usize,
    bytes_output: u64,
    /// Bytes still to drop from the start of the input.
    skip_bytes: usize,
    sync_applied: bool,
}

impl PcmPacketizer {
    pub fn new(
        serial: u32,
        params: PcmParams,
        sync: AudioSync,
        range: Range,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        let bps = params.bytes_per_second();
        let interleave = config.pcm_interleave.max(1);
        let bytes_per_subpacket = bps / interleave;
        if params.block_align() == 0 || bytes_per_subpacket == 0 {
            return Err(OgmError::InvalidInput(format!(
                "unusable PCM format: {} Hz, {} channels, {} bits",
                params.sample_rate, params.channels, params.bits_per_sample
            )));
        }
        let clock = StampClock::new(params.sample_rate as f64, config.timestamp_rule, false);
        Ok(PcmPacketizer {
            core: PacketizerCore::new(serial, clock, config, sync, range, comments),
            params,
            bytes_per_subpacket,
            bytes_output: 0,
            skip_bytes: 0,
            sync_applied: false,
        })
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }
        let bps = self.params.bytes_per_second() as u32;
        let header = StreamHeader::new(HeaderKind::Audio)
            .with_subtype(*b"0001")
            .with_time_unit(10_000_000)
            .with_samples_per_unit(self.params.sample_rate as i64)
            .with_default_len(1)
            .with_buffersize(bps)
            .with_bits_per_sample(self.params.bits_per_sample)
            .with_params(HeaderParams::Audio {
                channels: self.params.channels,
                blockalign: self.params.block_align() as u16,
                avgbytespersec: bps,
            });
        self.core.submit_stream_header(&header)?;
        let comments = self.core.comments.clone();
        self.core.submit_comments(&comments)
    }

    /// Byte count matching a displacement in milliseconds, whole samples only.
    fn displacement_bytes(&self, ms: i64) -> usize {
        let samples = self.params.sample_rate as u64 * ms.unsigned_abs() / 1000;
        samples as usize * self.params.block_align()
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (data, last) = match input {
            PacketInput::Bytes { data, last } => (data, last),
            other => return Err(unexpected_input("PCM", &other)),
        };

        let bps = self.params.bytes_per_second();
        if data.len() > bps {
            return Err(OgmError::CapacityExceeded {
                size: data.len(),
                max: bps,
            });
        }

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let mut payload = Vec::with_capacity(data.len());
        if !self.sync_applied {
            self.sync_applied = true;
            let displacement = self.core.sync.displacement;
            if displacement > 0 {
                payload.resize(self.displacement_bytes(displacement), 0);
            } else if displacement < 0 {
                self.skip_bytes = self.displacement_bytes(displacement);
            }
        }
        let skipped = self.skip_bytes.min(data.len());
        self.skip_bytes -= skipped;
        payload.extend_from_slice(&data[skipped..]);

        let frame_bits = self.params.bits_per_sample as u64 * self.params.channels as u64;
        let chunks: Vec<&[u8]> = payload.chunks(self.bytes_per_subpacket).collect();
        if chunks.is_empty() && last {
            let mut buf = BytesMut::with_capacity(1 + SAMPLES_LACING_BYTES);
            put_fixed_lacing(&mut buf, PACKET_IS_SYNCPOINT, 0, SAMPLES_LACING_BYTES)?;
            let granulepos = (self.bytes_output * 8 / frame_bits) as i64;
            self.core.submit(
                Packet::new(buf.freeze())
                    .with_granulepos(granulepos)
                    .with_eos(true),
            )?;
            self.core.packetno += 1;
        }

        let count = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let flags = len_bits(SAMPLES_LACING_BYTES) | if i == 0 { PACKET_IS_SYNCPOINT } else { 0 };
            let samples = chunk.len() as u64 * 8 / frame_bits;
            let mut buf = BytesMut::with_capacity(1 + SAMPLES_LACING_BYTES + chunk.len());
            put_fixed_lacing(&mut buf, flags, samples, SAMPLES_LACING_BYTES)?;
            buf.extend_from_slice(chunk);

            let granulepos = (self.bytes_output * 8 / frame_bits) as i64;
            self.core.submit(
                Packet::new(buf.freeze())
                    .with_granulepos(granulepos)
                    .with_eos(last && i + 1 == count),
            )?;
            self.core.packetno += 1;
            self.bytes_output += chunk.len() as u64;
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
        if self.core.queue.ended() {
            return Ok(());
        }
        self.process(PacketInput::Bytes {
            data: &[],
            last: true,
        })
        .map(|_| ())
    }

    pub(crate) fn reset(&mut self) {
        self.core.queue.clear();
    }
}
