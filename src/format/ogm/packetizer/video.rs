//! Video packetizer.
//!
//! No tool in this crate reads a video container, so nothing here feeds it
//! from a file. It is a library entry point for callers that extract frames
//! themselves and pass them in as [`PacketInput::Frame`](super::PacketInput).

use super::{unexpected_input, AudioSync, PacketInput, PacketizerCore, ProcessStatus, Range};
use crate::av::Packet;
use crate::config::Config;
use crate::format::ogm::chapters::{adjust_chapters, strip_chapters};
use crate::format::ogm::clock::StampClock;
use crate::format::ogm::comments::CommentSet;
use crate::format::ogm::header::{HeaderKind, HeaderParams, StreamHeader};
use crate::format::ogm::lacing::{put_fixed_lacing, put_lacing};
use crate::format::ogm::page::PageKind;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::{OgmError, Result};
use bytes::BytesMut;

/// End of the chapter window when the range is open ended.
const OPEN_END_MS: f64 = 99_999_999_999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoParams {
    pub fourcc: [u8; 4],
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u16,
    pub max_frame_size: usize,
}

/// Packs compressed video frames, one packet per call.
pub struct VideoPacketizer {
    pub(crate) core: PacketizerCore,
    params: VideoParams,
    time_unit: i64,
    chapter_info: Option<CommentSet>,
}

impl VideoPacketizer {
    /// `range` is given in seconds and applied to packet numbers.
    pub fn new(
        serial: u32,
        params: VideoParams,
        range: Range,
        comments: CommentSet,
        config: &Config,
    ) -> Result<Self> {
        if params.fps <= 0.0 {
            return Err(OgmError::InvalidInput(format!(
                "invalid frame rate {}",
                params.fps
            )));
        }
        let time_unit = (10_000_000.0 / params.fps) as i64;
        if time_unit <= 0 {
            return Err(OgmError::InvalidInput(format!(
                "frame rate {} is too high",
                params.fps
            )));
        }
        let clock = StampClock::new(
            10_000_000.0 / time_unit as f64,
            config.timestamp_rule,
            false,
        );
        let range = range.scaled(params.fps);
        Ok(VideoPacketizer {
            core: PacketizerCore::new(serial, clock, config, AudioSync::default(), range, comments),
            params,
            time_unit,
            chapter_info: None,
        })
    }

    /// Chapters that replace any chapter entries of the stream comments.
    pub fn set_chapter_info(&mut self, chapters: CommentSet) {
        self.chapter_info = Some(chapters);
    }

    pub fn params(&self) -> &VideoParams {
        &self.params
    }

    pub(crate) fn produce_header_packets(&mut self) -> Result<()> {
        if self.core.packetno != 0 {
            return Ok(());
        }

        let header = StreamHeader::new(HeaderKind::Video)
            .with_subtype(self.params.fourcc)
            .with_time_unit(self.time_unit)
            .with_samples_per_unit(1)
            .with_default_len(1)
            .with_buffersize(self.params.max_frame_size as u32)
            .with_bits_per_sample(self.params.bits_per_sample)
            .with_params(HeaderParams::Video {
                width: self.params.width,
                height: self.params.height,
            });
        self.core.submit_stream_header(&header)?;

        let comments = match &self.chapter_info {
            Some(chapters) => {
                let mut stripped = strip_chapters(&self.core.comments);
                stripped.extend(chapters);
                stripped
            }
            None => self.core.comments.clone(),
        };
        let fps = self.params.fps;
        let range = self.core.range;
        let end_ms = if range.is_open_ended() {
            OPEN_END_MS
        } else {
            range.end / fps * 1000.0
        };
        let comments = adjust_chapters(&comments, range.start / fps * 1000.0, end_ms);

        let max = self.params.max_frame_size + 1;
        if comments.encoded_len() > max {
            return Err(OgmError::CapacityExceeded {
                size: comments.encoded_len(),
                max,
            });
        }
        self.core.submit_comments(&comments)
    }

    pub(crate) fn process(&mut self, input: PacketInput<'_>) -> Result<ProcessStatus> {
        let (data, num_frames, key, last) = match input {
            PacketInput::Frame {
                data,
                num_frames,
                key,
                last,
            } => (data, num_frames, key, last),
            other => return Err(unexpected_input("video", &other)),
        };

        if data.len() > self.params.max_frame_size {
            return Err(OgmError::CapacityExceeded {
                size: data.len(),
                max: self.params.max_frame_size,
            });
        }
        if num_frames == 0 {
            return Err(OgmError::InvalidInput("video packet with zero frames".into()));
        }

        self.produce_header_packets()?;
        if self.core.queue.ended() {
            return Ok(ProcessStatus::Finished);
        }

        let packetno = self.core.packetno as f64;
        let range = self.core.range;
        if packetno >= range.start && (range.is_open_ended() || packetno < range.end) {
            if key {
                self.core.queue.flush_pages(PageKind::Data)?;
                self.core.queue.mark_next_page_as_keyframe(self.core.serial);
            }

            let flags = if key { PACKET_IS_SYNCPOINT } else { 0 };
            let mut buf = BytesMut::with_capacity(data.len() + 5);
            if num_frames == 1 {
                put_fixed_lacing(&mut buf, flags, 1, 0)?;
            } else {
                put_lacing(&mut buf, flags, num_frames as u64)?;
            }
            buf.extend_from_slice(data);

            let granulepos = self.core.last_granulepos + num_frames as i64 - 1;
            self.core.submit(
                Packet::new(buf.freeze())
                    .with_granulepos(granulepos)
                    .with_eos(last),
            )?;
            self.core.queue.queue_pages(PageKind::Data)?;
            self.core.last_granulepos += num_frames as i64;
        } else if last {
            self.core.submit(
                Packet::new(vec![0u8])
                    .with_granulepos(self.core.last_granulepos)
                    .with_eos(true),
            )?;
            self.core.queue.flush_pages(PageKind::Data)?;
            self.core.last_granulepos += 1;
        }
        self.core.packetno += 1;

        Ok(if last {
            ProcessStatus::Finished
        } else {
            ProcessStatus::MoreData
        })
    }

    pub(crate) fn produce_eos_packet(&mut self) -> Result<()> {
        if self.core.queue.ended() {
            return Ok(());
        }
        self.process(PacketInput::Frame {
            data: &[0],
            num_frames: 1,
            key: false,
            last: true,
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
    use crate::format::ogm::packetizer::tests::{data_packets, lacing_of, read_packets, drain};
    use crate::format::ogm::packetizer::Packetizer;
    use pretty_assertions::assert_eq;

    fn params() -> VideoParams {
        VideoParams {
            fourcc: *b"XVID",
            fps: 25.0,
            width: 640,
            height: 480,
            bits_per_sample: 24,
            max_frame_size: 1000,
        }
    }

    fn frame(p: &mut Packetizer, data: &[u8], num_frames: u32, key: bool, last: bool) -> ProcessStatus {
        p.process(PacketInput::Frame {
            data,
            num_frames,
            key,
            last,
        })
        .unwrap()
    }

    #[test]
    fn test_headers_and_frames() {
        let comments = CommentSet::from_user("test", ["TITLE=x"]);
        let mut p: Packetizer =
            VideoPacketizer::new(3, params(), Range::default(), comments, &Config::default())
                .unwrap()
                .into();

        frame(&mut p, &[1, 2, 3], 1, true, false);
        frame(&mut p, &[4, 5], 3, false, false);
        assert_eq!(frame(&mut p, &[6], 1, false, true), ProcessStatus::Finished);
        assert!(p.ended());

        let packets = read_packets(drain(&mut p));
        assert_eq!(packets.len(), 5);

        let header = StreamHeader::from_packet(&packets[0].data).unwrap();
        assert_eq!(header.kind, HeaderKind::Video);
        assert_eq!(header.time_unit, 400_000);
        assert_eq!(header.width(), 640);
        assert_eq!(header.buffersize, 1000);
        assert_eq!(CommentSet::parse(&packets[1].data).unwrap().get("TITLE"), Some("x"));

        assert_eq!(&packets[2].data[..], &[PACKET_IS_SYNCPOINT, 1, 2, 3]);
        assert_eq!(lacing_of(&packets[3]), 3);
        assert_eq!(&packets[3].data[..], &[0x40, 3, 4, 5]);
        assert!(packets[4].last_in_stream());
        assert_eq!(packets[4].absgp_page(), 4);
    }

    #[test]
    fn test_range_replaces_frames_with_eos() {
        // Packet numbers 0 and 1 are the headers, so a range starting at
        // packet 3 keeps the second frame only.
        let one_fps = VideoParams {
            fps: 1.0,
            ..params()
        };
        let range = Range::new(3.0, 4.0);
        let mut p: Packetizer =
            VideoPacketizer::new(3, one_fps, range, CommentSet::new("t"), &Config::default())
                .unwrap()
                .into();

        frame(&mut p, &[1], 1, true, false);
        frame(&mut p, &[2], 1, true, false);
        frame(&mut p, &[3], 1, false, false);
        frame(&mut p, &[4], 1, false, true);

        let packets = data_packets(&mut p);
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0].data[..], &[PACKET_IS_SYNCPOINT, 2]);
        assert_eq!(&packets[1].data[..], &[0]);
        assert!(packets[1].last_in_stream());
    }

    #[test]
    fn test_keyframe_starts_marked_page() {
        let mut p: Packetizer =
            VideoPacketizer::new(9, params(), Range::default(), CommentSet::new("t"), &Config::default())
                .unwrap()
                .into();
        frame(&mut p, &[1], 1, false, false);
        frame(&mut p, &[2], 1, true, false);
        p.produce_eos_packet().unwrap();

        let pages: Vec<_> = std::iter::from_fn(|| p.get_page()).collect();
        let marked: Vec<_> = pages.iter().filter(|page| page.keyframe_of == Some(9)).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].granulepos, 2);
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut p: Packetizer =
            VideoPacketizer::new(1, params(), Range::default(), CommentSet::new("t"), &Config::default())
                .unwrap()
                .into();
        let err = p
            .process(PacketInput::Frame {
                data: &[0u8; 1001],
                num_frames: 1,
                key: true,
                last: false,
            })
            .unwrap_err();
        assert!(matches!(err, OgmError::CapacityExceeded { size: 1001, max: 1000 }));
    }

    #[test]
    fn test_chapter_info_is_windowed() {
        let comments = CommentSet::from_user("t", ["CHAPTER01=00:00:00.000", "TITLE=y"]);
        let mut video =
            VideoPacketizer::new(1, params(), Range::new(60.0, 0.0), comments, &Config::default())
                .unwrap();
        video.set_chapter_info(CommentSet::from_user(
            "t",
            [
                "CHAPTER01=00:00:00.000",
                "CHAPTER01NAME=A",
                "CHAPTER02=00:02:00.000",
                "CHAPTER02NAME=B",
            ],
        ));
        let mut p: Packetizer = video.into();
        p.produce_header_packets().unwrap();

        let packets = read_packets(drain(&mut p));
        let comments = CommentSet::parse(&packets[1].data).unwrap();
        assert_eq!(comments.get("TITLE"), Some("y"));
        assert_eq!(comments.get("CHAPTER01"), Some("00:00:00.000"));
        assert_eq!(comments.get("CHAPTER01NAME"), Some("A (continued)"));
        assert_eq!(comments.get("CHAPTER02"), Some("00:01:00.000"));
    }
}
