//! Frame scanning and A/V sync shared by the MP3 and AC3 packetizers.

use crate::codec::{ac3, mp3, Ac3Header, Mp3Header};
use crate::format::ogm::lacing::put_fixed_lacing;
use crate::format::ogm::PACKET_IS_SYNCPOINT;
use crate::{OgmError, Result};
use bytes::{Bytes, BytesMut};

/// Builds a data packet for one frame: a syncpoint byte with a two byte
/// sample count, then the frame.
pub(crate) fn frame_packet(samples: u32, frame: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(3 + frame.len());
    put_fixed_lacing(&mut buf, PACKET_IS_SYNCPOINT, samples as u64, 2)?;
    buf.extend_from_slice(frame);
    Ok(buf.freeze())
}

/// A compressed audio frame header that can be searched for in a byte stream.
pub(crate) trait FrameHeader: Copy {
    fn find(data: &[u8]) -> Option<(usize, Self)>;
    /// Complete frame length including the header.
    fn frame_size(&self) -> usize;
    fn ms_per_frame(&self) -> f64;
}

impl FrameHeader for Mp3Header {
    fn find(data: &[u8]) -> Option<(usize, Self)> {
        mp3::find_header(data)
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn ms_per_frame(&self) -> f64 {
        Mp3Header::ms_per_frame(self)
    }
}

impl FrameHeader for Ac3Header {
    fn find(data: &[u8]) -> Option<(usize, Self)> {
        ac3::find_header(data)
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn ms_per_frame(&self) -> f64 {
        Ac3Header::ms_per_frame(self)
    }
}

/// Growable input buffer with a hard size limit.
pub(crate) struct FrameBuffer {
    buf: BytesMut,
    max: usize,
}

impl FrameBuffer {
    pub(crate) fn new(max: usize) -> Self {
        FrameBuffer {
            buf: BytesMut::new(),
            max,
        }
    }

    pub(crate) fn add(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > self.max {
            return Err(OgmError::MalformedStream(format!(
                "no complete audio frame within {} bytes",
                self.max
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Locates the next complete frame without consuming it.
    fn locate<H: FrameHeader>(&self) -> Option<(usize, H)> {
        let (pos, header) = H::find(&self.buf)?;
        (pos + header.frame_size() <= self.buf.len()).then_some((pos, header))
    }

    pub(crate) fn frame_available<H: FrameHeader>(&self) -> bool {
        self.locate::<H>().is_some()
    }

    /// Removes and returns the next complete frame, dropping any garbage in
    /// front of it.
    pub(crate) fn next_frame<H: FrameHeader>(&mut self) -> Option<(H, Bytes)> {
        let (pos, header) = self.locate::<H>()?;
        if pos > 0 {
            log::warn!("skipping {} bytes (no valid frame header found)", pos);
            let _ = self.buf.split_to(pos);
        }
        Some((header, self.buf.split_to(header.frame_size()).freeze()))
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Applies a millisecond displacement at frame granularity.
pub(crate) struct FrameSync {
    displacement: f64,
}

impl FrameSync {
    pub(crate) fn new(displacement_ms: i64) -> Self {
        FrameSync {
            displacement: displacement_ms as f64,
        }
    }

    /// True if the frame has to be dropped to start the audio later.
    pub(crate) fn drop_frame(&mut self, ms_per_frame: f64) -> bool {
        if self.displacement >= 0.0 {
            return false;
        }
        self.displacement += ms_per_frame;
        if self.displacement > -(ms_per_frame / 2.0) {
            self.displacement = 0.0;
        }
        true
    }

    /// Number of padding frames to put in front of the first frame so that
    /// they cover the displacement. Returns a non-zero count only once.
    pub(crate) fn padding_frames(&mut self, ms_per_frame: f64) -> u64 {
        if self.displacement <= 0.0 {
            return 0;
        }
        let count = (self.displacement / ms_per_frame).ceil() as u64;
        self.displacement = 0.0;
        count
    }
}
