//! Length prefix ("lacing") at the start of OGM data packets.
//!
//! Bits `0xC0` of the first byte hold bits 0-1 and bit `0x02` holds bit 2 of
//! the number of little-endian bytes that follow. Those bytes give a frame
//! count, a sample count or a duration depending on the stream. A prefix of
//! zero bytes stands for a count of one.

use super::{PACKET_LEN_BITS01, PACKET_LEN_BITS2};
use crate::{OgmError, Result};
use bytes::{BufMut, BytesMut};

/// Widest prefix the three length bits can describe.
pub const MAX_LACING_BYTES: usize = 7;

/// Encodes a prefix width into the length bits of the first packet byte.
pub fn len_bits(width: usize) -> u8 {
    ((((width & 3) << 6) | ((width & 4) >> 1)) & 0xFF) as u8
}

/// Number of prefix bytes announced by the first packet byte.
pub fn width_from_flags(flags: u8) -> usize {
    (((flags & PACKET_LEN_BITS01) >> 6) | ((flags & PACKET_LEN_BITS2) << 1)) as usize
}

/// Smallest prefix width able to hold `value`.
pub fn minimal_width(value: u64) -> usize {
    if value == 1 {
        return 0;
    }
    (1..MAX_LACING_BYTES)
        .find(|&width| value < 1u64 << (8 * width))
        .unwrap_or(MAX_LACING_BYTES)
}

/// Writes the first packet byte (`flags` plus the length bits) followed by
/// `value` in the minimal number of bytes.
pub fn put_lacing(buf: &mut BytesMut, flags: u8, value: u64) -> Result<()> {
    let width = minimal_width(value);
    put_fixed_lacing(buf, flags, value, width)
}

/// Like [`put_lacing`] with an explicit prefix width.
pub fn put_fixed_lacing(buf: &mut BytesMut, flags: u8, value: u64, width: usize) -> Result<()> {
    let fits = match width {
        0 => value == 1,
        1..=MAX_LACING_BYTES => value >> (8 * width) == 0,
        _ => false,
    };
    if !fits {
        return Err(OgmError::InvalidInput(format!(
            "lacing value {} does not fit into {} bytes",
            value, width
        )));
    }
    buf.put_u8((flags & !(PACKET_LEN_BITS01 | PACKET_LEN_BITS2)) | len_bits(width));
    for i in 0..width {
        buf.put_u8(((value >> (8 * i)) & 0xFF) as u8);
    }
    Ok(())
}

/// Encodes a complete prefix into a new buffer.
pub fn encode_lacing(flags: u8, value: u64) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(1 + MAX_LACING_BYTES);
    put_lacing(&mut buf, flags, value)?;
    Ok(buf)
}

/// Decodes the prefix of a data packet.
///
/// Returns the prefix width and the value. The payload starts at
/// `1 + width`.
pub fn decode_lacing(packet: &[u8]) -> Result<(usize, u64)> {
    let flags = *packet
        .first()
        .ok_or_else(|| OgmError::MalformedStream("empty packet".into()))?;
    let width = width_from_flags(flags);
    if packet.len() < 1 + width {
        return Err(OgmError::MalformedStream(format!(
            "packet of {} bytes is too short for a {} byte length prefix",
            packet.len(),
            width
        )));
    }
    if width == 0 {
        return Ok((0, 1));
    }
    let value = packet[1..=width]
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);
    Ok((width, value))
}
