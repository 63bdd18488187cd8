use super::{PACKET_TYPE_BITS, PACKET_TYPE_COMMENT};
use crate::{OgmError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Bytes before the vendor length: type byte plus `vorbis`.
const COMMENT_MARKER_LEN: usize = 7;

/// An ordered list of `key=value` comments plus a vendor string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentSet {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl CommentSet {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            comments: Vec::new(),
        }
    }

    /// Builds a set from user supplied `key=value` strings.
    pub fn from_user<I, S>(vendor: impl Into<String>, comments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vendor: vendor.into(),
            comments: comments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.comments.iter().map(String::as_str)
    }

    /// Value of the first comment with the given key, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find_map(|comment| {
            let (k, v) = comment.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }

    /// Removes every comment whose key equals `tag`.
    pub fn remove_tag(&mut self, tag: &str) {
        let prefix = format!("{}=", tag);
        self.comments.retain(|comment| !comment.starts_with(&prefix));
    }

    /// Appends the comments of another set, keeping this set's vendor.
    pub fn extend(&mut self, other: &CommentSet) {
        self.comments.extend(other.comments.iter().cloned());
    }

    /// Parses a comment packet. Every length is checked against the buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let marker = buf.get(..COMMENT_MARKER_LEN).ok_or(OgmError::TruncatedComment)?;
        if marker[0] & PACKET_TYPE_BITS != PACKET_TYPE_COMMENT || &marker[1..] != b"vorbis" {
            return Err(OgmError::MalformedHeader(format!(
                "not a comment packet (type byte 0x{:02x})",
                marker[0]
            )));
        }
        let mut pos = COMMENT_MARKER_LEN;
        let vendor_len = read_len(buf, &mut pos)?;
        let vendor = read_string(buf, &mut pos, vendor_len)?;
        let count = read_len(buf, &mut pos)?;

        // A count larger than the remaining bytes can describe is truncated.
        if count > (buf.len() - pos) / 4 {
            return Err(OgmError::TruncatedComment);
        }

        let mut comments = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_len(buf, &mut pos)?;
            comments.push(read_string(buf, &mut pos, len)?);
        }

        Ok(CommentSet { vendor, comments })
    }

    /// Serialized size including the trailing framing byte.
    pub fn encoded_len(&self) -> usize {
        COMMENT_MARKER_LEN
            + 4
            + self.vendor.len()
            + 4
            + self.comments.iter().map(|c| 4 + c.len()).sum::<usize>()
            + 1
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(PACKET_TYPE_COMMENT);
        buf.put_slice(b"vorbis");
        buf.put_u32_le(self.vendor.len() as u32);
        buf.put_slice(self.vendor.as_bytes());
        buf.put_u32_le(self.comments.len() as u32);
        for comment in &self.comments {
            buf.put_u32_le(comment.len() as u32);
            buf.put_slice(comment.as_bytes());
        }
        buf.put_u8(1);
    }

    pub fn to_packet(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

fn read_len(buf: &[u8], pos: &mut usize) -> Result<usize> {
    let end = pos.checked_add(4).ok_or(OgmError::TruncatedComment)?;
    let raw = buf.get(*pos..end).ok_or(OgmError::TruncatedComment)?;
    *pos = end;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
}

fn read_string(buf: &[u8], pos: &mut usize, len: usize) -> Result<String> {
    let end = pos.checked_add(len).ok_or(OgmError::TruncatedComment)?;
    let raw = buf.get(*pos..end).ok_or(OgmError::TruncatedComment)?;
    *pos = end;
    Ok(String::from_utf8_lossy(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_wire_layout() {
        let set = CommentSet::from_user("v", ["A=b"]);
        let packet = set.to_packet();
        assert_eq!(
            &packet[..],
            &[
                0x03, b'v', b'o', b'r', b'b', b'i', b's', 1, 0, 0, 0, b'v', 1, 0, 0, 0, 3, 0, 0,
                0, b'A', b'=', b'b', 1
            ]
        );
        assert_eq!(packet.len(), set.encoded_len());
    }

    #[test]
    fn test_empty_vendor_and_comments() {
        let set = CommentSet::new("");
        assert_eq!(CommentSet::parse(&set.to_packet()).unwrap(), set);
    }

    #[test]
    fn test_truncation_is_detected() {
        let packet = CommentSet::from_user("vendor", ["TITLE=x", "LANGUAGE=en"]).to_packet();
        // Cutting before the framing byte leaves a complete set.
        assert!(CommentSet::parse(&packet[..packet.len() - 1]).is_ok());
        for cut in 0..packet.len() - 1 {
            assert!(
                matches!(CommentSet::parse(&packet[..cut]), Err(OgmError::TruncatedComment)),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_rejects_other_packets() {
        let mut packet = CommentSet::from_user("v", ["A=b"]).to_packet().to_vec();
        packet[0] = 0x01;
        assert!(matches!(CommentSet::parse(&packet), Err(OgmError::MalformedHeader(_))));

        let mut packet = CommentSet::new("v").to_packet().to_vec();
        packet[1..7].copy_from_slice(b"theora");
        assert!(matches!(CommentSet::parse(&packet), Err(OgmError::MalformedHeader(_))));
    }

    #[test]
    fn test_huge_count_is_truncated() {
        let mut packet = CommentSet::new("v").to_packet().to_vec();
        packet[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(CommentSet::parse(&packet), Err(OgmError::TruncatedComment)));
    }

    #[test]
    fn test_lookup_and_remove() {
        let mut set = CommentSet::from_user("v", ["LANGUAGE=German", "TITLE=x", "LANGUAGE=en"]);
        assert_eq!(set.get("language"), Some("German"));
        set.remove_tag("LANGUAGE");
        assert_eq!(set.comments, vec!["TITLE=x".to_string()]);
        set.extend(&CommentSet::from_user("other", ["A=1"]));
        assert_eq!(set.len(), 2);
        assert_eq!(set.vendor, "v");
    }

    #[quickcheck]
    fn prop_comment_round_trip(vendor: String, comments: Vec<String>) -> bool {
        let set = CommentSet { vendor, comments };
        CommentSet::parse(&set.to_packet()).ok() == Some(set)
    }
}
