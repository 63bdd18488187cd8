use super::{PACKET_TYPE_BITS, PACKET_TYPE_CODEBOOK, PACKET_TYPE_COMMENT, PACKET_TYPE_HEADER};
use crate::{OgmError, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Fixed part of an Ogg page header, before the segment table.
pub const PAGE_HEADER_FIXED: usize = 27;

const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// Which header packet a page carries, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageKind {
    #[default]
    Data,
    Header,
    Comment,
    Codebook,
}

impl PageKind {
    /// Classifies a packet by its first byte.
    pub fn of_packet(flags: u8) -> Self {
        match flags & PACKET_TYPE_BITS {
            PACKET_TYPE_HEADER => PageKind::Header,
            PACKET_TYPE_COMMENT => PageKind::Comment,
            PACKET_TYPE_CODEBOOK => PageKind::Codebook,
            _ => PageKind::Data,
        }
    }

    pub fn is_header_class(&self) -> bool {
        *self != PageKind::Data
    }
}

/// A complete Ogg page plus the bookkeeping needed to interleave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Header and body bytes as they go to the file.
    pub data: Bytes,
    pub header_len: usize,
    pub serial: u32,
    pub granulepos: i64,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    pub kind: PageKind,
    /// Set when the page starts with a keyframe of the given stream.
    pub keyframe_of: Option<u32>,
}

impl Page {
    /// Parses one page from the start of `data`, which must hold exactly
    /// that page.
    pub fn parse(data: Bytes) -> Result<Self> {
        let header_len = header_len(&data)?.ok_or_else(|| {
            OgmError::MalformedStream("incomplete Ogg page header".into())
        })?;
        let mut fields = &data[6..18];
        let granulepos = fields.get_i64_le();
        let serial = fields.get_u32_le();
        Ok(Page {
            data,
            header_len,
            serial,
            granulepos,
            timestamp: 0,
            kind: PageKind::Data,
            keyframe_of: None,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn body_len(&self) -> usize {
        self.data.len() - self.header_len
    }

    pub fn is_bos(&self) -> bool {
        self.data[5] & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.data[5] & FLAG_EOS != 0
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_kind(mut self, kind: PageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_keyframe_of(mut self, serial: Option<u32>) -> Self {
        self.keyframe_of = serial;
        self
    }
}

/// Header length of the page at the start of `data`, or `None` if more
/// bytes are needed to know it.
fn header_len(data: &[u8]) -> Result<Option<usize>> {
    if data.len() < PAGE_HEADER_FIXED {
        return Ok(None);
    }
    if &data[0..4] != b"OggS" {
        return Err(OgmError::MalformedStream("missing Ogg capture pattern".into()));
    }
    let segments = data[26] as usize;
    if data.len() < PAGE_HEADER_FIXED + segments {
        return Ok(None);
    }
    Ok(Some(PAGE_HEADER_FIXED + segments))
}

/// Splits every complete page off the front of `buf`.
pub fn split_pages(buf: &mut BytesMut) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    while let Some(header) = header_len(&buf[..])? {
        let body: usize = buf[PAGE_HEADER_FIXED..header].iter().map(|&b| b as usize).sum();
        if buf.len() < header + body {
            break;
        }
        pages.push(Page::parse(buf.split_to(header + body).freeze())?);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogg::{PacketWriteEndInfo, PacketWriter};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_written_pages() {
        let mut writer = PacketWriter::new(Vec::new());
        writer
            .write_packet(vec![1u8; 300], 7, PacketWriteEndInfo::EndPage, 10)
            .unwrap();
        writer
            .write_packet(vec![2u8; 10], 7, PacketWriteEndInfo::EndStream, 20)
            .unwrap();

        let mut buf = BytesMut::from(&writer.inner_mut()[..]);
        buf.extend_from_slice(b"OggS\0"); // start of a page still being read
        let pages = split_pages(&mut buf).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(buf.len(), 5);
        assert_eq!(pages[0].serial, 7);
        assert_eq!(pages[0].granulepos, 10);
        assert_eq!(pages[0].body_len(), 300);
        assert_eq!(pages[0].header_len, PAGE_HEADER_FIXED + 2);
        assert!(pages[0].is_bos());
        assert!(pages[1].is_eos());
        assert_eq!(pages[1].granulepos, 20);
    }

    #[test]
    fn test_rejects_garbage() {
        let mut buf = BytesMut::from(&[0u8; 40][..]);
        assert!(split_pages(&mut buf).is_err());
    }

    #[test]
    fn test_page_kinds() {
        assert_eq!(PageKind::of_packet(0x01), PageKind::Header);
        assert_eq!(PageKind::of_packet(0x03), PageKind::Comment);
        assert_eq!(PageKind::of_packet(0x05), PageKind::Codebook);
        assert_eq!(PageKind::of_packet(0x88), PageKind::Data);
        assert!(!PageKind::Data.is_header_class());
    }
}
