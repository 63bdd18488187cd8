//! OGM: legacy audio, video and subtitle streams inside the Ogg container.
//!
//! Every logical stream starts with a header packet, a comment packet and,
//! for Vorbis, a codebook packet. The low bits of the first byte of each
//! packet tell these apart from data packets, which begin with a length
//! prefix (see [`lacing`]).

/// Legacy binary stream header
pub mod header;

/// Length prefix of data packets
pub mod lacing;

/// Comment packets
pub mod comments;

/// Chapter entries inside comment packets and chapter files
pub mod chapters;

/// Timestamp derivation for page interleaving
pub mod clock;

/// Pages as produced by a packetizer queue
pub mod page;

/// Packet to page queue
pub mod queue;

/// Per-stream packetizers
pub mod packetizer;

/// Lowest-timestamp-wins page multiplexer
pub mod mux;

/// Stream discovery from begin-of-stream packets
pub mod stream;

/// Subtitle cue lists and SRT parsing
pub mod subtitles;

/// Input readers for building new files
pub mod merge;

/// Concatenation of files with matching streams
pub mod cat;

/// Splitting by size, time or explicit cuts
pub mod split;

/// Extraction of streams into standalone files
pub mod demux;

/// Stream and packet inspection
pub mod info;

pub const PACKET_TYPE_HEADER: u8 = 0x01;
pub const PACKET_TYPE_COMMENT: u8 = 0x03;
pub const PACKET_TYPE_CODEBOOK: u8 = 0x05;
pub const PACKET_TYPE_BITS: u8 = 0x07;
pub const PACKET_LEN_BITS01: u8 = 0xC0;
pub const PACKET_LEN_BITS2: u8 = 0x02;
pub const PACKET_IS_SYNCPOINT: u8 = 0x08;

/// Returns true for header, comment and codebook packets.
pub fn is_header_class(flags: u8) -> bool {
    flags & PACKET_TYPE_HEADER != 0
}

/// Display helper for `HH:MM:SS.mmm` timestamps given in milliseconds.
pub fn format_ms(ms: i64, separator: char) -> String {
    let ms = ms.max(0);
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        separator,
        ms % 1000
    )
}

pub use chapters::{adjust_chapters, strip_chapters};
pub use comments::CommentSet;
pub use header::{HeaderKind, StreamHeader};
pub use mux::Multiplexer;
pub use page::{Page, PageKind};
pub use packetizer::{AudioSync, PacketInput, Packetizer, ProcessStatus, Range};
pub use queue::Queue;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0, '.'), "00:00:00.000");
        assert_eq!(format_ms(3_723_004, ','), "01:02:03,004");
        assert_eq!(format_ms(-5, '.'), "00:00:00.000");
    }

    #[test]
    fn test_header_class() {
        assert!(is_header_class(PACKET_TYPE_HEADER));
        assert!(is_header_class(PACKET_TYPE_COMMENT));
        assert!(is_header_class(PACKET_TYPE_CODEBOOK));
        assert!(!is_header_class(PACKET_IS_SYNCPOINT | 0x80));
    }
}
