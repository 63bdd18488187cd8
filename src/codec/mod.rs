//! Frame and header parsers for the compressed payloads OGM files carry.
//!
//! Nothing here decodes audio; the parsers only find frame boundaries and
//! read the parameters needed for stream headers and timing.

/// MPEG audio layer III frame headers
pub mod mp3;

/// AC-3 sync frame headers
pub mod ac3;

/// Vorbis identification header and codec seam
pub mod vorbis;

pub use ac3::Ac3Header;
pub use mp3::Mp3Header;
pub use vorbis::{SilenceEncoder, VorbisInfo};
