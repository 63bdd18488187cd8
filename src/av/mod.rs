/// Kind of elementary stream carried in an OGM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Native Vorbis audio with its three header packets.
    Vorbis,
    /// Legacy audio (PCM, MP3, AC3, ...).
    Audio,
    /// Legacy video.
    Video,
    /// Plain text subtitles.
    Text,
    /// Bitmap subtitles (vobsub).
    Image,
    /// Seek index referencing a video stream.
    Index,
}

impl StreamKind {
    /// Single letter used in stream listings and demuxed file names. Vorbis
    /// shares the audio letter and numbering.
    pub fn letter(&self) -> char {
        match self {
            StreamKind::Vorbis => 'a',
            StreamKind::Audio => 'a',
            StreamKind::Video => 'v',
            StreamKind::Text => 't',
            StreamKind::Image => 'i',
            StreamKind::Index => 'x',
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, StreamKind::Text | StreamKind::Image)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, StreamKind::Vorbis | StreamKind::Audio)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Vorbis => "vorbis",
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
            StreamKind::Text => "text",
            StreamKind::Image => "image",
            StreamKind::Index => "index",
        }
    }
}

mod packet;
pub use packet::*;
