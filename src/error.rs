use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OgmError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ogg read error: {0}")]
    OggRead(#[from] ogg::OggReadError),

    #[error("unknown stream type '{0}'")]
    UnknownStreamType(String),

    #[error("comment packet is truncated")]
    TruncatedComment,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("invalid cut or split argument: {0}")]
    InvalidCutOrSplitArgument(String),

    #[error("{size} bytes exceed the limit of {max} bytes")]
    CapacityExceeded { size: usize, max: usize },

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("parse float error: {0}")]
    ParseFloat(#[from] ParseFloatError),
}

impl OgmError {
    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OgmError::File {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OgmError>;
