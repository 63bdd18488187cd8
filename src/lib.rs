#![doc(html_root_url = "https://docs.rs/ogmkit/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # ogmkit - OGM muxing toolkit
//!
//! `ogmkit` reads and writes OGM files: Ogg streams carrying audio, video
//! and subtitle streams behind a fixed binary stream header, alongside
//! plain Ogg Vorbis. Page framing is left to the [`ogg`] crate; this crate
//! deals with the OGM packet layer on top of it.
//!
//! ## Features
//!
//! - Building files from WAV, MP3, AC3, SRT and Ogg Vorbis inputs
//! - Concatenating files with matching streams, keeping them in sync
//! - Splitting by size, by time or at explicit cut points
//! - Extracting streams to WAV, MP3, AC3, SRT, Ogg Vorbis or raw files
//! - Listing streams, comments and packets
//!
//! Each of these has a command line front end under `src/bin`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ogmkit::format::ogm::info::{inspect, InfoOptions};
//! use ogmkit::format::ogm::stream::OgmReader;
//!
//! fn main() -> ogmkit::Result<()> {
//!     let reader = OgmReader::open("movie.ogm")?;
//!     let (listing, _) = inspect(reader, InfoOptions::default())?;
//!     print!("{}", listing);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: stream kinds and the packet type shared by all modules
//! - `codec`: frame header parsers for MP3, AC3 and Vorbis
//! - `format`: the page sink seam and the OGM implementation
//! - `config`: settings loaded from the environment and `ogmkit.toml`
//! - `error`: the error type and `Result` alias
//! - `utils`: bit reader used by the header parsers

/// Stream kinds and packets
pub mod av;

/// Frame and header parsers for the supported audio codecs
pub mod codec;

/// Error types and utilities
pub mod error;

/// Container formats
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use error::{OgmError, Result};
