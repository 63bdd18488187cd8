//! # Utility Functions and Types
//!
//! Log setup for the command line tools, and the bit field reader used by
//! the frame header parsers in [`crate::codec`]:
//!
//! ```rust
//! use ogmkit::utils::BitReader;
//!
//! # fn main() -> ogmkit::Result<()> {
//! // An MPEG-1 layer III header
//! let mut reader = BitReader::new(&[0xFF, 0xFB, 0x90, 0x64])?;
//! assert_eq!(reader.read_bits(11)?, 0x7FF);
//! assert_eq!(reader.read_bits(2)?, 0b11); // version 1
//! assert_eq!(reader.read_bits(2)?, 0b01); // layer III
//! # Ok(())
//! # }
//! ```

/// Bit field reading for frame headers
pub mod bits;

/// Log subscriber setup for the binaries
pub mod logging;

pub use bits::*;
pub use logging::init_logging;
