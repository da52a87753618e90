//!
//! Contains the Result and Error types for `doas-decode` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("pak file IO error")]
    FileError(#[from] std::io::Error),
    #[error("missing MKZY record tag at byte offset {offset}")]
    MissingTag { offset: u64 },
    #[error("spectrum checksum mismatch: expected {expected:04x}, got {actual:04x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
    #[error("decompressed sample count {actual} does not match declared pixel count {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },
    #[error("invalid packed date/time value {0}")]
    InvalidPackedTime(u32),
    #[error("unexpected end of file while reading a spectrum record")]
    UnexpectedEof,
    #[error("no dark or sky spectrum found matching the requested kind")]
    SpectrumNotFound,
    #[error("{0}")]
    Other(String),
}
