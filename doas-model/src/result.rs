//!
//! Contains the Result and Error types for `doas-model` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("spectrum length {length} plus start channel {start_channel} exceeds detector size {capacity}")]
    SpectrumTooLong {
        length: usize,
        start_channel: usize,
        capacity: usize,
    },
    #[error("spectra have mismatched lengths: {a} vs {b}")]
    LengthMismatch { a: usize, b: usize },
    #[error("pixel range [{low}, {high}] is empty or out of bounds for length {length}")]
    InvalidPixelRange {
        low: usize,
        high: usize,
        length: usize,
    },
    #[error("unknown molecule name: {0}")]
    UnknownMolecule(String),
    #[error("instrument location validity windows overlap for serial {serial}")]
    OverlappingValidityWindows { serial: String },
}
