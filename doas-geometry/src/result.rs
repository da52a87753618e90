//!
//! Contains the Result and Error types for `doas-geometry` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Rays miss by more than the 40 m threshold, or the fuzzy Newton iteration
    /// failed to converge within its iteration cap (spec §4.9, §7).
    #[error("geometry is ambiguous: {0}")]
    GeometryAmbiguous(String),
    #[error("dual-beam cross-correlation yielded fewer than the required good samples")]
    InsufficientGoodSamples,
    #[error("the two series passed to the dual-beam wind calculator have different sample intervals")]
    MismatchedSampleIntervals,
}
