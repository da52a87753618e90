//!
//! Contains the Result and Error types for `doas-fit` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("reference file IO error")]
    FileError(#[from] std::io::Error),
    #[error("reference file has no numeric columns")]
    EmptyReferenceFile,
    #[error("reference file column count {0} is neither 1 nor 2")]
    UnsupportedColumnCount(usize),
    #[error("no dark spectrum available under the configured policy")]
    NoDarkAvailable,
    #[error("exposure time mismatch: measurement {measurement_ms} ms vs in-scan dark {dark_ms} ms")]
    ExposureTimeMismatch { measurement_ms: u32, dark_ms: u32 },
    #[error("DOAS fit did not converge after {iterations} iterations")]
    FitDidNotConverge { iterations: u32 },
    #[error("fit design matrix is ill-conditioned (singular to working precision)")]
    IllConditioned,
    #[error("fit window and spectrum lengths disagree: window [{fit_low}, {fit_high}] vs length {length}")]
    FitRangeOutOfBounds {
        fit_low: usize,
        fit_high: usize,
        length: usize,
    },
    #[error("doas-model error: {0}")]
    Model(#[from] doas_model::Error),
    #[error("doas-decode error: {0}")]
    Decode(#[from] doas_decode::Error),
}
