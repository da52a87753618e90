//!
//! Contains the Result and Error types for `doas-evaluate` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("fit window '{0}' failed structural validation: {1}")]
    InvalidFitWindow(String, String),
    #[error("sky spectrum saturation {ratio:.3} is outside the accepted band ({min:.3}, {max:.3})")]
    SkySaturationOutOfBand { ratio: f64, min: f64, max: f64 },
    #[error("scan contains no usable measurement spectra")]
    NoMeasurementsFound,
    #[error("doas-model error: {0}")]
    Model(#[from] doas_model::Error),
    #[error("doas-decode error: {0}")]
    Decode(#[from] doas_decode::Error),
    #[error("doas-fit error: {0}")]
    Fit(#[from] doas_fit::Error),
}
