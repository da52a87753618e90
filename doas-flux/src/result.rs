//!
//! Contains the Result and Error types for `doas-flux` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("measurement mode is not flux, cannot calculate flux")]
    NotAFluxMeasurement,
    #[error("scan does not see the plume, no flux can be calculated")]
    PlumeNotSeen,
    #[error("scan completeness {completeness:.2} is below the configured limit of {limit:.2}")]
    CompletenessTooLow { completeness: f64, limit: f64 },
    #[error("plume altitude {plume_altitude_m:.0} m is at or below the instrument altitude, no flux can be calculated")]
    NonPositivePlumeHeight { plume_altitude_m: f64 },
    #[error("requested reference species not present in this scan's fit window")]
    SpeciesNotFitted,
    #[error("too few good data points ({found}, need at least {required}) to calculate a flux")]
    TooFewGoodDataPoints { found: usize, required: usize },
}
