//!
//! Contains the Result and Error types for the `doas` driver (C12, spec §7): the
//! driver-level kinds (`ConfigurationInvalid`, `InputUnreachable`) plus every
//! sub-crate's error wrapped via `#[from]`, the same way `nexrad`'s top crate wraps
//! `nexrad_data::Error` and `nexrad_decode::Error`.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("configuration is invalid: {0}")]
    ConfigurationInvalid(String),
    #[error("input unreachable: {0}")]
    InputUnreachable(String),
    #[error("doas-model error: {0}")]
    Model(#[from] doas_model::Error),
    #[error("doas-decode error: {0}")]
    Decode(#[from] doas_decode::Error),
    #[error("doas-fit error: {0}")]
    Fit(#[from] doas_fit::Error),
    #[error("doas-evaluate error: {0}")]
    Evaluate(#[from] doas_evaluate::Error),
    #[error("doas-db error: {0}")]
    Db(#[from] doas_db::Error),
    #[error("doas-geometry error: {0}")]
    Geometry(#[from] doas_geometry::Error),
    #[error("doas-flux error: {0}")]
    Flux(#[from] doas_flux::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
