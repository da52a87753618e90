//!
//! Plume geometry solvers for the NOVAC post-processing pipeline (spec §4.9
//! "Geometry", §4.10 "Dual-beam wind calculator"): the closed-form two-instrument
//! ray intersection, its Newton-iterated fuzzy fallback, the single-instrument
//! altitude/wind-direction conversion used by both, and the dual-beam
//! cross-correlation wind speed estimator.
//!

#![forbid(unsafe_code)]

pub mod dual_beam;
pub mod fuzzy;
pub mod ray;
pub mod result;
pub mod single_instrument;
pub mod two_instrument;

pub use dual_beam::{calculate_delay, distance_at_plume, wind_speed, ColumnSeries, DualBeamSettings};
pub use fuzzy::FuzzyResult;
pub use ray::Ray;
pub use result::{Error, Result};
pub use single_instrument::{altitude_given_wind_direction, wind_direction_given_altitude};
pub use two_instrument::{PlumeCentreObservation, TwoInstrumentResult};
