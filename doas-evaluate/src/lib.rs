#![forbid(unsafe_code)]

//! # doas-evaluate
//!
//! The scan evaluator (C6) that orchestrates `doas-decode`/`doas-fit` across one
//! scan, and the plume property extractor (C7) that turns the resulting
//! column-vs-angle series into offset/centre/edges/completeness (spec §4.6, §4.7).

pub mod evaluator;
pub mod plume;
pub mod result;
pub mod settings;
mod sky;

pub use evaluator::evaluate;
pub use plume::extract_plume_properties;
pub use result::{Error, Result};
pub use settings::{EvaluationSettings, SkyOption};
