#![forbid(unsafe_code)]

//! # doas-model
//!
//! Core data model for the NOVAC scanning-DOAS post-processing pipeline: spectra,
//! references, fit windows, scan results, plume geometry, wind/plume-height records,
//! and flux results. This crate has no I/O; it is consumed by `doas-decode`,
//! `doas-fit`, `doas-evaluate`, `doas-db`, `doas-geometry`, `doas-flux`, and the
//! `doas` driver.

pub mod data;
pub mod result;

pub use result::{Error, Result};
