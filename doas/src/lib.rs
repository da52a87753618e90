//!
//! # doas
//! Batch post-processing driver (C12) for the NOVAC scanning-DOAS pipeline:
//! configuration loading, local file discovery, worker pool, evaluation/geometry/flux
//! orchestration, and output writing. `main.rs` is a thin wrapper over this crate: it
//! parses the CLI, loads the three configuration documents, and calls [pipeline::run].
//!

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod discovery;
pub mod output;
pub mod pipeline;
pub mod result;
pub mod tally;

pub use result::{Error, Result};
