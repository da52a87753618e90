#![forbid(unsafe_code)]

//! # doas-decode
//!
//! Reads MKZY-framed `.pak` scan files: record header parsing, the delta-coded
//! sample payload (via a documented stand-in for the out-of-scope MKPack codec),
//! and the scan reader that streams spectra in acquisition order (spec §4.2, §6).

mod mkpack;
pub mod pak;
mod reader;
pub mod result;

#[cfg(test)]
mod test_support;

pub use pak::{RecordHeader, RECORD_TAG};
pub use reader::{ScanReader, SpectrumKind};
pub use result::{Error, Result};
