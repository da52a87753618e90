//!
//! Wind and plume-height time/location databases (C8) for the NOVAC
//! post-processing pipeline, with XML (de)serialisation for the wind field
//! document format (spec §4.8, §6).
//!

#![forbid(unsafe_code)]

pub mod plume_db;
pub mod result;
pub mod wind_db;
pub mod xml;

pub use plume_db::PlumeHeightDatabase;
pub use result::{Error, Result};
pub use wind_db::{LookupMethod, WindDatabase};
pub use xml::{read_wind_database, write_wind_database};
