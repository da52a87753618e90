//!
//! Contains the Result and Error types for `doas-db` operations.
//!

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("no wind field record covers time {0}")]
    NoWindFieldAtTime(String),
    #[error("no plume height record covers time {0}")]
    NoPlumeHeightAtTime(String),
    #[error("bilinear interpolation requires a regular grid; falling back to nearest is the caller's responsibility")]
    IrregularGrid,
    #[error("malformed wind field document: {0}")]
    MalformedDocument(String),
    #[error("xml read error: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("xml write error: {0}")]
    XmlWrite(#[from] xml::writer::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("doas-model error: {0}")]
    Model(#[from] doas_model::Error),
}
