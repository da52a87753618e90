//!
//! Configuration document loading (spec §6 "Configuration files (XML)"): Setup,
//! Evaluation, and Processing documents, parsed with the `xml` crate's pull/SAX
//! `EventReader`, the same idiom `doas-db::xml` uses for the wind field document
//! and the teacher uses for S3 list-objects XML. XML loading itself is named as an
//! "external collaborator" by spec.md §1, but the driver needs a concrete reader to
//! be runnable at all, matching `nexrad`'s CLI/logging ambient layer existing
//! alongside its out-of-scope ingestion policy.
//!

pub mod evaluation;
pub mod processing;
pub mod setup;

pub use evaluation::{load_evaluation_document, InstrumentEvaluation};
pub use processing::{apply_cli_overrides, load_processing_document, ProcessingConfig, ProcessingMode};
pub use setup::load_setup_document;
