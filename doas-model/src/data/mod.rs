//!
//! The pipeline's data model: pure types shared by every other crate in the
//! workspace, with no I/O of their own.
//!

pub mod dark;
pub mod fit_window;
pub mod flux;
pub mod gps;
pub mod instrument;
pub mod molecule;
pub mod plume;
pub mod reference;
pub mod scan_result;
pub mod spectrum;
pub mod timestamp;
pub mod wind;

pub use dark::{ComponentOption, DarkSettings, DarkSpecOption};
pub use fit_window::{FitType, FitWindow};
pub use flux::{FluxErrorComponents, FluxQuality, FluxResult};
pub use gps::GpsPoint;
pub use instrument::{InstrumentHistory, InstrumentLocation, ScannerType};
pub use molecule::Molecule;
pub use plume::PlumeProperties;
pub use reference::{FitOption, Reference};
pub use scan_result::{
    EvaluationResult, MeasurementMode, ReferenceFitResult, ScanResult, SpectrumInfo, SpectrumMarks,
};
pub use spectrum::{Spectrum, SpectrumMetadata, MAX_SPECTRUM_LENGTH};
pub use timestamp::Timestamp;
pub use wind::{MeteorologySource, PlumeHeight, WindField};
