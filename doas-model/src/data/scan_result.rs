//!
//! Per-scan evaluation output (spec §3 "Scan result"): parallel arrays of
//! per-spectrum evaluation results, indexed by position in the scan.
//!

use crate::data::plume::PlumeProperties;
use crate::data::timestamp::Timestamp;
use std::collections::HashSet;

/// The DOAS fit outcome for one reference at one measurement angle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceFitResult {
    pub column: f64,
    pub column_error: f64,
    pub shift: f64,
    pub shift_error: f64,
    pub squeeze: f64,
    pub squeeze_error: f64,
}

/// The full fit outcome for one measurement spectrum: one [ReferenceFitResult] per
/// reference in the fit window, plus overall residual statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationResult {
    pub references: Vec<ReferenceFitResult>,
    pub delta: f64,
    pub chi_square: f64,
}

impl EvaluationResult {
    /// The result for the species at `index`, if present.
    pub fn reference(&self, index: usize) -> Option<&ReferenceFitResult> {
        self.references.get(index)
    }
}

/// Per-spectrum metadata retained in a scan result independent of the fit outcome.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrumInfo {
    pub scan_angle: f64,
    pub scan_angle_2: f64,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub exposure_time_ms: u32,
    pub coadds: u32,
    pub temperature: f64,
    pub battery_voltage: f64,
}

/// What kind of measurement a scan's spectra represent (spec §3 "measurement-mode
/// classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeasurementMode {
    Flux,
    WindSpeed,
    Stratosphere,
    DirectSun,
    Composition,
    Lunar,
    Troposphere,
    MaxDoas,
    Unknown,
}

/// The per-spectrum bookkeeping flags a scan result tracks beyond the fit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrumMarks {
    pub deleted: bool,
    pub bad_evaluation: bool,
}

/// The complete output of evaluating one scan (spec §3 "Scan result", §4.6).
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub evaluations: Vec<EvaluationResult>,
    pub spectrum_info: Vec<SpectrumInfo>,
    pub marks: Vec<SpectrumMarks>,
    pub corrupted_indices: HashSet<u16>,
    pub measurement_mode: Option<MeasurementMode>,
    pub instrument_serial: String,
    pub plume_properties: Option<PlumeProperties>,
    pub rejection_reason: Option<String>,
}

impl ScanResult {
    pub fn new(instrument_serial: impl Into<String>) -> Self {
        Self {
            evaluations: Vec::new(),
            spectrum_info: Vec::new(),
            marks: Vec::new(),
            corrupted_indices: HashSet::new(),
            measurement_mode: None,
            instrument_serial: instrument_serial.into(),
            plume_properties: None,
            rejection_reason: None,
        }
    }

    pub fn push(&mut self, eval: EvaluationResult, info: SpectrumInfo, marks: SpectrumMarks) {
        self.evaluations.push(eval);
        self.spectrum_info.push(info);
        self.marks.push(marks);
    }

    pub fn len(&self) -> usize {
        self.evaluations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    /// Column series for `reference_index`, with `angle`, excluding deleted and
    /// bad-evaluation points, for consumption by the plume property extractor (C7).
    pub fn good_column_series(&self, reference_index: usize) -> Vec<(f64, f64, f64)> {
        self.evaluations
            .iter()
            .zip(self.spectrum_info.iter())
            .zip(self.marks.iter())
            .filter(|(_, marks)| !marks.deleted && !marks.bad_evaluation)
            .filter_map(|((eval, info), _)| {
                eval.reference(reference_index)
                    .map(|r| (info.scan_angle, r.column, r.column_error))
            })
            .collect()
    }

    /// Total count invariant (testable property 1): accepted + rejected + corrupted
    /// equals total read. `total_read` is the count the scan reader reported.
    pub fn accounts_for(&self, total_read: usize) -> bool {
        let accepted = self
            .marks
            .iter()
            .filter(|m| !m.deleted && !m.bad_evaluation)
            .count();
        let rejected = self.marks.iter().filter(|m| m.bad_evaluation).count();
        let corrupted = self.corrupted_indices.len();
        accepted + rejected + corrupted == total_read
    }
}
