//!
//! Per-run evaluator configuration (spec §4.6, §6 "Processing document"): the handful
//! of numeric thresholds and the sky-acquisition policy. Kept separate from
//! `doas-model`'s data model because these are processing-run settings, not a
//! per-instrument or per-spectrum data type.
//!

/// How the sky spectrum used as the fit's reference intensity is obtained (spec §6
/// "skyOption").
#[derive(Debug, Clone, PartialEq)]
pub enum SkyOption {
    /// The scan's own recorded "sky" spectrum.
    Scan,
    /// Average of every credible (unsaturated, non-dark) spectrum in the scan.
    AverageOfGood,
    /// A specific spectrum index within the scan.
    Index(usize),
    /// A spectrum supplied from outside the scan entirely.
    User(String),
}

/// Per-spectrometer-model full dynamic range (maximum ADC count), used to compute
/// saturation ratios (spec §4.6 "per-model dynamic range"). Falls back to the
/// USB2000/S2000 12-bit default for unrecognised models, matching
/// `CSpectrometerModel::GetMaxIntensity`'s behaviour of a generic default entry.
pub fn dynamic_range_for_model(model: &str) -> f64 {
    match model {
        "QE65000" | "QE65Pro" => 65535.0,
        "USB4000" => 65535.0,
        "USB2000" | "USB2000+" | "S2000" | "HR2000" | "HR2000+" => 4095.0,
        "Maya2000Pro" => 65535.0,
        _ => 4095.0,
    }
}

/// Thresholds and policy knobs the scan evaluator (C6) needs beyond the fit window
/// and dark settings it is already handed (spec §4.6, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSettings {
    pub sky_option: SkyOption,
    /// Fraction of the per-model dynamic range a spectrum's fit-region intensity must
    /// clear to be evaluated rather than ignored as under-exposed. Typically 0.05.
    pub minimum_saturation_in_fit_region: f64,
    /// Upper saturation bound a spectrum must stay under to be considered usable
    /// (neither under- nor over-exposed). Typically 0.9-0.95.
    pub maximum_saturation_in_fit_region: f64,
    /// χ² above which a fit is accepted as a bad evaluation rather than rejected
    /// outright (spec §4.6 "goodness-of-fit check").
    pub chi_square_limit: f64,
    pub find_optimal_shift: bool,
    /// Whether scan spectra have already been divided by their coadd count by the
    /// acquisition software, so the evaluator must not divide again.
    pub already_averaged: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            sky_option: SkyOption::Scan,
            minimum_saturation_in_fit_region: 0.05,
            maximum_saturation_in_fit_region: 0.95,
            chi_square_limit: 10.0,
            find_optimal_shift: false,
            already_averaged: false,
        }
    }
}
