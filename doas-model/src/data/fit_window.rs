//!
//! Named fit window configuration (spec §3) and the dark/offset policy it is paired
//! with at evaluation time.
//!

use crate::data::reference::Reference;
use crate::data::timestamp::Timestamp;

/// The target-spectrum transform a fit window is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitType {
    /// `y = high_pass(-ln(measurement / sky))`.
    HighPassDivide,
    /// `y = -ln(measurement / sky) - smooth(-ln(measurement / sky))`.
    HighPassSubtract,
    /// Polynomial fit directly on optical depth, no high-pass step.
    PolynomialOnOpticalDepth,
    /// No filtering at all.
    NoFilter,
}

/// A named, validity-windowed fit configuration (spec §3 "Fit window").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitWindow {
    pub name: String,
    pub fit_low: usize,
    pub fit_high: usize,
    pub polynomial_order: u32,
    pub fit_type: FitType,
    pub spectrometer_channel: u16,
    pub spectrum_length: usize,
    pub interlace_step: u16,
    pub start_channel: u16,
    pub references: Vec<Reference>,
    pub fraunhofer_reference: Option<Reference>,
    pub child_windows: Vec<FitWindow>,
    pub auto_shift: bool,
    pub sky_shift: bool,
    pub offset_removal_range: Option<(usize, usize)>,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
}

impl FitWindow {
    /// Structural validity per spec §4.6 "Setup phase": non-empty pixel range, at
    /// least one reference, no duplicate reference source paths.
    pub fn validate(&self) -> Result<(), String> {
        if self.fit_high <= self.fit_low {
            return Err(format!(
                "fit window '{}' has empty pixel range [{}, {}]",
                self.name, self.fit_low, self.fit_high
            ));
        }
        if self.references.is_empty() {
            return Err(format!("fit window '{}' has no references", self.name));
        }
        let mut seen = std::collections::HashSet::new();
        for r in &self.references {
            if let Some(path) = &r.source_path {
                if !seen.insert(path.clone()) {
                    return Err(format!(
                        "fit window '{}' has duplicate reference path '{}'",
                        self.name, path
                    ));
                }
            }
        }
        if self.references.len() > 10 {
            log::warn!(
                "fit window '{}' has {} references; fits with more than ~10 references tend to be ill-conditioned",
                self.name,
                self.references.len()
            );
        }
        Ok(())
    }

    pub fn is_valid_at(&self, time: &Timestamp) -> bool {
        time.is_between(&self.valid_from, &self.valid_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(refs: Vec<Reference>) -> FitWindow {
        FitWindow {
            name: "main".into(),
            fit_low: 464,
            fit_high: 630,
            polynomial_order: 3,
            fit_type: FitType::HighPassDivide,
            spectrometer_channel: 0,
            spectrum_length: 2048,
            interlace_step: 1,
            start_channel: 0,
            references: refs,
            fraunhofer_reference: None,
            child_windows: vec![],
            auto_shift: false,
            sky_shift: false,
            offset_removal_range: None,
            valid_from: Timestamp::from_ymd_hms_milli(2000, 1, 1, 0, 0, 0, 0).unwrap(),
            valid_to: Timestamp::from_ymd_hms_milli(2100, 1, 1, 0, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_range_rejected() {
        let mut w = window(vec![Reference::new("SO2", vec![0.0; 10])]);
        w.fit_high = w.fit_low;
        assert!(w.validate().is_err());
    }

    #[test]
    fn no_references_rejected() {
        let w = window(vec![]);
        assert!(w.validate().is_err());
    }

    #[test]
    fn duplicate_reference_paths_rejected() {
        let mut a = Reference::new("SO2", vec![0.0; 10]);
        a.source_path = Some("so2.txt".into());
        let mut b = Reference::new("O3", vec![0.0; 10]);
        b.source_path = Some("so2.txt".into());
        let w = window(vec![a, b]);
        assert!(w.validate().is_err());
    }

    #[test]
    fn well_formed_window_validates() {
        let w = window(vec![Reference::new("SO2", vec![0.0; 10])]);
        assert!(w.validate().is_ok());
    }
}
