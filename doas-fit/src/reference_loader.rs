//!
//! Reference bundle file loading and instrument-alignment (C3, spec §4.3): parses
//! two-column (wavelength, cross-section) or one-column (cross-section only, pixel
//! index implicit) text files, and convolves a high-resolution cross-section against
//! an instrument line shape evaluated on a wavelength calibration to produce a
//! reference aligned with a specific device at a specific calibration epoch.
//!

use crate::result::{Error, Result};
use doas_model::data::reference::binomial_smooth;
use std::io::BufRead;

/// Raw two-column data read from a reference text file: wavelength (or bare pixel
/// index when the file carries only one column) and cross-section value.
pub struct LoadedReference {
    pub wavelength: Vec<f64>,
    pub cross_section: Vec<f64>,
}

/// Reads a reference cross-section file, grounded on
/// `original_source/Evaluation/CrossSectionData.cpp`'s `ReadCrossSectionFile`: each
/// line holds either `wavelength\tcrossSection` or a bare `crossSection`, and the
/// column count of the *first* parseable line decides how every subsequent line is
/// read. A line that fails to parse at all stops reading early rather than erroring,
/// matching the original's "break on sscanf failure" behaviour.
pub fn read_cross_section_file<R: BufRead>(reader: R) -> Result<LoadedReference> {
    let mut wavelength = Vec::new();
    let mut cross_section = Vec::new();
    let mut columns: Option<usize> = None;

    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let parsed: Vec<f64> = fields
            .iter()
            .take(2)
            .filter_map(|f| f.parse::<f64>().ok())
            .collect();

        let this_line_columns = parsed.len();
        if this_line_columns == 0 {
            break;
        }
        let columns = *columns.get_or_insert(this_line_columns);
        if parsed.len() != columns {
            break;
        }

        if columns == 1 {
            wavelength.push(wavelength.len() as f64);
            cross_section.push(parsed[0]);
        } else {
            wavelength.push(parsed[0]);
            cross_section.push(parsed[1]);
        }
    }

    match columns {
        None => Err(Error::EmptyReferenceFile),
        Some(c) if c > 2 => Err(Error::UnsupportedColumnCount(c)),
        _ => Ok(LoadedReference {
            wavelength,
            cross_section,
        }),
    }
}

/// High-pass filters a reference cross-section in log-ratio space: the data is
/// treated as already being in optical-depth ("delta-OD") units, exponentiated into
/// transmittance-like units, smoothed, and converted back, so the 500-point binomial
/// smoother operates on a scale where it does not distort small values near zero
/// (grounded on `CrossSectionData.cpp`'s `HighPassFilter`, which scales by `2.5e15`
/// before `exp`/`log` round-tripping around the binomial smoother).
pub fn high_pass_filter_optical_depth(cross_section: &[f64], binomial_half_width: usize) -> Vec<f64> {
    const SCALE: f64 = 2.5e15;
    let exponentiated: Vec<f64> = cross_section.iter().map(|&v| (-v * SCALE).exp()).collect();
    let smoothed = binomial_smooth(&exponentiated, binomial_half_width);
    smoothed
        .iter()
        .map(|&v| -v.max(f64::MIN_POSITIVE).ln() / SCALE)
        .collect()
}

/// Convolves a high-resolution `(wavelength, cross_section)` reference against a
/// normalised instrument line shape (ILS) sampled at the same wavelength spacing as
/// the reference, then resamples the convolved curve onto the instrument's pixel
/// grid using a wavelength calibration polynomial (pixel index -> wavelength,
/// lowest-order coefficient first). This is how a reference measured at
/// high spectral resolution in a lab is aligned to one particular spectrometer's
/// coarser, non-uniform pixel-to-wavelength mapping (spec §4.3).
pub fn convolve_and_resample(
    hi_res_wavelength: &[f64],
    hi_res_cross_section: &[f64],
    ils: &[f64],
    calibration_coeffs: &[f64],
    pixel_count: usize,
) -> Vec<f64> {
    let convolved = convolve(hi_res_cross_section, ils);
    let mut out = Vec::with_capacity(pixel_count);
    for pixel in 0..pixel_count {
        let target_wavelength = evaluate_polynomial(calibration_coeffs, pixel as f64);
        out.push(sample_at_wavelength(hi_res_wavelength, &convolved, target_wavelength));
    }
    out
}

fn convolve(data: &[f64], kernel: &[f64]) -> Vec<f64> {
    if kernel.is_empty() || data.is_empty() {
        return data.to_vec();
    }
    let kernel_sum: f64 = kernel.iter().sum();
    let normaliser = if kernel_sum.abs() > 1e-300 { kernel_sum } else { 1.0 };
    let radius = kernel.len() / 2;
    let mut out = vec![0.0; data.len()];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &w) in kernel.iter().enumerate() {
            let idx = i as i64 + k as i64 - radius as i64;
            if idx >= 0 && (idx as usize) < data.len() {
                acc += w * data[idx as usize];
            }
        }
        *slot = acc / normaliser;
    }
    out
}

fn evaluate_polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Linear interpolation of `(wavelength, value)` samples at an arbitrary wavelength;
/// clamps to the endpoints outside the covered range.
fn sample_at_wavelength(wavelength: &[f64], value: &[f64], target: f64) -> f64 {
    if wavelength.is_empty() {
        return 0.0;
    }
    if target <= wavelength[0] {
        return value[0];
    }
    if target >= wavelength[wavelength.len() - 1] {
        return value[value.len() - 1];
    }
    let idx = wavelength.partition_point(|&w| w < target);
    let lo = idx.saturating_sub(1);
    let hi = idx.min(wavelength.len() - 1);
    if hi == lo {
        return value[lo];
    }
    let span = wavelength[hi] - wavelength[lo];
    let t = if span.abs() > 1e-300 { (target - wavelength[lo]) / span } else { 0.0 };
    value[lo] + t * (value[hi] - value[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn one_column_file_assigns_implicit_pixel_index() {
        let data = "1.0\n2.0\n3.0\n";
        let loaded = read_cross_section_file(Cursor::new(data)).unwrap();
        assert_eq!(loaded.wavelength, vec![0.0, 1.0, 2.0]);
        assert_eq!(loaded.cross_section, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn two_column_file_keeps_wavelength_column() {
        let data = "300.0\t1.0\n300.5\t2.0\n301.0\t3.0\n";
        let loaded = read_cross_section_file(Cursor::new(data)).unwrap();
        assert_eq!(loaded.wavelength, vec![300.0, 300.5, 301.0]);
        assert_eq!(loaded.cross_section, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(read_cross_section_file(Cursor::new("")).is_err());
    }

    #[test]
    fn high_pass_filter_removes_constant_offset() {
        let flat = vec![1e-19; 200];
        let filtered = high_pass_filter_optical_depth(&flat, 20);
        for v in filtered {
            assert!((v - 1e-19).abs() < 1e-22);
        }
    }

    #[test]
    fn convolve_and_resample_preserves_flat_reference() {
        let wavelength: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let cross_section = vec![2.0; 100];
        let ils = vec![1.0, 2.0, 1.0];
        let calibration = [0.0, 0.1];
        let out = convolve_and_resample(&wavelength, &cross_section, &ils, &calibration, 50);
        for v in out {
            assert!((v - 2.0).abs() < 1e-9);
        }
    }
}
