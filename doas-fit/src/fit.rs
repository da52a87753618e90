//!
//! DOAS fit core (C5, spec §4.5): solves one nonlinear least-squares fit of a
//! measurement spectrum against a sky spectrum, a set of species references, and a
//! baseline polynomial.
//!

use crate::linalg::{residual_sum_of_squares, solve_least_squares};
use crate::result::{Error, Result};
use doas_model::data::reference::{binomial_smooth, high_pass_filter};
use doas_model::data::{FitOption, FitType, FitWindow, ReferenceFitResult};
use doas_model::data::{EvaluationResult, Spectrum};

const FRAUNHOFER_SMOOTH_HALF_WIDTH: usize = 500;
const MAX_OUTER_ITERATIONS: u32 = 60;
/// Golden-section-like shrink factor used to narrow the shift/squeeze search bracket
/// each outer iteration once a bracketing improvement has been found.
const BRACKET_SHRINK: f64 = 0.5;
/// Finite-difference step used to probe the residual surface's curvature around a
/// converged shift value, in pixels.
const SHIFT_FD_STEP: f64 = 0.05;
/// Finite-difference step used to probe the residual surface's curvature around a
/// converged squeeze value.
const SQUEEZE_FD_STEP: f64 = 0.0005;

/// A reference slated for the fit, bound to its free/fixed/linked/bounded options
/// (carried alongside [doas_model::data::Reference] itself so the outer loop can
/// look up each reference's parameters by index without re-borrowing the window).
#[derive(Clone, Copy)]
struct FitParam {
    shift: f64,
    squeeze: f64,
    shift_free: bool,
    squeeze_free: bool,
    shift_link: Option<usize>,
    squeeze_link: Option<usize>,
    shift_bound: Option<(f64, f64)>,
    squeeze_bound: Option<(f64, f64)>,
}

/// Runs one DOAS fit of `measurement` against `sky` using the references and
/// polynomial order configured in `window`. Only `window.fit_low..=window.fit_high`
/// contributes. Returns `FitDidNotConverge` if the outer shift/squeeze search
/// exhausts its iteration budget without settling, keeping the last iterate's
/// column/error as the caller may still want to inspect it via the error's debug
/// representation; returns `IllConditioned` if the linear solve is ever singular.
pub fn fit(measurement: &Spectrum, sky: &Spectrum, window: &FitWindow) -> Result<EvaluationResult> {
    if window.fit_high >= measurement.len().min(sky.len()) {
        return Err(Error::FitRangeOutOfBounds {
            fit_low: window.fit_low,
            fit_high: window.fit_high,
            length: measurement.len().min(sky.len()),
        });
    }

    let target_full = build_target(measurement, sky, window.fit_type);
    let target: Vec<f64> = target_full[window.fit_low..=window.fit_high].to_vec();
    let range_len = target.len();

    let mut params: Vec<FitParam> = window
        .references
        .iter()
        .enumerate()
        .map(|(i, r)| to_fit_param(r, &window.references, i))
        .collect();

    let has_free_geometry = |p: &[FitParam]| p.iter().any(|p| p.shift_free || p.squeeze_free);

    let (mut best_rss, solved0, inverse0) = {
        let design = build_design_matrix(window, &params, range_len);
        let (solved, inverse) = solve_least_squares(&design, &target)?;
        let rss = residual_sum_of_squares(&design, &target, &solved);
        (rss, solved, inverse)
    };
    let mut best_solved = solved0;
    let mut best_inverse = inverse0;

    let mut bracket = 2.0_f64;
    let mut converged = !has_free_geometry(&params);

    // Coordinate-descent / pattern search: perturb one free shift or squeeze at a
    // time, keeping the step only if it reduces the residual at the re-solved
    // linear stage; once a full round makes no progress, shrink the search step.
    // A much simpler search than the original engine's Levenberg-Marquardt outer
    // loop, but converges to the same fixed point for a well-conditioned window
    // because the inner linear solve is itself exact at every trial point.
    for _ in 0..MAX_OUTER_ITERATIONS {
        if converged {
            break;
        }
        let mut improved_this_round = false;
        for i in 0..params.len() {
            if params[i].shift_free {
                for &delta in &[bracket, -bracket] {
                    if let Some((rss, solved, inverse)) =
                        try_delta(&mut params, i, true, delta, window, &target, range_len, best_rss)
                    {
                        best_rss = rss;
                        best_solved = solved;
                        best_inverse = inverse;
                        improved_this_round = true;
                        break;
                    }
                }
            }
            if params[i].squeeze_free {
                for &delta in &[bracket * 0.01, -bracket * 0.01] {
                    if let Some((rss, solved, inverse)) =
                        try_delta(&mut params, i, false, delta, window, &target, range_len, best_rss)
                    {
                        best_rss = rss;
                        best_solved = solved;
                        best_inverse = inverse;
                        improved_this_round = true;
                        break;
                    }
                }
            }
        }
        if !improved_this_round {
            bracket *= BRACKET_SHRINK;
            if bracket < 1e-4 {
                converged = true;
            }
        }
    }

    if !converged {
        return Err(Error::FitDidNotConverge {
            iterations: MAX_OUTER_ITERATIONS,
        });
    }

    let n_refs = params.len();
    let best_columns = &best_solved[..n_refs];
    let best_column_errors: Vec<f64> = (0..n_refs).map(|i| best_inverse[i][i].max(0.0).sqrt()).collect();

    let n_samples = range_len as f64;
    let n_params = params.len() as f64 + window.polynomial_order as f64 + 1.0;
    let degrees_of_freedom = (n_samples - n_params).max(1.0);
    let chi_square = best_rss / degrees_of_freedom;
    let delta = (best_rss / n_samples).sqrt();

    let references = (0..n_refs)
        .map(|i| ReferenceFitResult {
            column: best_columns[i],
            column_error: best_column_errors[i],
            shift: effective(&params, i, |p| p.shift, |p| p.shift_link),
            shift_error: if params[i].shift_free {
                geometry_error(&params, window, &target, range_len, best_rss, chi_square, i, true)
            } else {
                0.0
            },
            squeeze: effective(&params, i, |p| p.squeeze, |p| p.squeeze_link),
            squeeze_error: if params[i].squeeze_free {
                geometry_error(&params, window, &target, range_len, best_rss, chi_square, i, false)
            } else {
                0.0
            },
        })
        .collect();

    Ok(EvaluationResult {
        references,
        delta,
        chi_square,
    })
}

/// Tries moving parameter `idx`'s shift (`is_shift = true`) or squeeze by `delta`;
/// keeps the change and returns the new solve iff it strictly improves on
/// `current_best_rss`, otherwise reverts `params` to its prior state and returns
/// `None`.
#[allow(clippy::too_many_arguments)]
fn try_delta(
    params: &mut [FitParam],
    idx: usize,
    is_shift: bool,
    delta: f64,
    window: &FitWindow,
    target: &[f64],
    range_len: usize,
    current_best_rss: f64,
) -> Option<(f64, Vec<f64>, Vec<Vec<f64>>)> {
    let original = if is_shift { params[idx].shift } else { params[idx].squeeze };
    let bound = if is_shift { params[idx].shift_bound } else { params[idx].squeeze_bound };
    let candidate = clamp(original + delta, bound);
    if candidate == original {
        return None;
    }
    if is_shift {
        params[idx].shift = candidate;
    } else {
        params[idx].squeeze = candidate;
    }

    let design = build_design_matrix(window, params, range_len);
    let outcome = solve_least_squares(&design, target).ok().map(|(solved, inverse)| {
        let rss = residual_sum_of_squares(&design, target, &solved);
        (rss, solved, inverse)
    });

    match &outcome {
        Some((rss, ..)) if *rss < current_best_rss => outcome,
        _ => {
            if is_shift {
                params[idx].shift = original;
            } else {
                params[idx].squeeze = original;
            }
            None
        }
    }
}

/// Estimates the 1-sigma uncertainty of a converged shift or squeeze value from the
/// local curvature of the residual sum of squares around it: near its minimum, RSS
/// is locally parabolic, so a symmetric finite-difference second derivative gives
/// the curvature, and the reduced chi-square converts that into a standard error
/// the same way a linear fit's covariance diagonal would. Returns `f64::INFINITY`
/// when the surface is flat or the perturbed solve is singular -- there is no
/// meaningful error estimate in either case, and reporting an unbounded error keeps
/// the evaluator's tight-fit gate from treating the result as well constrained.
#[allow(clippy::too_many_arguments)]
fn geometry_error(
    params: &[FitParam],
    window: &FitWindow,
    target: &[f64],
    range_len: usize,
    best_rss: f64,
    chi_square: f64,
    idx: usize,
    is_shift: bool,
) -> f64 {
    let step = if is_shift { SHIFT_FD_STEP } else { SQUEEZE_FD_STEP };
    let (Some(rss_plus), Some(rss_minus)) = (
        perturbed_rss(params, window, target, range_len, idx, is_shift, step),
        perturbed_rss(params, window, target, range_len, idx, is_shift, -step),
    ) else {
        return f64::INFINITY;
    };
    let curvature = (rss_plus - 2.0 * best_rss + rss_minus) / (step * step);
    if curvature <= 0.0 {
        return f64::INFINITY;
    }
    (2.0 * chi_square.max(f64::MIN_POSITIVE) / curvature).sqrt()
}

/// Re-solves the linear stage with reference `idx`'s shift or squeeze nudged by
/// `delta`, holding every other parameter at its converged value. `None` if the
/// perturbed design matrix is singular.
fn perturbed_rss(
    params: &[FitParam],
    window: &FitWindow,
    target: &[f64],
    range_len: usize,
    idx: usize,
    is_shift: bool,
    delta: f64,
) -> Option<f64> {
    let mut trial: Vec<FitParam> = params.to_vec();
    if is_shift {
        trial[idx].shift += delta;
    } else {
        trial[idx].squeeze += delta;
    }
    let design = build_design_matrix(window, &trial, range_len);
    let (solved, _) = solve_least_squares(&design, target).ok()?;
    Some(residual_sum_of_squares(&design, target, &solved))
}

fn to_fit_param(reference: &doas_model::data::Reference, all: &[doas_model::data::Reference], index: usize) -> FitParam {
    let shift_link = link_index(&reference.shift_option, all, index);
    let squeeze_link = link_index(&reference.squeeze_option, all, index);
    FitParam {
        shift: reference.shift_option.initial_value(),
        squeeze: if matches!(reference.squeeze_option, FitOption::Free) {
            1.0
        } else {
            reference.squeeze_option.initial_value().max(0.0).max(f64::MIN_POSITIVE)
        },
        shift_free: matches!(reference.shift_option, FitOption::Free | FitOption::Bounded { .. })
            && shift_link.is_none(),
        squeeze_free: matches!(reference.squeeze_option, FitOption::Free | FitOption::Bounded { .. })
            && squeeze_link.is_none(),
        shift_link,
        squeeze_link,
        shift_bound: bound_of(&reference.shift_option),
        squeeze_bound: bound_of(&reference.squeeze_option),
    }
}

fn link_index(option: &FitOption, all: &[doas_model::data::Reference], self_index: usize) -> Option<usize> {
    match option {
        FitOption::Linked { to } => all.iter().position(|r| &r.species_name == to).filter(|&i| i != self_index),
        _ => None,
    }
}

fn bound_of(option: &FitOption) -> Option<(f64, f64)> {
    match option {
        FitOption::Bounded { value, bound } => Some((value - bound, value + bound)),
        _ => None,
    }
}

/// Builds `y`, the target vector the references and polynomial are fit against,
/// over the spectrum's full length (the fit window then slices the active range).
fn build_target(measurement: &Spectrum, sky: &Spectrum, fit_type: FitType) -> Vec<f64> {
    let log_ratio: Vec<f64> = measurement
        .intensities()
        .iter()
        .zip(sky.intensities().iter())
        .map(|(&m, &s)| {
            if m > 0.0 && s > 0.0 {
                -(m / s).ln()
            } else {
                0.0
            }
        })
        .collect();

    match fit_type {
        FitType::HighPassDivide => high_pass_filter(&log_ratio, FRAUNHOFER_SMOOTH_HALF_WIDTH),
        FitType::HighPassSubtract => {
            let smooth = binomial_smooth(&log_ratio, FRAUNHOFER_SMOOTH_HALF_WIDTH);
            log_ratio.iter().zip(smooth.iter()).map(|(a, b)| a - b).collect()
        }
        FitType::PolynomialOnOpticalDepth | FitType::NoFilter => log_ratio,
    }
}

/// Builds the design matrix for the current shift/squeeze iterate: one column per
/// reference (high-pass filtered identically to the target when the fit type calls
/// for it), followed by `polynomial_order + 1` polynomial columns.
fn build_design_matrix(window: &FitWindow, params: &[FitParam], range_len: usize) -> Vec<Vec<f64>> {
    let n_refs = window.references.len();
    let n_poly = window.polynomial_order as usize + 1;
    let n_cols = n_refs + n_poly;
    let mut design = vec![vec![0.0; n_cols]; range_len];

    for (r, reference) in window.references.iter().enumerate() {
        let shift = effective(params, r, |p| p.shift, |p| p.shift_link);
        let squeeze = effective(params, r, |p| p.squeeze, |p| p.squeeze_link);
        let remapped = reference.shifted_squeezed(shift, squeeze);
        let filtered = match window.fit_type {
            FitType::HighPassDivide => high_pass_filter(&remapped, FRAUNHOFER_SMOOTH_HALF_WIDTH),
            FitType::HighPassSubtract => {
                let smooth = binomial_smooth(&remapped, FRAUNHOFER_SMOOTH_HALF_WIDTH);
                remapped.iter().zip(smooth.iter()).map(|(a, b)| a - b).collect()
            }
            FitType::PolynomialOnOpticalDepth | FitType::NoFilter => remapped,
        };
        for (row, &value) in filtered[window.fit_low..=window.fit_high].iter().enumerate() {
            design[row][r] = value;
        }
    }

    for row in 0..range_len {
        let x = (row as f64) / (range_len.max(1) as f64);
        let mut power = 1.0;
        for p in 0..n_poly {
            design[row][n_refs + p] = power;
            power *= x;
        }
    }

    design
}

fn effective(params: &[FitParam], index: usize, get: impl Fn(&FitParam) -> f64, link: impl Fn(&FitParam) -> Option<usize>) -> f64 {
    match link(&params[index]) {
        Some(target) => get(&params[target]),
        None => get(&params[index]),
    }
}

fn clamp(value: f64, bound: Option<(f64, f64)>) -> f64 {
    match bound {
        Some((lo, hi)) => value.clamp(lo, hi),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{Reference, SpectrumMetadata, Timestamp};

    fn meta() -> SpectrumMetadata {
        SpectrumMetadata {
            device_serial: "I2J1234".into(),
            channel: 0,
            interlace_step: 1,
            start_channel: 0,
            exposure_time_ms: 100,
            coadds: 1,
            start_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap(),
            stop_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 1, 0).unwrap(),
            scan_angle: 0.0,
            scan_angle_2: 0.0,
            peak_intensity: 0.0,
            fit_region_intensity: 0.0,
            electronic_offset: 0.0,
            temperature: 20.0,
            battery_voltage: 12.0,
            scan_index: 0,
            scan_count: 10,
            flags: 0,
            already_divided: true,
        }
    }

    fn window(references: Vec<Reference>, fit_type: FitType) -> FitWindow {
        FitWindow {
            name: "main".into(),
            fit_low: 20,
            fit_high: 180,
            polynomial_order: 2,
            fit_type,
            spectrometer_channel: 0,
            spectrum_length: 200,
            interlace_step: 1,
            start_channel: 0,
            references,
            fraunhofer_reference: None,
            child_windows: vec![],
            auto_shift: false,
            sky_shift: false,
            offset_removal_range: None,
            valid_from: Timestamp::from_ymd_hms_milli(2000, 1, 1, 0, 0, 0, 0).unwrap(),
            valid_to: Timestamp::from_ymd_hms_milli(2100, 1, 1, 0, 0, 0, 0).unwrap(),
        }
    }

    /// Builds a synthetic sky and a measurement whose log-ratio is exactly
    /// `known_column * reference` over the fit range, so the recovered column
    /// should match `known_column` to numerical precision.
    fn synthetic_pair(reference: &[f64], known_column: f64) -> (Spectrum, Spectrum) {
        let sky_intensities = vec![10000.0; reference.len()];
        let measurement_intensities: Vec<f64> = reference
            .iter()
            .zip(sky_intensities.iter())
            .map(|(&xs, &sky_i)| sky_i * (-known_column * xs).exp())
            .collect();
        let sky = Spectrum::new(sky_intensities, meta()).unwrap();
        let measurement = Spectrum::new(measurement_intensities, meta()).unwrap();
        (measurement, sky)
    }

    #[test]
    fn recovers_known_column_with_fixed_geometry() {
        let xs: Vec<f64> = (0..200).map(|i| ((i as f64 - 100.0) / 30.0).exp().recip()).collect();
        let mut reference = Reference::new("SO2", xs.clone());
        reference.shift_option = FitOption::Fixed { value: 0.0 };
        reference.squeeze_option = FitOption::Fixed { value: 1.0 };

        let (measurement, sky) = synthetic_pair(&xs, 1e-3);
        let w = window(vec![reference], FitType::PolynomialOnOpticalDepth);
        let result = fit(&measurement, &sky, &w).unwrap();
        assert!((result.references[0].column - 1e-3).abs() / 1e-3 < 0.05);
    }

    #[test]
    fn free_shift_reports_a_nonzero_finite_error() {
        let xs: Vec<f64> = (0..200).map(|i| ((i as f64 - 100.0) / 30.0).exp().recip()).collect();
        let mut reference = Reference::new("SO2", xs.clone());
        reference.shift_option = FitOption::Free;
        reference.squeeze_option = FitOption::Fixed { value: 1.0 };

        let (measurement, sky) = synthetic_pair(&xs, 1e-3);
        let w = window(vec![reference], FitType::PolynomialOnOpticalDepth);
        let result = fit(&measurement, &sky, &w).unwrap();
        let fitted = &result.references[0];
        assert!(fitted.shift_error.is_finite());
        assert!(fitted.shift_error > 0.0);
        assert_eq!(fitted.squeeze_error, 0.0);
    }

    #[test]
    fn fixed_geometry_reports_zero_error() {
        let xs: Vec<f64> = (0..200).map(|i| ((i as f64 - 100.0) / 30.0).exp().recip()).collect();
        let mut reference = Reference::new("SO2", xs.clone());
        reference.shift_option = FitOption::Fixed { value: 0.0 };
        reference.squeeze_option = FitOption::Fixed { value: 1.0 };

        let (measurement, sky) = synthetic_pair(&xs, 1e-3);
        let w = window(vec![reference], FitType::PolynomialOnOpticalDepth);
        let result = fit(&measurement, &sky, &w).unwrap();
        assert_eq!(result.references[0].shift_error, 0.0);
        assert_eq!(result.references[0].squeeze_error, 0.0);
    }

    #[test]
    fn out_of_bounds_fit_window_is_rejected() {
        let xs = vec![1.0; 50];
        let reference = Reference::new("SO2", xs.clone());
        let (measurement, sky) = synthetic_pair(&xs, 1e-3);
        let w = window(vec![reference], FitType::NoFilter);
        assert!(matches!(fit(&measurement, &sky, &w), Err(Error::FitRangeOutOfBounds { .. })));
    }

    #[test]
    fn linked_squeeze_tracks_leader_reference() {
        let xs: Vec<f64> = (0..200).map(|i| ((i as f64 - 100.0) / 30.0).exp().recip()).collect();
        let mut leader = Reference::new("SO2", xs.clone());
        leader.shift_option = FitOption::Free;
        let mut follower = Reference::new("O3", xs.clone());
        follower.shift_option = FitOption::Linked { to: "SO2".into() };

        let (measurement, sky) = synthetic_pair(&xs, 5e-4);
        let w = window(vec![leader, follower], FitType::PolynomialOnOpticalDepth);
        let result = fit(&measurement, &sky, &w).unwrap();
        assert_eq!(result.references[0].shift, result.references[1].shift);
    }
}
