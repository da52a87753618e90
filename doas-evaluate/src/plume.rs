//!
//! Plume property extractor (C7, spec §4.7): derives scan offset, plume centre,
//! edges, and completeness from one scan's column-vs-angle series.
//!

use doas_model::data::reference::binomial_smooth;
use doas_model::data::{PlumeProperties, ScanResult};

const SMOOTH_HALF_WIDTH: usize = 3;
/// Number of strongest-absorption points excluded from the offset estimate, so a
/// wide plume doesn't bias its own background estimate (spec §4.7 "excludes the
/// top-N absorbers").
const OFFSET_EXCLUDED_TOP_N: usize = 5;
/// Percentile (of the remaining, non-excluded points) used as the robust background
/// estimate.
const OFFSET_PERCENTILE: f64 = 0.1;
/// Peak-to-offset ratio a scan must clear to be considered to show a visible plume.
const VISIBILITY_SIGNAL_TO_BACKGROUND: f64 = 2.0;

/// Extracts [PlumeProperties] for reference `reference_index` of `scan`, or `None`
/// if there are too few good points to compute anything meaningful.
pub fn extract_plume_properties(scan: &ScanResult, reference_index: usize) -> Option<PlumeProperties> {
    let series = scan.good_column_series(reference_index);
    if series.len() < 3 {
        return None;
    }

    let angles: Vec<f64> = series.iter().map(|(a, _, _)| *a).collect();
    let columns: Vec<f64> = series.iter().map(|(_, c, _)| *c).collect();

    let offset = estimate_offset(&columns);

    let subtracted: Vec<f64> = columns.iter().map(|c| c - offset).collect();
    let smoothed = binomial_smooth(&subtracted, SMOOTH_HALF_WIDTH);

    let (peak_index, peak_value) = smoothed
        .iter()
        .enumerate()
        .fold((0usize, f64::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });

    let centre_alpha = angles[peak_index];

    let weight_sum: f64 = subtracted.iter().map(|v| v.max(0.0)).sum();
    let centroid = if weight_sum > 0.0 {
        angles
            .iter()
            .zip(subtracted.iter())
            .map(|(a, c)| a * c.max(0.0))
            .sum::<f64>()
            / weight_sum
    } else {
        centre_alpha
    };
    let centre_error = (centroid - centre_alpha).abs();

    let half_max = peak_value / 2.0;
    let (edge_low, low_resolved) = find_edge(&angles, &smoothed, peak_index, half_max, Direction::Down);
    let (edge_high, high_resolved) = find_edge(&angles, &smoothed, peak_index, half_max, Direction::Up);

    let completeness = estimate_completeness(&angles, &subtracted, edge_low, edge_high, low_resolved, high_resolved);

    let visible = peak_value / offset.max(1e-9).abs().max(1e-9) > VISIBILITY_SIGNAL_TO_BACKGROUND
        && (low_resolved || high_resolved)
        && peak_value > 0.0;

    Some(PlumeProperties {
        offset,
        centre_alpha,
        centre_phi: 0.0,
        edge_low,
        edge_high,
        completeness: PlumeProperties::clamp_completeness(completeness),
        centre_error,
        visible,
    })
}

/// Robust low-percentile estimate of background columns, excluding the strongest
/// `OFFSET_EXCLUDED_TOP_N` absorbers so the plume's own signal doesn't bias the
/// background it's measured against.
fn estimate_offset(columns: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = columns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let excluded = OFFSET_EXCLUDED_TOP_N.min(sorted.len().saturating_sub(1));
    let candidates = &sorted[..sorted.len() - excluded];
    if candidates.is_empty() {
        return sorted[0];
    }
    let index = ((candidates.len() - 1) as f64 * OFFSET_PERCENTILE).round() as usize;
    candidates[index.min(candidates.len() - 1)]
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Walks outward from `peak_index` in `direction` looking for the first point that
/// drops below `half_max`. Returns the angle at that point and whether a crossing was
/// actually found inside the scanned arc (spec §4.7 "both shoulders ... fall below
/// the half-max inside the scanned arc").
fn find_edge(angles: &[f64], smoothed: &[f64], peak_index: usize, half_max: f64, direction: Direction) -> (f64, bool) {
    let n = smoothed.len();
    let mut i = peak_index;
    loop {
        let next = match direction {
            Direction::Up => i + 1,
            Direction::Down => {
                if i == 0 {
                    break;
                }
                i - 1
            }
        };
        if next >= n {
            break;
        }
        if smoothed[next] < half_max {
            return (angles[next], true);
        }
        i = next;
    }
    let boundary = match direction {
        Direction::Up => n - 1,
        Direction::Down => 0,
    };
    (angles[boundary], false)
}

/// Ratio of the column mass actually integrated between the measured edges to a
/// model that extrapolates both shoulders as half-Gaussians out to the horizon
/// (spec §4.7, Open Question resolution: always compute this extrapolation, clamped
/// to [0.5, 1.0], rather than falling back to a bare floor).
fn estimate_completeness(
    angles: &[f64],
    subtracted: &[f64],
    edge_low: f64,
    edge_high: f64,
    low_resolved: bool,
    high_resolved: bool,
) -> f64 {
    if low_resolved && high_resolved {
        return 1.0;
    }

    let measured_mass: f64 = angles
        .iter()
        .zip(subtracted.iter())
        .filter(|(a, _)| **a >= edge_low && **a <= edge_high)
        .map(|(_, c)| c.max(0.0))
        .sum();

    let half_width = ((edge_high - edge_low) / 2.0).max(1e-6);
    let sigma = half_width / std::f64::consts::LN_2.sqrt().max(1e-6);
    let peak_value = subtracted
        .iter()
        .cloned()
        .fold(f64::MIN, f64::max)
        .max(0.0);

    // Gaussian tail mass beyond each unresolved (scan-arc-clipped) shoulder, using
    // the standard normal integral approximation via erf.
    let tail_low = if low_resolved { 0.0 } else { gaussian_tail_mass(peak_value, sigma) };
    let tail_high = if high_resolved { 0.0 } else { gaussian_tail_mass(peak_value, sigma) };

    let modelled_total = measured_mass + tail_low + tail_high;
    if modelled_total <= 0.0 {
        1.0
    } else {
        measured_mass / modelled_total
    }
}

/// Integral of a half-Gaussian with the given peak and sigma from the shoulder out to
/// infinity: `peak * sigma * sqrt(pi/2)`.
fn gaussian_tail_mass(peak: f64, sigma: f64) -> f64 {
    peak * sigma * (std::f64::consts::PI / 2.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{EvaluationResult, ReferenceFitResult, SpectrumInfo, SpectrumMarks, Timestamp};

    fn info(angle: f64) -> SpectrumInfo {
        SpectrumInfo {
            scan_angle: angle,
            scan_angle_2: 0.0,
            start_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap(),
            stop_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 1, 0).unwrap(),
            exposure_time_ms: 100,
            coadds: 1,
            temperature: 20.0,
            battery_voltage: 12.0,
        }
    }

    fn eval(column: f64) -> EvaluationResult {
        EvaluationResult {
            references: vec![ReferenceFitResult {
                column,
                column_error: 1.0,
                shift: 0.0,
                shift_error: 0.0,
                squeeze: 1.0,
                squeeze_error: 0.0,
            }],
            delta: 0.01,
            chi_square: 1.0,
        }
    }

    fn synthetic_scan() -> ScanResult {
        let mut result = ScanResult::new("I2J1234");
        for i in -45..=45 {
            let angle = i as f64 * 2.0;
            let plume = 500.0 * (-(angle * angle) / (2.0 * 15.0 * 15.0)).exp();
            result.push(eval(10.0 + plume), info(angle), SpectrumMarks::default());
        }
        result
    }

    #[test]
    fn peak_sits_near_centre_angle_for_symmetric_plume() {
        let scan = synthetic_scan();
        let properties = extract_plume_properties(&scan, 0).unwrap();
        assert!(properties.centre_alpha.abs() < 5.0);
        assert!(properties.visible);
    }

    #[test]
    fn completeness_is_clamped_to_valid_range() {
        let scan = synthetic_scan();
        let properties = extract_plume_properties(&scan, 0).unwrap();
        assert!(properties.completeness >= PlumeProperties::MIN_COMPLETENESS);
        assert!(properties.completeness <= PlumeProperties::MAX_COMPLETENESS);
    }

    #[test]
    fn too_few_points_yields_none() {
        let mut result = ScanResult::new("I2J1234");
        result.push(eval(10.0), info(0.0), SpectrumMarks::default());
        assert!(extract_plume_properties(&result, 0).is_none());
    }

    #[test]
    fn both_shoulders_resolved_yields_full_completeness() {
        let angles: Vec<f64> = (-20..=20).map(|i| i as f64).collect();
        let subtracted: Vec<f64> = angles.iter().map(|a| 100.0 * (-(a * a) / (2.0 * 5.0 * 5.0)).exp()).collect();
        let completeness = estimate_completeness(&angles, &subtracted, -15.0, 15.0, true, true);
        assert_eq!(completeness, 1.0);
    }

    #[test]
    fn clipped_shoulder_reports_less_than_full_completeness() {
        let angles: Vec<f64> = (-20..=20).map(|i| i as f64).collect();
        let subtracted: Vec<f64> = angles.iter().map(|a| 100.0 * (-(a * a) / (2.0 * 5.0 * 5.0)).exp()).collect();
        let completeness = estimate_completeness(&angles, &subtracted, -15.0, 15.0, true, false);
        assert!(completeness < 1.0);
    }

    #[test]
    fn flat_series_reports_not_visible() {
        let mut result = ScanResult::new("I2J1234");
        for i in -10..=10 {
            result.push(eval(10.0), info(i as f64 * 2.0), SpectrumMarks::default());
        }
        let properties = extract_plume_properties(&result, 0).unwrap();
        assert!(!properties.visible);
    }
}
