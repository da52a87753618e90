//!
//! Dual-beam wind speed calculator (spec §4.10): low-pass filters two aligned
//! column time series, slides a test window in cross-correlation search, and
//! converts the resulting delay into a wind speed given the angular separation
//! and plume altitude. Grounded on
//! `WindSpeedCalculator.cpp::LowPassFilter`/`FindBestCorrelation`/`CalculateWindSpeed`.
//!

use crate::result::{Error, Result};
use doas_model::data::InstrumentLocation;

/// A column-vs-time measurement series from one viewing direction.
#[derive(Debug, Clone)]
pub struct ColumnSeries {
    pub column: Vec<f64>,
    pub time_s: Vec<f64>,
}

impl ColumnSeries {
    pub fn len(&self) -> usize {
        self.column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    fn sample_interval(&self) -> f64 {
        if self.time_s.len() < 2 {
            return 0.0;
        }
        (self.time_s[self.time_s.len() - 1] - self.time_s[0]) / (self.time_s.len() - 1) as f64
    }

    fn average_column(&self, from: usize, to: usize) -> f64 {
        if from > to || to >= self.column.len() {
            return 0.0;
        }
        self.column[from..=to].iter().sum::<f64>() / (to - from + 1) as f64
    }
}

/// Settings for one dual-beam wind speed estimate (spec §6 `DualBeam` block).
#[derive(Debug, Clone, Copy)]
pub struct DualBeamSettings {
    /// Number of binomial-smoother iterations applied to each series.
    pub low_pass_iterations: u32,
    pub test_length_s: f64,
    pub use_max_test_length: bool,
    pub max_shift_s: f64,
    /// Minimum up-wind average column for a comparison window to count as "seeing
    /// the plume" (`settings.columnMin` in the reference implementation).
    pub column_min: f64,
}

/// Iterated binomial low-pass filter: coefficients are the `n`th row of Pascal's
/// triangle, divided by their sum to preserve total energy. The series shrinks by
/// `n` samples.
fn binomial_smooth(series: &ColumnSeries, n: u32) -> Option<ColumnSeries> {
    if series.is_empty() {
        return None;
    }
    if n == 0 {
        return Some(series.clone());
    }

    let old_len = series.len();
    let new_len = old_len.checked_sub(n as usize + 1)?;
    if new_len == 0 {
        return None;
    }

    let mut coefficients = vec![1.0; n as usize + 1];
    for k in 1..=n as usize {
        coefficients[k] = coefficients[k - 1] * (n as f64 - k as f64 + 1.0) / k as f64;
    }
    let coeff_sum: f64 = coefficients.iter().sum();

    let mut column = vec![0.0; new_len];
    let mut time_s = vec![0.0; new_len];
    for (k, &coefficient) in coefficients.iter().enumerate() {
        for i in 0..new_len {
            column[i] += coefficient * series.column[k + i];
            time_s[i] += coefficient * series.time_s[k + i];
        }
    }
    for i in 0..new_len {
        column[i] /= coeff_sum;
        time_s[i] /= coeff_sum;
    }

    Some(ColumnSeries { column, time_s })
}

/// Pearson correlation between two equal-length slices, with the reference
/// implementation's fallback to 1.0 when both the numerator and the denominator
/// vanish (a perfectly flat pair of windows).
fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let length = x.len() as f64;
    if x.is_empty() {
        return 0.0;
    }

    let (mut s_xy, mut s_x2, mut s_x, mut s_y, mut s_y2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        s_xy += xi * yi;
        s_x2 += xi * xi;
        s_x += xi;
        s_y += yi;
        s_y2 += yi * yi;
    }

    let nominator = length * s_xy - s_x * s_y;
    let denominator = ((length * s_x2 - s_x * s_x) * (length * s_y2 - s_y * s_y)).sqrt();

    let eps = 1e-5;
    if (nominator - denominator).abs() < eps && denominator.abs() < eps {
        1.0
    } else {
        nominator / denominator
    }
}

/// Slides `short` (length `comparison_length`) across `long` within `[0,
/// max_shift]` and returns the `(shift, correlation)` of the best match
/// (`FindBestCorrelation`).
fn find_best_shift(long: &[f64], short: &[f64], max_shift: usize) -> Option<(usize, f64)> {
    if long.len() <= short.len() {
        return None;
    }
    let mut best = (0usize, 0.0f64);
    let mut left = 0usize;
    while left + short.len() < long.len() && left < max_shift {
        let c = correlation(short, &long[left..left + short.len()]);
        if c > best.1 {
            best = (left, c);
        }
        left += 1;
    }
    Some(best)
}

struct DelayRun {
    delays: Vec<(f64, f64)>,
}

/// Runs the comparison-window slide treating `long_side` as the up-wind (fixed,
/// searched) series and `short_side` as the down-wind (shifted) series.
fn run_delay_search(
    long_side: &ColumnSeries,
    short_side: &ColumnSeries,
    sample_interval: f64,
    max_shift: usize,
    comparison_length: usize,
    column_min: f64,
) -> DelayRun {
    let mut delays = Vec::new();
    if comparison_length == 0 || long_side.len() <= max_shift + comparison_length {
        return DelayRun { delays };
    }

    let last_offset = long_side.len() - max_shift - comparison_length;
    for offset in 0..last_offset {
        if long_side.average_column(offset, offset + comparison_length - 1) < column_min {
            continue;
        }
        let long_subvector = &long_side.column[offset..];
        let short_subvector = &short_side.column[offset..(offset + comparison_length).min(short_side.len())];
        if short_subvector.len() < comparison_length {
            continue;
        }
        if let Some((shift, corr)) = find_best_shift(long_subvector, short_subvector, max_shift) {
            delays.push((shift as f64 * sample_interval, corr));
        }
    }
    delays
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], average: f64) -> f64 {
    (values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Finds the mean and standard deviation of the delay between `up_wind` and
/// `down_wind`, retrying with roles swapped and keeping whichever assignment
/// yields higher mean correlation, then keeping only delays whose correlation
/// exceeds 0.9 (spec §4.10 steps 1-5).
pub fn calculate_delay(up_wind: &ColumnSeries, down_wind: &ColumnSeries, settings: &DualBeamSettings) -> Result<(f64, f64)> {
    let up_filtered = binomial_smooth(up_wind, settings.low_pass_iterations).ok_or(Error::InsufficientGoodSamples)?;
    let down_filtered = binomial_smooth(down_wind, settings.low_pass_iterations).ok_or(Error::InsufficientGoodSamples)?;

    let sample_interval = down_filtered.sample_interval();
    if (up_filtered.sample_interval() - sample_interval).abs() > 0.5 {
        return Err(Error::MismatchedSampleIntervals);
    }

    let max_shift = (settings.max_shift_s / sample_interval).round() as usize;
    let comparison_length = if settings.use_max_test_length {
        down_filtered.len().saturating_sub(2 * max_shift + 10)
    } else {
        (settings.test_length_s / sample_interval).round() as usize
    };

    let forward = run_delay_search(&up_filtered, &down_filtered, sample_interval, max_shift, comparison_length, settings.column_min);
    let backward = run_delay_search(&down_filtered, &up_filtered, sample_interval, max_shift, comparison_length, settings.column_min);

    let mean_corr = |run: &DelayRun| -> f64 {
        if run.delays.is_empty() {
            0.0
        } else {
            mean(&run.delays.iter().map(|(_, c)| *c).collect::<Vec<_>>())
        }
    };

    let chosen = if mean_corr(&forward) >= mean_corr(&backward) { forward } else { backward };

    let good_delays: Vec<f64> = chosen.delays.iter().filter(|(_, c)| *c > 0.9).map(|(d, _)| *d).collect();
    if good_delays.len() < 50 {
        return Err(Error::InsufficientGoodSamples);
    }

    let average_delay = mean(&good_delays);
    let delay_std = std_dev(&good_delays, average_delay);
    Ok((average_delay, delay_std))
}

/// Distance between the two viewing directions at the plume, for a flat or cone
/// scanner, scaled by the cosine of the scan angle (spec §4.10 step 6).
pub fn distance_at_plume(location: &InstrumentLocation, plume_height_above_scanner_m: f64, angle_separation_deg: f64, scan_angle_deg: f64) -> f64 {
    let distance = if location.is_flat_scanner() {
        plume_height_above_scanner_m * angle_separation_deg.to_radians().tan()
    } else {
        let beta = (90.0 - (location.cone_angle - location.tilt.abs())).to_radians();
        plume_height_above_scanner_m * (beta.tan() - (beta - angle_separation_deg.to_radians()).tan()).abs()
    };
    distance * scan_angle_deg.to_radians().cos()
}

/// Computes the wind speed and its error from a resolved delay and the plume
/// geometry (spec §4.10 steps 6 "Wind speed = d / mean-delay").
pub fn wind_speed(
    distance_m: f64,
    average_delay_s: f64,
    delay_std_s: f64,
    plume_height_above_scanner_m: f64,
    plume_height_error_m: f64,
) -> (f64, f64) {
    let speed = distance_m / average_delay_s;
    let error = (plume_height_error_m / average_delay_s).abs()
        + (plume_height_above_scanner_m * delay_std_s / average_delay_s.powi(2)).abs();
    (speed, error)
}
