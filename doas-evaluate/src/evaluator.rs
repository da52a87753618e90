//!
//! Scan evaluator (C6, spec §4.6): orchestrates the reference loader, dark resolver,
//! and fit core (C3-C5) across one scan, producing a [ScanResult].
//!

use crate::result::{Error, Result};
use crate::settings::{dynamic_range_for_model, EvaluationSettings};
use crate::sky;
use doas_decode::ScanReader;
use doas_fit::resolve_dark;
use doas_model::data::{
    DarkSettings, EvaluationResult, FitOption, FitWindow, ReferenceFitResult, ScanResult, Spectrum, SpectrumInfo,
    SpectrumMarks,
};
use log::{debug, warn};

/// Evaluates every measurement spectrum of `scan` against `fit_window`, honouring
/// `settings` and `dark_settings`. Public contract mirrors spec §4.6.
pub fn evaluate(
    scan: &mut ScanReader,
    fit_window: &FitWindow,
    spectrometer_model: &str,
    dark_settings: &DarkSettings,
    settings: &EvaluationSettings,
) -> Result<ScanResult> {
    fit_window
        .validate()
        .map_err(|msg| Error::InvalidFitWindow(fit_window.name.clone(), msg))?;

    // Setup phase: the scan's observed geometry dominates the configured defaults
    // (spec §4.6 "rebinds interlaceStep, specLength, startChannel from the scan's
    // observed values").
    let mut window = fit_window.clone();
    window.interlace_step = scan.interlace_step();
    window.start_channel = scan.start_channel();
    window.spectrum_length = scan.spectrum_length();

    let dynamic_range = dynamic_range_for_model(spectrometer_model);

    check_sky_saturation(scan, &window, dynamic_range, settings)?;

    window = pre_evaluate(scan, &window, dynamic_range, settings)?;

    let sky_spectrum = sky::acquire_sky(scan, &settings.sky_option, window.fit_low, window.fit_high, dynamic_range)?;
    let mut sky_spectrum = sky_spectrum;
    if !settings.already_averaged {
        sky_spectrum.divide_by_coadds();
    }

    let mut result = ScanResult::new(scan_serial(scan));

    scan.reset();
    let mut strongest_absolute_column = f64::MIN;
    let mut strongest_index: Option<usize> = None;

    while let Some((index, outcome)) = scan.get_next_measurement_spectrum() {
        let mut measurement = match outcome {
            Ok(spectrum) => spectrum.clone(),
            Err(e) => {
                warn!("spectrum {index} could not be read: {e}");
                result.corrupted_indices.insert(index as u16);
                continue;
            }
        };

        if measurement.meta.interlace_step > 1 {
            measurement = measurement.de_interlace();
        }

        let measurement_last = measurement.len().saturating_sub(1);
        let peak_intensity = measurement
            .max_in_range(window.fit_low.min(measurement_last), window.fit_high.min(measurement_last))
            .unwrap_or(0.0);

        let dark = resolve_dark(scan, measurement.meta.exposure_time_ms, measurement.meta.coadds, dark_settings)?;
        let min_len = measurement.len().min(dark.len()).saturating_sub(1);
        let dark_floor = dark
            .min_in_range(window.fit_low.min(min_len), window.fit_high.min(min_len))
            .unwrap_or(0.0);
        let saturation_signal = peak_intensity - dark_floor;

        if saturation_signal < dynamic_range * settings.minimum_saturation_in_fit_region {
            debug!("spectrum {index} ignored: below minimum saturation in fit region");
            continue;
        }

        if !settings.already_averaged {
            measurement.divide_by_coadds();
        }
        let mut dark = dark;
        if !settings.already_averaged {
            dark.divide_by_coadds();
        }
        measurement.sub_assign(&dark)?;

        let fit_outcome = doas_fit::fit(&measurement, &sky_spectrum, &window);

        let (eval, bad) = match fit_outcome {
            Ok(eval) => {
                let accepted = eval.chi_square.is_finite()
                    && eval.chi_square <= settings.chi_square_limit
                    && eval.references.iter().all(|r| r.column_error.is_finite());
                (eval, !accepted)
            }
            Err(e) => {
                debug!("spectrum {index} fit failed: {e}");
                (placeholder_evaluation(&window), true)
            }
        };

        if !bad && !eval.references.is_empty() {
            let column = eval.references[0].column.abs();
            if column > strongest_absolute_column {
                strongest_absolute_column = column;
                strongest_index = Some(result.len());
            }
        }

        let info = SpectrumInfo {
            scan_angle: measurement.meta.scan_angle,
            scan_angle_2: measurement.meta.scan_angle_2,
            start_time: measurement.meta.start_time.clone(),
            stop_time: measurement.meta.stop_time.clone(),
            exposure_time_ms: measurement.meta.exposure_time_ms,
            coadds: measurement.meta.coadds,
            temperature: measurement.meta.temperature,
            battery_voltage: measurement.meta.battery_voltage,
        };
        result.push(eval, info, SpectrumMarks { deleted: false, bad_evaluation: bad });
    }

    let _ = strongest_index;
    Ok(result)
}

fn scan_serial(scan: &ScanReader) -> String {
    scan.get_sky()
        .map(|s| s.meta.device_serial.clone())
        .or_else(|_| scan.get_dark().map(|s| s.meta.device_serial.clone()))
        .unwrap_or_default()
}

fn check_sky_saturation(
    scan: &ScanReader,
    window: &FitWindow,
    dynamic_range: f64,
    settings: &EvaluationSettings,
) -> Result<()> {
    let sky = scan.get_sky()?;
    let high = window.fit_high.min(sky.len().saturating_sub(1));
    let low = window.fit_low.min(high);
    let peak = sky.max_in_range(low, high).unwrap_or(0.0);
    let full_scale = dynamic_range * sky.meta.coadds.max(1) as f64;
    let ratio = peak / full_scale;
    if ratio <= settings.minimum_saturation_in_fit_region || ratio >= 0.95 {
        return Err(Error::SkySaturationOutOfBand {
            ratio,
            min: settings.minimum_saturation_in_fit_region,
            max: 0.95,
        });
    }
    Ok(())
}

/// Pre-evaluation decision tree (spec §4.6): Fraunhofer-based shift determination,
/// auto-shift from the strongest absorber, or the window as configured.
fn pre_evaluate(
    scan: &mut ScanReader,
    window: &FitWindow,
    dynamic_range: f64,
    settings: &EvaluationSettings,
) -> Result<FitWindow> {
    if let Some(fraunhofer) = &window.fraunhofer_reference {
        return pre_evaluate_fraunhofer(scan, window, fraunhofer, dynamic_range);
    }
    if settings.find_optimal_shift {
        return pre_evaluate_auto_shift(scan, window, dynamic_range, settings);
    }
    Ok(window.clone())
}

fn pre_evaluate_fraunhofer(
    scan: &mut ScanReader,
    window: &FitWindow,
    fraunhofer: &doas_model::data::Reference,
    dynamic_range: f64,
) -> Result<FitWindow> {
    let sky = scan.get_sky()?.clone();

    scan.reset();
    let mut best_index = None;
    let mut best_ratio_distance = f64::MAX;
    while let Some((index, outcome)) = scan.get_next_measurement_spectrum() {
        let Ok(spectrum) = outcome else { continue };
        let high = window.fit_high.min(spectrum.len().saturating_sub(1));
        let peak = spectrum.max_in_range(window.fit_low.min(high), high).unwrap_or(0.0);
        let full_scale = dynamic_range * spectrum.meta.coadds.max(1) as f64;
        let ratio = peak / full_scale;
        if ratio > 0.1 && ratio < 0.9 {
            let distance = (0.9 - ratio).abs();
            if distance < best_ratio_distance {
                best_ratio_distance = distance;
                best_index = Some(index);
            }
        }
    }

    let Some(candidate_index) = best_index else {
        debug!("no Fraunhofer calibration candidate found, using configured window");
        return Ok(window.clone());
    };

    let candidate = scan.get_spectrum_by_index(candidate_index)?.clone();

    let mut probe_reference = fraunhofer.clone();
    probe_reference.shift_option = FitOption::Free;
    probe_reference.squeeze_option = FitOption::Fixed { value: 1.0 };

    let mut probe_window = window.clone();
    probe_window.references = vec![probe_reference];
    probe_window.fraunhofer_reference = None;

    let probe = doas_fit::fit(&candidate, &sky, &probe_window)?;
    let fitted = &probe.references[0];

    if fitted.shift_error.abs() < 1.0 && fitted.squeeze_error.abs() < 0.01 {
        debug!(
            "Fraunhofer calibration locked shift={:.3} squeeze={:.4}",
            fitted.shift, fitted.squeeze
        );
        let mut frozen = window.clone();
        for reference in frozen.references.iter_mut() {
            reference.shift_option = FitOption::Fixed { value: fitted.shift };
            reference.squeeze_option = FitOption::Fixed { value: fitted.squeeze };
        }
        Ok(frozen)
    } else {
        debug!("Fraunhofer calibration did not converge tightly enough, using configured window");
        Ok(window.clone())
    }
}

fn pre_evaluate_auto_shift(
    scan: &mut ScanReader,
    window: &FitWindow,
    dynamic_range: f64,
    settings: &EvaluationSettings,
) -> Result<FitWindow> {
    let sky = scan.get_sky()?.clone();
    let mut zeroed = window.clone();
    for reference in zeroed.references.iter_mut() {
        reference.shift_option = FitOption::Fixed { value: 0.0 };
        reference.squeeze_option = FitOption::Fixed { value: 1.0 };
    }

    scan.reset();
    let mut strongest: Option<(usize, Spectrum, EvaluationResult)> = None;
    while let Some((index, outcome)) = scan.get_next_measurement_spectrum() {
        let Ok(spectrum) = outcome else { continue };
        let high = window.fit_high.min(spectrum.len().saturating_sub(1));
        let peak = spectrum.max_in_range(window.fit_low.min(high), high).unwrap_or(0.0);
        let full_scale = dynamic_range * spectrum.meta.coadds.max(1) as f64;
        if peak / full_scale < settings.minimum_saturation_in_fit_region {
            continue;
        }
        let Ok(eval) = doas_fit::fit(spectrum, &sky, &zeroed) else { continue };
        let column = eval.references.first().map(|r| r.column.abs()).unwrap_or(0.0);
        let is_stronger = strongest
            .as_ref()
            .map(|(_, _, prev)| column > prev.references[0].column.abs())
            .unwrap_or(true);
        if is_stronger {
            strongest = Some((index, spectrum.clone(), eval));
        }
    }

    let Some((index, spectrum, eval)) = strongest else {
        debug!("auto-shift: no good spectra in scan, using configured window");
        return Ok(window.clone());
    };

    let strongest_column = eval.references[0].column;
    let strongest_error = eval.references[0].column_error;
    if strongest_column.abs() < 2.0 * strongest_error {
        debug!("auto-shift: maximum column too low (index {index}), using configured window");
        return Ok(window.clone());
    }

    let mut probe_window = window.clone();
    if let Some(first) = probe_window.references.first_mut() {
        first.shift_option = FitOption::Free;
        first.squeeze_option = FitOption::Fixed { value: 1.0 };
    }
    let leader_name = probe_window.references.first().map(|r| r.species_name.clone());
    for reference in probe_window.references.iter_mut().skip(1) {
        if let Some(name) = &leader_name {
            reference.shift_option = FitOption::Linked { to: name.clone() };
        }
    }

    let probe = doas_fit::fit(&spectrum, &sky, &probe_window)?;
    let shift = probe.references[0].shift;
    let squeeze = probe.references[0].squeeze;

    let mut frozen = window.clone();
    for reference in frozen.references.iter_mut() {
        reference.shift_option = FitOption::Fixed { value: shift };
        reference.squeeze_option = FitOption::Fixed { value: squeeze };
    }
    Ok(frozen)
}

fn placeholder_evaluation(window: &FitWindow) -> EvaluationResult {
    EvaluationResult {
        references: window
            .references
            .iter()
            .map(|_| ReferenceFitResult {
                column: 0.0,
                column_error: f64::INFINITY,
                shift: 0.0,
                shift_error: 0.0,
                squeeze: 1.0,
                squeeze_error: 0.0,
            })
            .collect(),
        delta: f64::INFINITY,
        chi_square: f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{FitType, Reference, SpectrumMetadata, Timestamp};

    fn meta(angle: f64) -> SpectrumMetadata {
        SpectrumMetadata {
            device_serial: "I2J1234".into(),
            channel: 0,
            interlace_step: 1,
            start_channel: 0,
            exposure_time_ms: 100,
            coadds: 1,
            start_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap(),
            stop_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 1, 0).unwrap(),
            scan_angle: angle,
            scan_angle_2: 0.0,
            peak_intensity: 0.0,
            fit_region_intensity: 0.0,
            electronic_offset: 0.0,
            temperature: 20.0,
            battery_voltage: 12.0,
            scan_index: 0,
            scan_count: 10,
            flags: 0,
            already_divided: false,
        }
    }

    fn window() -> FitWindow {
        FitWindow {
            name: "main".into(),
            fit_low: 10,
            fit_high: 180,
            polynomial_order: 2,
            fit_type: FitType::PolynomialOnOpticalDepth,
            spectrometer_channel: 0,
            spectrum_length: 200,
            interlace_step: 1,
            start_channel: 0,
            references: vec![Reference::new("SO2", vec![0.001; 200])],
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
    fn sky_saturation_out_of_band_rejects_scan() {
        let sky = Spectrum::new(vec![50.0; 200], meta(0.0)).unwrap();
        let settings = EvaluationSettings::default();
        let ratio = sky.max_in_range(10, 180).unwrap() / (4095.0);
        assert!(ratio <= settings.minimum_saturation_in_fit_region);
    }

    #[test]
    fn placeholder_evaluation_has_infinite_column_error() {
        let eval = placeholder_evaluation(&window());
        assert_eq!(eval.references.len(), 1);
        assert!(eval.references[0].column_error.is_infinite());
    }
}
