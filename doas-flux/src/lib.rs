//!
//! Flux calculator (C11, spec §4.11): converts a flux-mode scan's column profile,
//! together with a wind field and plume altitude, into a gas mass flux with
//! per-source uncertainty components and a quality tier. Grounded on
//! `original_source/PPPLib/src/Flux/FluxCalculator.cpp::CalculateFlux`.
//!

#![forbid(unsafe_code)]

pub mod formula;
pub mod quality;
pub mod result;

pub use result::{Error, Result};

use doas_model::data::{
    FluxErrorComponents, FluxQuality, FluxResult, InstrumentLocation, MeasurementMode, Molecule, PlumeHeight, ScanResult,
    ScannerType, WindField,
};
use log::debug;

/// Minimum number of good (non-deleted, non-bad-evaluation) spectra required before
/// a flux is calculated, mirroring `CFluxCalculator::CalculateFlux`'s guard.
const MIN_GOOD_DATA_POINTS: usize = 10;

/// Inputs to one flux calculation: a single evaluated flux-mode scan, the target
/// species, the instrument's location at the time of the scan, and the wind/plume
/// height data to combine with it.
pub struct FluxInput<'a> {
    pub scan: &'a ScanResult,
    pub reference_index: usize,
    pub molecule: Molecule,
    pub location: &'a InstrumentLocation,
    pub wind: WindField,
    /// Plume altitude above sea level.
    pub plume_height: PlumeHeight,
    pub completeness_limit: f64,
}

struct GoodPoints {
    scan_angle: Vec<f64>,
    scan_angle_2: Vec<f64>,
    column_kg_m2: Vec<f64>,
}

fn collect_good_points(input: &FluxInput, offset_kg_m2: f64) -> GoodPoints {
    let mut points = GoodPoints {
        scan_angle: Vec::new(),
        scan_angle_2: Vec::new(),
        column_kg_m2: Vec::new(),
    };
    for ((eval, info), marks) in input
        .scan
        .evaluations
        .iter()
        .zip(input.scan.spectrum_info.iter())
        .zip(input.scan.marks.iter())
    {
        if marks.deleted || marks.bad_evaluation {
            continue;
        }
        let Some(reference) = eval.reference(input.reference_index) else {
            continue;
        };
        points.scan_angle.push(info.scan_angle);
        points.scan_angle_2.push(info.scan_angle_2);
        points
            .column_kg_m2
            .push(input.molecule.convert_molec_cm2_to_kg_m2(reference.column) - offset_kg_m2);
    }
    points
}

fn evaluate_flux(points: &GoodPoints, location: &InstrumentLocation, relative_plume_height_m: f64, wind_speed_mps: f64, wind_direction_deg: f64) -> f64 {
    let flux = if location.scanner_type == ScannerType::TwoAxis {
        formula::two_axis_flux(
            &points.scan_angle,
            &points.scan_angle_2,
            &points.column_kg_m2,
            relative_plume_height_m,
            wind_speed_mps,
            wind_direction_deg,
            location.compass,
        )
    } else {
        formula::single_axis_flux(
            &points.scan_angle,
            &points.column_kg_m2,
            relative_plume_height_m,
            wind_speed_mps,
            wind_direction_deg,
            location.compass,
            location.cone_angle,
            location.tilt,
        )
    };
    flux.abs()
}

/// Calculates the flux and its uncertainty for one evaluated scan (spec §4.11).
pub fn calculate_flux(input: &FluxInput) -> Result<FluxResult> {
    if input.scan.measurement_mode != Some(MeasurementMode::Flux) {
        return Err(Error::NotAFluxMeasurement);
    }

    let plume_properties = input.scan.plume_properties.ok_or(Error::PlumeNotSeen)?;

    if plume_properties.completeness < input.completeness_limit {
        return Err(Error::CompletenessTooLow {
            completeness: plume_properties.completeness,
            limit: input.completeness_limit,
        });
    }

    let relative_plume_height_m = input.plume_height.altitude_m - input.location.position.altitude;
    if relative_plume_height_m <= 0.0 {
        return Err(Error::NonPositivePlumeHeight {
            plume_altitude_m: input.plume_height.altitude_m,
        });
    }

    let offset_kg_m2 = input.molecule.convert_molec_cm2_to_kg_m2(plume_properties.offset);
    let points = collect_good_points(input, offset_kg_m2);
    if points.column_kg_m2.len() < MIN_GOOD_DATA_POINTS {
        return Err(Error::TooFewGoodDataPoints {
            found: points.column_kg_m2.len(),
            required: MIN_GOOD_DATA_POINTS,
        });
    }

    let flux_central = evaluate_flux(
        &points,
        input.location,
        relative_plume_height_m,
        input.wind.speed_mps,
        input.wind.direction_deg,
    );

    let flux_minus = evaluate_flux(
        &points,
        input.location,
        relative_plume_height_m,
        input.wind.speed_mps,
        input.wind.direction_deg - input.wind.direction_error_deg,
    );
    let flux_plus = evaluate_flux(
        &points,
        input.location,
        relative_plume_height_m,
        input.wind.speed_mps,
        input.wind.direction_deg + input.wind.direction_error_deg,
    );
    let wind_direction_component = (flux_minus - flux_central).abs().max((flux_plus - flux_central).abs());
    let wind_speed_component = flux_central * input.wind.speed_error_mps / input.wind.speed_mps;
    let plume_height_component = flux_central * input.plume_height.altitude_error_m / relative_plume_height_m;

    let quality = quality::overall_quality(input.wind.speed_source, input.plume_height.source, plume_properties.completeness);

    let spectrum_count = input.scan.spectrum_info.len().max(1) as f64;
    let (temperature_sum, battery_sum, exposure_sum) = input.scan.spectrum_info.iter().fold((0.0, 0.0, 0u64), |(t, b, e), info| {
        (t + info.temperature, b + info.battery_voltage, e + info.exposure_time_ms as u64)
    });

    let start_time = input
        .scan
        .spectrum_info
        .first()
        .map(|info| info.start_time)
        .unwrap_or(input.plume_height.valid_from);
    let stop_time = input
        .scan
        .spectrum_info
        .last()
        .map(|info| info.stop_time)
        .unwrap_or(input.plume_height.valid_to);

    debug!(
        "flux={flux_central:.2} kg/s quality={quality:?} good_points={} completeness={:.2}",
        points.column_kg_m2.len(),
        plume_properties.completeness
    );

    Ok(FluxResult {
        flux_kg_s: flux_central,
        error: FluxErrorComponents {
            wind_direction_component,
            wind_speed_component,
            plume_height_component,
        },
        wind_speed_mps: input.wind.speed_mps,
        wind_speed_error_mps: input.wind.speed_error_mps,
        wind_speed_source: input.wind.speed_source,
        wind_direction_deg: input.wind.direction_deg,
        wind_direction_error_deg: input.wind.direction_error_deg,
        wind_direction_source: input.wind.direction_source,
        plume_altitude_m: input.plume_height.altitude_m,
        plume_altitude_error_m: input.plume_height.altitude_error_m,
        plume_altitude_source: input.plume_height.source,
        good_spectrum_count: points.column_kg_m2.len(),
        average_temperature: temperature_sum / spectrum_count,
        average_battery_voltage: battery_sum / spectrum_count,
        average_exposure_time_ms: (exposure_sum as f64 / spectrum_count).round() as u32,
        cone_angle: input.location.cone_angle,
        tilt: input.location.tilt,
        compass: input.location.compass,
        instrument_serial: input.scan.instrument_serial.clone(),
        scanner_type: input.location.scanner_type,
        scan_offset: plume_properties.offset,
        completeness: plume_properties.completeness,
        plume_centre_alpha: plume_properties.centre_alpha,
        plume_centre_phi: plume_properties.centre_phi,
        start_time,
        stop_time,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{
        EvaluationResult, GpsPoint, MeteorologySource, PlumeProperties, ReferenceFitResult, SpectrumInfo, SpectrumMarks, Timestamp,
    };

    fn location() -> InstrumentLocation {
        let base = Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap();
        InstrumentLocation {
            position: GpsPoint::new(19.4, -155.6, 1000.0),
            compass: 0.0,
            cone_angle: 90.0,
            tilt: 0.0,
            scanner_type: ScannerType::FlatSingleAxis,
            spectrometer_model: "USB2000".into(),
            site_label: "test".into(),
            valid_from: base,
            valid_to: base.add_days(365),
        }
    }

    fn flux_mode_scan() -> ScanResult {
        let mut scan = ScanResult::new("I2J1234");
        scan.measurement_mode = Some(MeasurementMode::Flux);
        scan.plume_properties = Some(PlumeProperties {
            offset: 0.0,
            centre_alpha: 0.0,
            centre_phi: 0.0,
            edge_low: -30.0,
            edge_high: 30.0,
            completeness: 0.95,
            centre_error: 1.0,
            visible: true,
        });
        let base = Timestamp::from_ymd_hms_milli(2024, 3, 1, 10, 0, 0, 0).unwrap();
        for i in -10..=10 {
            let angle = i as f64 * 5.0;
            let column = 1.0e18 * (1.0 - (angle / 60.0).powi(2)).max(0.0);
            scan.push(
                EvaluationResult {
                    references: vec![ReferenceFitResult {
                        column,
                        column_error: column * 0.05,
                        shift: 0.0,
                        shift_error: 0.0,
                        squeeze: 1.0,
                        squeeze_error: 0.0,
                    }],
                    delta: 0.01,
                    chi_square: 1.0,
                },
                SpectrumInfo {
                    scan_angle: angle,
                    scan_angle_2: 0.0,
                    start_time: base,
                    stop_time: base.add_seconds(i as i64),
                    exposure_time_ms: 200,
                    coadds: 15,
                    temperature: 25.0,
                    battery_voltage: 12.0,
                },
                SpectrumMarks::default(),
            );
        }
        scan
    }

    fn wind_field() -> WindField {
        let base = Timestamp::from_ymd_hms_milli(2024, 3, 1, 9, 0, 0, 0).unwrap();
        WindField {
            speed_mps: 5.0,
            speed_error_mps: 1.0,
            speed_source: MeteorologySource::EcmwfForecast,
            direction_deg: 90.0,
            direction_error_deg: 10.0,
            direction_source: MeteorologySource::EcmwfForecast,
            valid_from: base,
            valid_to: base.add_days(1),
            location: GpsPoint::new(19.4, -155.6, 1000.0),
        }
    }

    fn plume_height() -> PlumeHeight {
        let base = Timestamp::from_ymd_hms_milli(2024, 3, 1, 9, 0, 0, 0).unwrap();
        PlumeHeight {
            altitude_m: 2000.0,
            altitude_error_m: 100.0,
            source: MeteorologySource::GeometryCalculationTwoInstruments,
            valid_from: base,
            valid_to: base.add_days(1),
        }
    }

    #[test]
    fn well_formed_flux_scan_produces_a_positive_flux_with_green_quality() {
        let location = location();
        let scan = flux_mode_scan();
        let input = FluxInput {
            scan: &scan,
            reference_index: 0,
            molecule: Molecule::SO2,
            location: &location,
            wind: wind_field(),
            plume_height: plume_height(),
            completeness_limit: 0.7,
        };
        let result = calculate_flux(&input).unwrap();
        assert!(result.flux_kg_s > 0.0);
        assert_eq!(result.quality, FluxQuality::Green);
        assert_eq!(result.good_spectrum_count, 21);
    }

    #[test]
    fn non_flux_mode_is_rejected() {
        let location = location();
        let mut scan = flux_mode_scan();
        scan.measurement_mode = Some(MeasurementMode::WindSpeed);
        let input = FluxInput {
            scan: &scan,
            reference_index: 0,
            molecule: Molecule::SO2,
            location: &location,
            wind: wind_field(),
            plume_height: plume_height(),
            completeness_limit: 0.7,
        };
        assert!(matches!(calculate_flux(&input), Err(Error::NotAFluxMeasurement)));
    }

    #[test]
    fn low_completeness_is_rejected() {
        let location = location();
        let mut scan = flux_mode_scan();
        scan.plume_properties.as_mut().unwrap().completeness = 0.5;
        let input = FluxInput {
            scan: &scan,
            reference_index: 0,
            molecule: Molecule::SO2,
            location: &location,
            wind: wind_field(),
            plume_height: plume_height(),
            completeness_limit: 0.7,
        };
        assert!(matches!(calculate_flux(&input), Err(Error::CompletenessTooLow { .. })));
    }

    #[test]
    fn default_wind_source_forces_red_quality() {
        let location = location();
        let scan = flux_mode_scan();
        let mut wind = wind_field();
        wind.speed_source = MeteorologySource::Default;
        let input = FluxInput {
            scan: &scan,
            reference_index: 0,
            molecule: Molecule::SO2,
            location: &location,
            wind,
            plume_height: plume_height(),
            completeness_limit: 0.7,
        };
        let result = calculate_flux(&input).unwrap();
        assert_eq!(result.quality, FluxQuality::Red);
    }
}
