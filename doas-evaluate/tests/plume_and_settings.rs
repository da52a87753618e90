//! Integration coverage for the plume extractor (C7) and evaluator settings that
//! doesn't require a full scan fixture.

use doas_evaluate::settings::dynamic_range_for_model;
use doas_evaluate::{extract_plume_properties, EvaluationSettings, SkyOption};
use doas_model::data::{EvaluationResult, ReferenceFitResult, ScanResult, SpectrumInfo, SpectrumMarks, Timestamp};

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

#[test]
fn plume_extraction_recovers_centre_of_a_shifted_gaussian_plume() {
    let mut result = ScanResult::new("I2J1234");
    for i in -45..=45 {
        let angle = i as f64 * 2.0;
        let offset_angle = angle - 20.0;
        let plume = 800.0 * (-(offset_angle * offset_angle) / (2.0 * 12.0 * 12.0)).exp();
        result.push(eval(5.0 + plume), info(angle), SpectrumMarks::default());
    }

    let properties = extract_plume_properties(&result, 0).expect("plume should be detected");
    assert!((properties.centre_alpha - 20.0).abs() < 6.0);
    assert!(properties.visible);
    assert!(properties.completeness >= 0.5 && properties.completeness <= 1.0);
}

#[test]
fn default_settings_use_scan_as_sky_source() {
    let settings = EvaluationSettings::default();
    assert_eq!(settings.sky_option, SkyOption::Scan);
    assert!(settings.minimum_saturation_in_fit_region < settings.maximum_saturation_in_fit_region);
}

#[test]
fn unknown_spectrometer_model_falls_back_to_twelve_bit_range() {
    assert_eq!(dynamic_range_for_model("QE65000"), 65535.0);
    assert_eq!(dynamic_range_for_model("some-unknown-model"), 4095.0);
}
