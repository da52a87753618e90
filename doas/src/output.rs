//!
//! Output artifact writers (spec §4.12, §6): a per-spectrum evaluation log, an
//! appended flux log, and a per-instrument rejection/acceptance tally, one set per
//! fit window per instrument per day.
//!

use crate::result::Result;
use crate::tally::InstrumentTally;
use doas_model::data::{FitWindow, FluxResult, InstrumentLocation, ScanResult, ScannerType};
use std::io::Write;

/// Writes the evaluation log for one scan (spec §6 "Evaluation log (write)"):
/// a `<scaninformation>` block, a `<fluxinfo>` block when a flux was computed, and a
/// tab-separated data section headed by `#scanangle` (flat scanners) or
/// `#observationangle\tazimuth` (two-axis scanners), one row per spectrum per
/// reference.
pub fn write_evaluation_log<W: Write>(
    mut out: W,
    scan: &ScanResult,
    location: &InstrumentLocation,
    fit_window: &FitWindow,
    spectrometer_model: &str,
    flux: Option<&FluxResult>,
) -> Result<()> {
    let first_info = scan.spectrum_info.first();
    let (temperature, battery_voltage) = average_spectrum_telemetry(scan);

    writeln!(out, "<scaninformation>")?;
    writeln!(out, "\tserial={}", scan.instrument_serial)?;
    writeln!(out, "\tspectrometer={spectrometer_model}")?;
    writeln!(out, "\tchannel={}", if location.scanner_type == ScannerType::TwoAxis { 1 } else { 0 })?;
    writeln!(out, "\tconeangle={}", location.cone_angle)?;
    if let Some(info) = first_info {
        writeln!(out, "\tstarttime={}", info.start_time)?;
    }
    writeln!(out, "\tlat={}", location.position.latitude)?;
    writeln!(out, "\tlon={}", location.position.longitude)?;
    writeln!(out, "\taltitude={}", location.position.altitude)?;
    writeln!(out, "\tcompass={}", location.compass)?;
    writeln!(out, "\ttilt={}", location.tilt)?;
    writeln!(out, "\tmode={:?}", scan.measurement_mode.unwrap_or(doas_model::data::MeasurementMode::Unknown))?;
    writeln!(out, "\tversion=1")?;
    writeln!(out, "\tfitwindow={}", fit_window.name)?;
    writeln!(out, "\tinterlacesteps={}", fit_window.interlace_step)?;
    writeln!(out, "\tstartchannel={}", fit_window.start_channel)?;
    writeln!(out, "\tspectrumlength={}", fit_window.spectrum_length)?;
    if let Some(temperature) = temperature {
        writeln!(out, "\ttemperature={temperature}")?;
    }
    if let Some(battery_voltage) = battery_voltage {
        writeln!(out, "\tbattery={battery_voltage}")?;
    }
    writeln!(out, "</scaninformation>")?;

    if let Some(flux) = flux {
        writeln!(out, "<fluxinfo>")?;
        writeln!(out, "\tflux={}", flux.flux_kg_s)?;
        writeln!(out, "\tfluxerror={}", flux.error.combined())?;
        writeln!(out, "\twindspeed={}", flux.wind_speed_mps)?;
        writeln!(out, "\twinddirection={}", flux.wind_direction_deg)?;
        writeln!(out, "\tplumeheight={}", flux.plume_altitude_m)?;
        writeln!(out, "\tquality={:?}", flux.quality)?;
        writeln!(out, "</fluxinfo>")?;
    }

    let two_axis = location.scanner_type == ScannerType::TwoAxis;
    if two_axis {
        writeln!(out, "#observationangle\tazimuth\tcolumn\tcolumnerror\tshift\tshifterror\tsqueeze\tsqueezeerror\tdelta\tchisquare\tdeleted\tbadevaluation")?;
    } else {
        writeln!(out, "#scanangle\tcolumn\tcolumnerror\tshift\tshifterror\tsqueeze\tsqueezeerror\tdelta\tchisquare\tdeleted\tbadevaluation")?;
    }

    for ((eval, info), marks) in scan.evaluations.iter().zip(scan.spectrum_info.iter()).zip(scan.marks.iter()) {
        for result in &eval.references {
            if two_axis {
                write!(out, "{}\t{}\t", info.scan_angle, info.scan_angle_2)?;
            } else {
                write!(out, "{}\t", info.scan_angle)?;
            }
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                result.column,
                result.column_error,
                result.shift,
                result.shift_error,
                result.squeeze,
                result.squeeze_error,
                eval.delta,
                eval.chi_square,
                marks.deleted as u8,
                marks.bad_evaluation as u8,
            )?;
        }
    }

    Ok(())
}

/// Averages the per-spectrum temperature and battery voltage telemetry carried on
/// each `SpectrumInfo` (spec §6 "Evaluation log (write)"), returning `None` for an
/// empty scan. The original NOVAC log emits a "compile date" field here too, stamped
/// at build time by the evaluation program; this crate has no equivalent build-time
/// source for it and omits the field rather than fabricate one.
fn average_spectrum_telemetry(scan: &ScanResult) -> (Option<f64>, Option<f64>) {
    let count = scan.spectrum_info.len();
    if count == 0 {
        return (None, None);
    }
    let (temperature_sum, battery_sum) = scan
        .spectrum_info
        .iter()
        .fold((0.0, 0.0), |(t, b), info| (t + info.temperature, b + info.battery_voltage));
    (Some(temperature_sum / count as f64), Some(battery_sum / count as f64))
}

/// Appends one row to the flux log (spec §6, column order grounded on
/// `FluxCalculator.cpp::WriteFluxResult`): scandate, scanstarttime, scanstoptime,
/// flux (kg/s), wind speed and its error (m/s), wind direction and its error (deg),
/// wind-speed source, wind-direction source, plume height and its error (m),
/// plume-height source, compass direction (deg), plume centre (deg), plume
/// completeness (%), cone angle, tilt, quality flag, and the scan's averaged
/// temperature, battery voltage, and exposure time.
pub fn append_flux_log<W: Write>(mut out: W, flux: &FluxResult, write_header: bool) -> Result<()> {
    if write_header {
        writeln!(
            out,
            "#scandate\tscanstarttime\tscanstoptime\tflux_[kg/s]\twindspeed_[m/s]\twindspeederror_[m/s]\twinddirection_[deg]\twinddirectionerror_[deg]\twindspeedsource\twinddirectionsource\tplumeheight_[m]\tplumeheighterror_[m]\tplumeheightsource\tcompassdirection_[deg]\tplumecentre_[deg]\tplumecompleteness_[%]\tconeangle\ttilt\tokflux\ttemperature\tbattery\texposuretime_[ms]"
        )?;
    }
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:?}\t{:?}\t{}\t{}\t{:?}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        flux.start_time.as_datetime().format("%Y.%m.%d"),
        flux.start_time,
        flux.stop_time,
        flux.flux_kg_s,
        flux.wind_speed_mps,
        flux.wind_speed_error_mps,
        flux.wind_direction_deg,
        flux.wind_direction_error_deg,
        flux.wind_speed_source,
        flux.wind_direction_source,
        flux.plume_altitude_m,
        flux.plume_altitude_error_m,
        flux.plume_altitude_source,
        flux.compass,
        flux.plume_centre_alpha,
        flux.completeness * 100.0,
        flux.cone_angle,
        flux.tilt,
        matches!(flux.quality, doas_model::data::FluxQuality::Green) as u8,
        flux.average_temperature,
        flux.average_battery_voltage,
        flux.average_exposure_time_ms,
    )?;
    Ok(())
}

/// Writes the per-instrument rejection/acceptance tally (spec §4.12), one block per
/// instrument with its reason counts sorted by reason name.
pub fn write_tally<W: Write>(mut out: W, entries: &[(String, InstrumentTally)]) -> Result<()> {
    for (serial, tally) in entries {
        writeln!(out, "<instrument serial=\"{serial}\">")?;
        writeln!(out, "\tscansEvaluated={}", tally.scans_evaluated)?;
        writeln!(out, "\tscansRejected={}", tally.scans_rejected)?;
        writeln!(out, "\tspectraAccepted={}", tally.spectra_accepted)?;
        writeln!(out, "\tspectraRejected={}", tally.spectra_rejected)?;
        writeln!(out, "\tspectraCorrupted={}", tally.spectra_corrupted)?;
        writeln!(out, "\tfluxesComputed={}", tally.fluxes_computed)?;
        for (reason, count) in tally.rejection_reasons() {
            writeln!(out, "\treason[{reason}]={count}")?;
        }
        writeln!(out, "</instrument>")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{
        EvaluationResult, FitType, GpsPoint, MeasurementMode, Reference, ReferenceFitResult, ScannerType, SpectrumInfo,
        SpectrumMarks, Timestamp,
    };

    fn fit_window() -> FitWindow {
        FitWindow {
            name: "main".to_string(),
            fit_low: 10,
            fit_high: 400,
            polynomial_order: 3,
            fit_type: FitType::HighPassDivide,
            spectrometer_channel: 0,
            spectrum_length: 2048,
            interlace_step: 1,
            start_channel: 0,
            references: vec![Reference::new("SO2", vec![0.0; 2048])],
            fraunhofer_reference: None,
            child_windows: Vec::new(),
            auto_shift: true,
            sky_shift: false,
            offset_removal_range: None,
            valid_from: Timestamp::from_ymd_hms_milli(2000, 1, 1, 0, 0, 0, 0).unwrap(),
            valid_to: Timestamp::from_ymd_hms_milli(2100, 1, 1, 0, 0, 0, 0).unwrap(),
        }
    }

    fn location() -> InstrumentLocation {
        InstrumentLocation {
            position: GpsPoint::new(19.4, -155.6, 1200.0),
            compass: 266.0,
            cone_angle: 60.0,
            tilt: 0.0,
            scanner_type: ScannerType::FlatSingleAxis,
            spectrometer_model: "USB2000".to_string(),
            site_label: "Kilauea".to_string(),
            valid_from: Timestamp::from_ymd_hms_milli(2000, 1, 1, 0, 0, 0, 0).unwrap(),
            valid_to: Timestamp::from_ymd_hms_milli(2100, 1, 1, 0, 0, 0, 0).unwrap(),
        }
    }

    fn scan() -> ScanResult {
        let mut scan = ScanResult::new("I2J1234");
        scan.measurement_mode = Some(MeasurementMode::Flux);
        scan.push(
            EvaluationResult {
                references: vec![ReferenceFitResult {
                    column: 10.0,
                    column_error: 1.0,
                    shift: 0.0,
                    shift_error: 0.0,
                    squeeze: 1.0,
                    squeeze_error: 0.0,
                }],
                delta: 0.01,
                chi_square: 1.0,
            },
            SpectrumInfo {
                scan_angle: -10.0,
                scan_angle_2: 0.0,
                start_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap(),
                stop_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 1, 0).unwrap(),
                exposure_time_ms: 100,
                coadds: 10,
                temperature: 20.0,
                battery_voltage: 12.0,
            },
            SpectrumMarks::default(),
        );
        scan
    }

    #[test]
    fn evaluation_log_contains_expected_sections() {
        let mut buffer = Vec::new();
        write_evaluation_log(&mut buffer, &scan(), &location(), &fit_window(), "USB2000", None).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("<scaninformation>"));
        assert!(text.contains("interlacesteps=1"));
        assert!(text.contains("temperature=20"));
        assert!(text.contains("#scanangle"));
        assert!(text.contains("-10\t10\t1\t0\t0\t1\t0\t0.01\t1\t0\t0"));
    }

    #[test]
    fn tally_writer_lists_reasons() {
        let tally = crate::tally::Tally::new();
        tally.record_scan_rejected("I2J1234", "SkySaturationOutOfBand");
        let mut buffer = Vec::new();
        write_tally(&mut buffer, &tally.snapshot()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("reason[SkySaturationOutOfBand]=1"));
    }
}
