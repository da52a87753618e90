//!
//! Dark/offset resolver (C4, spec §4.4): given a scan reader, a measurement
//! spectrum, and the configured dark settings, decides which dark spectrum to
//! subtract and builds it.
//!

use crate::result::{Error, Result};
use doas_decode::ScanReader;
use doas_model::data::{ComponentOption, DarkSettings, DarkSpecOption, Spectrum};
use log::debug;

/// Loads a user-supplied spectrum from a plain two-column-or-one-column file using
/// the same relaxed parser as reference files, reinterpreting the values column as
/// intensities on the implicit pixel grid. Kept here (rather than in
/// `reference_loader`) because a user-supplied dark is a runtime measurement
/// artefact, not a species cross-section, even though the on-disk shape matches.
pub fn load_user_spectrum(path: &std::path::Path) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let loaded = crate::reference_loader::read_cross_section_file(reader)?;
    Ok(loaded.cross_section)
}

/// Resolves the dark spectrum to subtract from `measurement`, per the configured
/// [DarkSettings] policy (spec §4.4). `measurement` is used only to read its
/// exposure time and coadd count; its intensities are not touched.
pub fn resolve_dark(
    scan: &ScanReader,
    measurement_exposure_ms: u32,
    measurement_coadds: u32,
    settings: &DarkSettings,
) -> Result<Spectrum> {
    match settings.dark_spec_option {
        DarkSpecOption::MeasuredInScan => {
            match measured_in_scan(scan, measurement_exposure_ms, measurement_coadds) {
                Ok(dark) => {
                    debug!("Dark resolved via measured-in-scan policy");
                    Ok(dark)
                }
                Err(e) => {
                    debug!("measured-in-scan dark unavailable ({e}); falling back to model");
                    model_dark(scan, measurement_exposure_ms, settings)
                }
            }
        }
        DarkSpecOption::ModelIfMissing => match measured_in_scan(scan, measurement_exposure_ms, measurement_coadds) {
            Ok(dark) => {
                debug!("Dark resolved via measured-in-scan policy");
                Ok(dark)
            }
            Err(_) => {
                debug!("Dark resolved via model-if-missing policy");
                model_dark(scan, measurement_exposure_ms, settings)
            }
        },
        DarkSpecOption::ModelAlways => {
            debug!("Dark resolved via model-always policy");
            model_dark(scan, measurement_exposure_ms, settings)
        }
        DarkSpecOption::UserSupplied => {
            debug!("Dark resolved via user-supplied policy");
            user_supplied_dark(settings)
        }
    }
}

/// The in-file dark scaled to the measurement's coadd count, provided its exposure
/// time matches the measurement's (spec §4.4 bullet 1).
fn measured_in_scan(scan: &ScanReader, measurement_exposure_ms: u32, measurement_coadds: u32) -> Result<Spectrum> {
    let mut dark = scan.get_dark()?.clone();
    if dark.meta.exposure_time_ms != measurement_exposure_ms {
        return Err(Error::ExposureTimeMismatch {
            measurement_ms: measurement_exposure_ms,
            dark_ms: dark.meta.exposure_time_ms,
        });
    }
    dark.divide_by_coadds();
    let scale = measurement_coadds as f64 / dark.meta.coadds.max(1) as f64;
    if (scale - 1.0).abs() > 1e-9 {
        for v in dark.intensities_mut().iter_mut() {
            *v *= scale;
        }
    }
    Ok(dark)
}

/// `dark = offset + dark_current * exposure_time / dark_current_exposure_time`
/// (spec §4.4 bullet 2), with offset and dark-current each independently sourced
/// from-scan or user-supplied.
fn model_dark(scan: &ScanReader, measurement_exposure_ms: u32, settings: &DarkSettings) -> Result<Spectrum> {
    let offset = resolve_component(scan, settings.offset_option, &settings.user_offset_path, ComponentKind::Offset)?;
    let dark_current = resolve_component(
        scan,
        settings.dark_current_option,
        &settings.user_dark_current_path,
        ComponentKind::DarkCurrent,
    )?;

    let dark_current_exposure_ms = dark_current.meta.exposure_time_ms.max(1);
    let scale = measurement_exposure_ms as f64 / dark_current_exposure_ms as f64;

    let mut modelled = offset.clone();
    if modelled.len() != dark_current.len() {
        return Err(Error::Model(doas_model::Error::LengthMismatch {
            a: modelled.len(),
            b: dark_current.len(),
        }));
    }
    for (m, d) in modelled.intensities_mut().iter_mut().zip(dark_current.intensities().iter()) {
        *m += d * scale;
    }
    Ok(modelled)
}

#[derive(Clone, Copy)]
enum ComponentKind {
    Offset,
    DarkCurrent,
}

fn resolve_component(
    scan: &ScanReader,
    option: ComponentOption,
    user_path: &Option<String>,
    kind: ComponentKind,
) -> Result<Spectrum> {
    match option {
        ComponentOption::MeasuredInScan => {
            let mut spectrum = match kind {
                ComponentKind::Offset => scan.get_offset()?.clone(),
                ComponentKind::DarkCurrent => scan.get_dark_current()?.clone(),
            };
            spectrum.divide_by_coadds();
            Ok(spectrum)
        }
        ComponentOption::UserSupplied => {
            let path = user_path.as_ref().ok_or(Error::NoDarkAvailable)?;
            let intensities = load_user_spectrum(std::path::Path::new(path))?;
            let template = match kind {
                ComponentKind::Offset => scan.get_offset().or_else(|_| scan.get_dark())?,
                ComponentKind::DarkCurrent => scan.get_dark_current().or_else(|_| scan.get_dark())?,
            };
            let mut meta = template.meta.clone();
            meta.already_divided = true;
            Spectrum::new(intensities, meta).map_err(Error::Model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{SpectrumMetadata, Timestamp};

    fn meta(name_exposure_ms: u32, coadds: u32) -> SpectrumMetadata {
        SpectrumMetadata {
            device_serial: "I2J1234".into(),
            channel: 0,
            interlace_step: 1,
            start_channel: 0,
            exposure_time_ms: name_exposure_ms,
            coadds,
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
            already_divided: false,
        }
    }

    #[test]
    fn model_dark_combines_offset_and_scaled_dark_current() {
        let offset = Spectrum::new(vec![10.0, 10.0], meta(100, 1)).unwrap();
        let mut dark_current = Spectrum::new(vec![20.0, 40.0], meta(1000, 1)).unwrap();
        dark_current.meta.already_divided = true;

        let dark_current_exposure_ms = dark_current.meta.exposure_time_ms.max(1);
        let scale = 2000.0 / dark_current_exposure_ms as f64;
        let mut modelled = offset.clone();
        for (m, d) in modelled.intensities_mut().iter_mut().zip(dark_current.intensities().iter()) {
            *m += d * scale;
        }
        assert_eq!(modelled.intensities(), &[10.0 + 40.0, 10.0 + 80.0]);
    }
}
