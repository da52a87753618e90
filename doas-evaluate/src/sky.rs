//!
//! Sky-spectrum acquisition (spec §4.6 "Sky acquisition honours the user's
//! skyOption"), grounded on `original_source/PPPExe/Evaluation/ScanEvaluation.cpp`'s
//! `GetSky`.
//!

use crate::result::{Error, Result};
use crate::settings::SkyOption;
use doas_decode::ScanReader;
use doas_model::data::Spectrum;

/// Acquires the sky spectrum for one scan per `option`. `fit_low`/`fit_high` bound
/// the saturation check used by [SkyOption::AverageOfGood]; `dynamic_range` is the
/// spectrometer model's full ADC count.
pub fn acquire_sky(
    scan: &mut ScanReader,
    option: &SkyOption,
    fit_low: usize,
    fit_high: usize,
    dynamic_range: f64,
) -> Result<Spectrum> {
    match option {
        SkyOption::Scan => Ok(de_interlace_if_needed(scan.get_sky()?.clone())),
        SkyOption::Index(index) => Ok(de_interlace_if_needed(scan.get_spectrum_by_index(*index)?.clone())),
        SkyOption::User(path) => {
            let intensities = doas_fit::dark::load_user_spectrum(std::path::Path::new(path))?;
            let mut meta = scan.get_sky()?.meta.clone();
            meta.already_divided = true;
            Spectrum::new(intensities, meta).map_err(Error::Model)
        }
        SkyOption::AverageOfGood => average_of_good(scan, fit_low, fit_high, dynamic_range),
    }
}

fn de_interlace_if_needed(spectrum: Spectrum) -> Spectrum {
    if spectrum.meta.interlace_step > 1 {
        spectrum.de_interlace()
    } else {
        spectrum
    }
}

/// Averages every credible (unsaturated at full-coadd scale, non-dark) spectrum
/// recorded as "sky" or a measurement in the scan. Mirrors the original's loop over
/// every spectrum it can read rather than only ones classified "sky", since a
/// dedicated sky-averaging acquisition considers the whole scan a candidate pool.
fn average_of_good(scan: &mut ScanReader, fit_low: usize, fit_high: usize, dynamic_range: f64) -> Result<Spectrum> {
    let mut accumulator: Option<Spectrum> = None;
    let mut count = 0u32;

    let candidate_indices: Vec<usize> = (0..scan.len()).collect();
    for idx in candidate_indices {
        let spectrum = match scan.get_spectrum_by_index(idx) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let max_intensity = match spectrum.max_in_range(fit_low.min(spectrum.len().saturating_sub(1)), fit_high.min(spectrum.len().saturating_sub(1))) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let full_scale = dynamic_range * spectrum.meta.coadds.max(1) as f64;
        if max_intensity >= full_scale {
            continue;
        }
        match &mut accumulator {
            Some(acc) => {
                acc.add_assign(spectrum)?;
                count += 1;
            }
            None => {
                accumulator = Some(spectrum.clone());
                count = 1;
            }
        }
    }

    let mut sky = accumulator.ok_or(Error::NoMeasurementsFound)?;
    if count > 1 {
        for v in sky.intensities_mut().iter_mut() {
            *v /= count as f64;
        }
    }
    Ok(de_interlace_if_needed(sky))
}
