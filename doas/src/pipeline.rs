//!
//! Pipeline orchestration (spec §4.12, §5): runs the three serialised phases over
//! one instrument-day's worth of discovered scans -- evaluate every scan, insert
//! whatever geometry (plume altitude, dual-beam wind speed) the batch yields, then
//! compute flux for every flux-mode scan against the now-complete databases -- and
//! writes the resulting evaluation log, flux log, and tally. Grounded on the
//! top-level driver loop implied by `original_source/_INDEX.md`'s absence of a
//! single orchestrating file: NOVAC's own driver is a GUI event loop, so this phase
//! split is this crate's own translation of spec §5's "the driver runs scan
//! evaluation, geometry computation, and flux computation as serialised phases"
//! into a batch program, using `nexrad`'s `#[cfg(feature = "rayon")] par_iter()`
//! pattern for the one phase (evaluation) that parallelises cleanly across
//! instruments.
//!

use crate::config::{InstrumentEvaluation, ProcessingConfig};
use crate::discovery::{self, DiscoveredScan};
use crate::output;
use crate::result::{Error, Result};
use crate::tally::Tally;
use doas_decode::ScanReader;
use doas_db::{LookupMethod, PlumeHeightDatabase, WindDatabase};
use doas_evaluate::settings::EvaluationSettings;
use doas_geometry::two_instrument::{self, PlumeCentreObservation};
use doas_geometry::{dual_beam, ColumnSeries, DualBeamSettings};
use doas_model::data::{
    FitWindow, InstrumentHistory, InstrumentLocation, MeasurementMode, MeteorologySource, PlumeHeight, ScanResult,
    Timestamp, WindField,
};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The index of the reference within a fit window taken to be the target molecule
/// (spec §6 "main" fit window names the molecule's own window; within it, the first
/// `<Reference>` is the molecule itself by the Evaluation document's own convention
/// -- secondary references such as O3 or a broadening species follow it).
const MAIN_REFERENCE_INDEX: usize = 0;

/// Everything the pipeline needs that does not change across a run: the location
/// and fit-window/dark-rule histories, the run's processing options, and the shared
/// tally every phase records into.
pub struct PipelineContext {
    pub setup: Vec<InstrumentHistory>,
    pub evaluation: Vec<InstrumentEvaluation>,
    pub config: ProcessingConfig,
    pub tally: Arc<Tally>,
}

impl PipelineContext {
    fn location_at(&self, serial: &str, time: &Timestamp) -> Option<InstrumentLocation> {
        self.setup.iter().find(|h| h.serial == serial).and_then(|h| h.at(time)).cloned()
    }

    fn evaluation_for(&self, serial: &str) -> Option<&InstrumentEvaluation> {
        self.evaluation.iter().find(|e| e.serial == serial)
    }
}

/// One scan after evaluation (C6) and plume-property extraction (C7), with the
/// instrument location and fit window it was evaluated against carried alongside so
/// later phases do not need to re-resolve either.
pub struct EvaluatedScan {
    pub serial: String,
    pub channel: u16,
    pub location: InstrumentLocation,
    pub fit_window: FitWindow,
    pub result: ScanResult,
}

fn evaluation_settings(config: &ProcessingConfig) -> EvaluationSettings {
    EvaluationSettings {
        sky_option: config.sky_option.clone(),
        minimum_saturation_in_fit_region: config.discarding.minimum_saturation_in_fit_region,
        maximum_saturation_in_fit_region: 0.95,
        chi_square_limit: 10.0,
        find_optimal_shift: false,
        already_averaged: false,
    }
}

/// Evaluates one discovered scan file (spec §4.12's per-scan step), recording its
/// outcome in the tally either way. Returns `None` for anything that could not be
/// evaluated at all -- a missing location/fit-window/evaluation entry, a corrupt
/// file, or an evaluator rejection such as `SkySaturationOutOfBand` -- since none of
/// those produce a [ScanResult] worth carrying into later phases.
fn evaluate_one(scan: &DiscoveredScan, ctx: &PipelineContext) -> Option<EvaluatedScan> {
    let Some(location) = ctx.location_at(&scan.serial, &scan.start_time) else {
        warn!("no location history covers '{}' at {}", scan.serial, scan.start_time);
        ctx.tally.record_scan_rejected(&scan.serial, "NoLocationAtTime");
        return None;
    };
    let Some(evaluation) = ctx.evaluation_for(&scan.serial) else {
        warn!("no evaluation configuration for instrument '{}'", scan.serial);
        ctx.tally.record_scan_rejected(&scan.serial, "NoEvaluationConfiguration");
        return None;
    };
    let Some(fit_window) = evaluation.fit_window_at(&scan.start_time) else {
        warn!("no fit window valid for '{}' at {}", scan.serial, scan.start_time);
        ctx.tally.record_scan_rejected(&scan.serial, "NoFitWindowAtTime");
        return None;
    };
    let dark_settings = evaluation.dark_settings_at(&scan.start_time);

    let bytes = match fs::read(&scan.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("could not read '{}': {e}", scan.path.display());
            ctx.tally.record_scan_rejected(&scan.serial, "InputUnreachable");
            return None;
        }
    };
    let mut reader = match ScanReader::open(bytes.as_slice()) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("'{}' could not be decoded: {e}", scan.path.display());
            ctx.tally.record_scan_rejected(&scan.serial, "DecodeFailed");
            return None;
        }
    };

    let settings = evaluation_settings(&ctx.config);
    let outcome = doas_evaluate::evaluate(&mut reader, fit_window, &location.spectrometer_model, &dark_settings, &settings);

    let mut result = match outcome {
        Ok(result) => result,
        Err(doas_evaluate::Error::SkySaturationOutOfBand { ratio, .. }) => {
            debug!("'{}' rejected: sky saturation ratio {ratio:.3} out of band", scan.path.display());
            ctx.tally.record_scan_rejected(&scan.serial, "SkySaturationOutOfBand");
            return None;
        }
        Err(e) => {
            warn!("'{}' evaluation failed: {e}", scan.path.display());
            ctx.tally.record_scan_rejected(&scan.serial, "EvaluationFailed");
            return None;
        }
    };

    result.measurement_mode = Some(scan.mode);
    result.plume_properties = doas_evaluate::extract_plume_properties(&result, MAIN_REFERENCE_INDEX);

    let bad_count = result.marks.iter().filter(|m| m.deleted || m.bad_evaluation).count() as u64;
    for _ in 0..bad_count {
        ctx.tally.record_spectrum_rejected(&scan.serial, "BadEvaluation");
    }
    let good_count = result.len() as u64 - bad_count;
    ctx.tally.record_scan_accepted(&scan.serial, good_count, result.corrupted_indices.len() as u64);

    Some(EvaluatedScan {
        serial: scan.serial.clone(),
        channel: scan.channel,
        location,
        fit_window: fit_window.clone(),
        result,
    })
}

/// Phase 1 (spec §5): evaluates every discovered scan, parallelised across
/// (serial, channel) groups with a pool sized by `maxThreadNum`, each group
/// processed in its own start-time order so the per-instrument ordering guarantee
/// (spec §5) holds within a group regardless of how groups interleave across
/// threads.
pub fn evaluate_all(ctx: &PipelineContext, groups: Vec<Vec<DiscoveredScan>>) -> Result<Vec<EvaluatedScan>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.config.max_thread_num.max(1))
        .build()
        .map_err(|e| Error::ConfigurationInvalid(format!("could not build evaluation thread pool: {e}")))?;

    Ok(pool.install(|| {
        groups
            .into_par_iter()
            .flat_map(|group| group.into_iter().filter_map(|scan| evaluate_one(&scan, ctx)).collect::<Vec<_>>())
            .collect()
    }))
}

fn scan_time(scan: &EvaluatedScan) -> Option<Timestamp> {
    scan.result.spectrum_info.first().map(|info| info.start_time)
}

/// Phase 2, two/fuzzy-instrument step (spec §4.9, §4.12): pairs up scans with a
/// visible, sufficiently complete plume from two different instruments within the
/// configured time and distance bands, and inserts any resolved altitude into
/// `plume_db`. The fuzzy fallback (`doas_geometry::fuzzy`) needs a known vent/source
/// location to anchor its wind-direction disagreement search; the processing
/// document carries only the volcano's name, not its coordinates, so this pipeline
/// runs the closed-form solver only and logs (rather than silently drops) the pairs
/// it cannot resolve.
fn run_two_instrument_geometry(ctx: &PipelineContext, scans: &[EvaluatedScan], plume_db: &mut PlumeHeightDatabase) {
    let geometry = &ctx.config.geometry;

    let candidates: Vec<(usize, Timestamp, PlumeCentreObservation)> = scans
        .iter()
        .enumerate()
        .filter_map(|(index, scan)| {
            let properties = scan.result.plume_properties?;
            if !properties.visible || properties.completeness < geometry.completeness_limit {
                return None;
            }
            let time = scan_time(scan)?;
            Some((
                index,
                time,
                PlumeCentreObservation {
                    location: &scan.location,
                    plume_centre_angle_deg: properties.centre_alpha,
                    plume_centre_angle_error_deg: properties.centre_error.max(0.1),
                    start_time: time,
                },
            ))
        })
        .collect();

    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (index_a, time_a, obs_a) = &candidates[i];
            let (index_b, time_b, obs_b) = &candidates[j];
            if scans[*index_a].serial == scans[*index_b].serial {
                continue;
            }
            if time_a.diff_seconds(time_b).abs() > geometry.max_time_difference_s {
                continue;
            }
            let distance = obs_a.location.position.horizontal_distance(&obs_b.location.position);
            if distance < geometry.min_distance_m || distance > geometry.max_distance_m {
                continue;
            }

            match two_instrument::intersect(obs_a, obs_b) {
                Ok(result) if result.plume_altitude_error_m <= geometry.max_plume_alt_error_m => {
                    let half_window = geometry.valid_time_s / 2;
                    debug!(
                        "two-instrument geometry: {} & {} -> altitude={:.0}m (+/- {:.0}m)",
                        scans[*index_a].serial, scans[*index_b].serial, result.plume_altitude_m, result.plume_altitude_error_m
                    );
                    plume_db.insert(PlumeHeight {
                        altitude_m: result.plume_altitude_m,
                        altitude_error_m: result.plume_altitude_error_m,
                        source: MeteorologySource::GeometryCalculationTwoInstruments,
                        valid_from: result.average_start_time.add_seconds(-half_window),
                        valid_to: result.average_start_time.add_seconds(half_window),
                    });
                }
                Ok(result) => {
                    debug!(
                        "two-instrument geometry for {} & {} exceeded the altitude error bound ({:.0}m), discarding",
                        scans[*index_a].serial, scans[*index_b].serial, result.plume_altitude_error_m
                    );
                }
                Err(e) => {
                    debug!(
                        "two-instrument geometry for {} & {} did not resolve: {e}",
                        scans[*index_a].serial, scans[*index_b].serial
                    );
                }
            }
        }
    }
}

/// Builds a dual-beam column time series from one channel's consecutive
/// wind-speed-mode scans, against the molecule reference (spec §4.10's input is a
/// continuous column-vs-time trace, which here is the concatenation of a channel's
/// evaluated scans in start-time order).
fn column_series(scans: &[&EvaluatedScan]) -> Option<ColumnSeries> {
    let first_time = scan_time(scans.first()?)?;
    let mut column = Vec::new();
    let mut time_s = Vec::new();
    for scan in scans {
        for (eval, info) in scan.result.evaluations.iter().zip(scan.result.spectrum_info.iter()) {
            let Some(reference) = eval.reference(MAIN_REFERENCE_INDEX) else { continue };
            column.push(reference.column);
            time_s.push(info.start_time.diff_seconds(&first_time) as f64);
        }
    }
    if column.len() < 2 {
        return None;
    }
    Some(ColumnSeries { column, time_s })
}

fn average_scan_angle(scans: &[&EvaluatedScan]) -> f64 {
    let angles: Vec<f64> = scans.iter().flat_map(|s| s.result.spectrum_info.iter().map(|i| i.scan_angle)).collect();
    if angles.is_empty() {
        0.0
    } else {
        angles.iter().sum::<f64>() / angles.len() as f64
    }
}

/// Phase 2, dual-beam step (spec §4.10, §4.12): for each instrument with both a
/// channel 0 and a channel 1 wind-speed-mode group within the configured validity
/// window, resolves a wind speed from the cross-correlation delay between their
/// column time series and inserts it into `wind_db`.
fn run_dual_beam_geometry(ctx: &PipelineContext, scans: &[EvaluatedScan], plume_db: &PlumeHeightDatabase, wind_db: &mut WindDatabase) {
    let dual_beam = &ctx.config.dual_beam;

    let mut by_serial: HashMap<&str, HashMap<u16, Vec<&EvaluatedScan>>> = HashMap::new();
    for scan in scans {
        if scan.result.measurement_mode != Some(MeasurementMode::WindSpeed) {
            continue;
        }
        by_serial.entry(scan.serial.as_str()).or_default().entry(scan.channel).or_default().push(scan);
    }

    for (serial, channels) in by_serial {
        let (Some(up_scans), Some(down_scans)) = (channels.get(&0), channels.get(&1)) else {
            continue;
        };
        let (Some(up_time), Some(down_time)) = (scan_time(up_scans[0]), scan_time(down_scans[0])) else {
            continue;
        };
        if up_time.diff_seconds(&down_time).abs() > dual_beam.valid_time_s {
            continue;
        }
        let (Some(up_series), Some(down_series)) = (column_series(up_scans), column_series(down_scans)) else {
            continue;
        };

        let settings = DualBeamSettings {
            low_pass_iterations: 4,
            test_length_s: 300.0,
            use_max_test_length: dual_beam.use_max_test_length,
            max_shift_s: 120.0,
            column_min: 0.0,
        };

        let (average_delay_s, delay_std_s) = match dual_beam::calculate_delay(&up_series, &down_series, &settings) {
            Ok(delay) => delay,
            Err(e) => {
                debug!("dual-beam delay search for '{serial}' did not converge: {e}");
                continue;
            }
        };
        if average_delay_s <= 0.0 {
            debug!("dual-beam delay for '{serial}' is non-positive, discarding");
            continue;
        }

        let location = &up_scans[0].location;
        let Ok(plume_height) = plume_db.get_plume_height(&up_time) else {
            debug!("no plume height known for '{serial}' at dual-beam measurement time, skipping");
            continue;
        };
        let relative_plume_height_m = plume_height.altitude_m - location.position.altitude;
        if relative_plume_height_m <= 0.0 {
            continue;
        }

        let angle_separation_deg = (average_scan_angle(up_scans) - average_scan_angle(down_scans)).abs();
        let distance_m = dual_beam::distance_at_plume(location, relative_plume_height_m, angle_separation_deg, 0.0);
        let (speed_mps, speed_error_mps) = dual_beam::wind_speed(distance_m, average_delay_s, delay_std_s, relative_plume_height_m, plume_height.altitude_error_m);

        if speed_error_mps > dual_beam.max_wind_speed_error_mps {
            debug!("dual-beam wind speed for '{serial}' exceeds the configured error bound, discarding");
            continue;
        }

        let existing = wind_db.get_wind_field(&up_time, Some(&location.position), LookupMethod::Nearest);
        let (direction_deg, direction_error_deg, direction_source) = match existing {
            Ok(field) => (field.direction_deg, field.direction_error_deg, field.direction_source),
            Err(_) => (0.0, 180.0, MeteorologySource::Default),
        };

        debug!("dual-beam wind speed for '{serial}': {speed_mps:.2} m/s (+/- {speed_error_mps:.2})");
        wind_db.insert(
            Some(location.position),
            WindField {
                speed_mps,
                speed_error_mps,
                speed_source: MeteorologySource::DualBeamMeasurement,
                direction_deg,
                direction_error_deg,
                direction_source,
                valid_from: up_time.add_seconds(-dual_beam.valid_time_s),
                valid_to: up_time.add_seconds(dual_beam.valid_time_s),
                location: location.position,
            },
        );
    }
}

/// Phase 2 (spec §5 "geometry computation"): runs the two-instrument and dual-beam
/// solvers over the whole batch and folds their results into `plume_db`/`wind_db`
/// before any flux is computed.
pub fn run_geometry(ctx: &PipelineContext, scans: &[EvaluatedScan], plume_db: &mut PlumeHeightDatabase, wind_db: &mut WindDatabase) {
    run_two_instrument_geometry(ctx, scans, plume_db);
    run_dual_beam_geometry(ctx, scans, plume_db, wind_db);
}

/// Phase 3 (spec §4.11, §5 "flux computation"): computes a flux for every
/// flux-mode scan that has both a wind field and a plume height covering its start
/// time, recording the outcome in the tally either way.
pub fn run_flux(
    ctx: &PipelineContext,
    scans: &[EvaluatedScan],
    plume_db: &PlumeHeightDatabase,
    wind_db: &WindDatabase,
) -> HashMap<usize, doas_model::data::FluxResult> {
    let mut fluxes = HashMap::new();

    for (index, scan) in scans.iter().enumerate() {
        if scan.result.measurement_mode != Some(MeasurementMode::Flux) {
            continue;
        }
        let Some(time) = scan_time(scan) else { continue };

        let wind = match wind_db.get_wind_field(&time, Some(&scan.location.position), LookupMethod::Bilinear) {
            Ok(wind) => wind,
            Err(e) => {
                debug!("no wind field for '{}' at {time}: {e}", scan.serial);
                ctx.tally.record_scan_rejected(&scan.serial, "NoWindFieldAtTime");
                continue;
            }
        };
        let plume_height = match plume_db.get_plume_height(&time) {
            Ok(height) => height,
            Err(e) => {
                debug!("no plume height for '{}' at {time}: {e}", scan.serial);
                ctx.tally.record_scan_rejected(&scan.serial, "NoPlumeHeightAtTime");
                continue;
            }
        };

        let input = doas_flux::FluxInput {
            scan: &scan.result,
            reference_index: MAIN_REFERENCE_INDEX,
            molecule: ctx.config.molecule,
            location: &scan.location,
            wind,
            plume_height,
            completeness_limit: ctx.config.discarding.completeness_limit_flux,
        };

        match doas_flux::calculate_flux(&input) {
            Ok(flux) => {
                ctx.tally.record_flux_computed(&scan.serial);
                fluxes.insert(index, flux);
            }
            Err(e) => {
                debug!("flux calculation for '{}' at {time} rejected: {e}", scan.serial);
                ctx.tally.record_scan_rejected(&scan.serial, "FluxRejected");
            }
        }
    }

    fluxes
}

struct OutputWriters {
    output_directory: PathBuf,
    eval_logs: HashMap<(String, String, String), BufWriter<std::fs::File>>,
    flux_logs: HashMap<(String, String), (BufWriter<std::fs::File>, bool)>,
}

impl OutputWriters {
    fn new(output_directory: &str) -> Result<Self> {
        let output_directory = PathBuf::from(output_directory);
        fs::create_dir_all(&output_directory).map_err(Error::Io)?;
        Ok(Self {
            output_directory,
            eval_logs: HashMap::new(),
            flux_logs: HashMap::new(),
        })
    }

    fn eval_log(&mut self, serial: &str, fit_window: &str, date: &str) -> Result<&mut BufWriter<std::fs::File>> {
        let key = (serial.to_string(), fit_window.to_string(), date.to_string());
        if !self.eval_logs.contains_key(&key) {
            let path = self.output_directory.join(format!("{serial}_{fit_window}_{date}.txt"));
            let file = OpenOptions::new().create(true).append(true).open(&path).map_err(Error::Io)?;
            self.eval_logs.insert(key.clone(), BufWriter::new(file));
        }
        Ok(self.eval_logs.get_mut(&key).unwrap())
    }

    fn flux_log(&mut self, serial: &str, fit_window: &str) -> Result<(&mut BufWriter<std::fs::File>, bool)> {
        let key = (serial.to_string(), fit_window.to_string());
        if !self.flux_logs.contains_key(&key) {
            let path = self.output_directory.join(format!("{serial}_{fit_window}_Flux.txt"));
            let is_new = !path.exists();
            let file = OpenOptions::new().create(true).append(true).open(&path).map_err(Error::Io)?;
            self.flux_logs.insert(key.clone(), (BufWriter::new(file), is_new));
        }
        let (writer, is_new) = self.flux_logs.get_mut(&key).unwrap();
        let was_new = *is_new;
        *is_new = false;
        Ok((writer, was_new))
    }
}

/// Writes the evaluation log, flux log, and final tally for one evaluated batch
/// (spec §6 "one set per fit window per instrument per day").
fn write_outputs(ctx: &PipelineContext, scans: &[EvaluatedScan], fluxes: &HashMap<usize, doas_model::data::FluxResult>) -> Result<()> {
    let mut writers = OutputWriters::new(&ctx.config.output_directory)?;

    for (index, scan) in scans.iter().enumerate() {
        let Some(time) = scan_time(scan) else { continue };
        let date = time.as_datetime().format("%Y%m%d").to_string();
        let flux = fluxes.get(&index);
        let writer = writers.eval_log(&scan.serial, &scan.fit_window.name, &date)?;
        output::write_evaluation_log(writer, &scan.result, &scan.location, &scan.fit_window, &scan.location.spectrometer_model, flux)?;

        if let Some(flux) = flux {
            let (writer, write_header) = writers.flux_log(&scan.serial, &scan.fit_window.name)?;
            output::append_flux_log(writer, flux, write_header)?;
        }
    }

    let tally_path = writers.output_directory.join("tally.txt");
    let file = std::fs::File::create(tally_path).map_err(Error::Io)?;
    output::write_tally(BufWriter::new(file), &ctx.tally.snapshot())?;

    Ok(())
}

/// Runs the full pipeline against one local directory (spec §4.12): discovers
/// `.pak` files, evaluates them, computes whatever geometry the batch yields,
/// computes flux, and writes every output artifact.
pub fn run(ctx: &PipelineContext, root: &Path) -> Result<()> {
    let paths = discovery::find_pak_files(root, ctx.config.include_sub_dirs_local, &ctx.config.filename_pattern_local)?;
    debug!("discovered {} candidate file(s) under '{}'", paths.len(), root.display());

    let mut discovered: Vec<DiscoveredScan> = Vec::new();
    for path in paths {
        match discovery::identify(path) {
            Ok(scan) => {
                if scan.start_time.is_between(&ctx.config.from_date, &ctx.config.to_date) {
                    discovered.push(scan);
                }
            }
            Err(e) => warn!("could not identify scan file: {e}"),
        }
    }

    let groups = discovery::group_and_sort(discovered);
    let scans = evaluate_all(ctx, groups)?;

    let mut plume_db = PlumeHeightDatabase::new();
    let mut wind_db = load_wind_database(ctx)?;

    run_geometry(ctx, &scans, &mut plume_db, &mut wind_db);
    let fluxes = run_flux(ctx, &scans, &plume_db, &wind_db);

    write_outputs(ctx, &scans, &fluxes)
}

/// Seeds the wind database from `WindFieldFile` if one is configured (spec §6
/// "Wind field database (read)"), otherwise starts from an empty database filled
/// in only by whatever the dual-beam phase resolves.
fn load_wind_database(ctx: &PipelineContext) -> Result<WindDatabase> {
    if ctx.config.wind_field_file.is_empty() {
        return Ok(WindDatabase::new());
    }
    let file = std::fs::File::open(&ctx.config.wind_field_file).map_err(Error::Io)?;
    let db = doas_db::xml::read_wind_database(std::io::BufReader::new(file), &ctx.config.from_date)?;
    Ok(db)
}
