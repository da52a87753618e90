//!
//! Processing configuration document (spec §6 bullet 3): the global options that
//! govern one run. Most elements of this document are simple scalar leaves, so
//! rather than hand-matching several dozen `StartElement`/`EndElement` pairs the
//! way `doas-db::xml` does for the (much smaller) wind field document, the parser
//! here flattens the document into a path-keyed text table with the `xml` crate's
//! `EventReader` and then assembles [ProcessingConfig] from named lookups, erroring
//! with [Error::ConfigurationInvalid] on anything missing or malformed.
//!

use crate::result::{Error, Result};
use doas_evaluate::SkyOption;
use doas_model::data::{Molecule, Timestamp};
use std::collections::HashMap;
use std::io::Read;
use xml::reader::XmlEvent;
use xml::EventReader;

/// `processingMode` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Flux,
    Composition,
    Stratosphere,
    Troposphere,
    Geometry,
    Calibration,
}

impl ProcessingMode {
    /// The integer code accepted by `--mode` (spec §6), in the same enumeration
    /// order the processing-XML `processingMode` values are listed.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ProcessingMode::Flux),
            1 => Ok(ProcessingMode::Composition),
            2 => Ok(ProcessingMode::Stratosphere),
            3 => Ok(ProcessingMode::Troposphere),
            4 => Ok(ProcessingMode::Geometry),
            5 => Ok(ProcessingMode::Calibration),
            other => Err(Error::ConfigurationInvalid(format!("unknown processing mode code {other}"))),
        }
    }

    fn from_name(name: &str) -> Result<Self> {
        match name {
            "Flux" => Ok(ProcessingMode::Flux),
            "Composition" => Ok(ProcessingMode::Composition),
            "Stratosphere" => Ok(ProcessingMode::Stratosphere),
            "Troposphere" => Ok(ProcessingMode::Troposphere),
            "Geometry" => Ok(ProcessingMode::Geometry),
            "Calibration" => Ok(ProcessingMode::Calibration),
            other => Err(Error::ConfigurationInvalid(format!("unknown processing mode '{other}'"))),
        }
    }
}

/// `GeometryCalc` block (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySettings {
    pub completeness_limit: f64,
    pub valid_time_s: i64,
    pub max_time_difference_s: i64,
    pub min_distance_m: f64,
    pub max_distance_m: f64,
    pub max_plume_alt_error_m: f64,
    pub max_wind_direction_error_deg: f64,
}

/// `DualBeam` block (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct DualBeamConfig {
    pub valid_time_s: i64,
    pub use_max_test_length: bool,
    pub max_wind_speed_error_mps: f64,
}

/// `Discarding` block (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardingConfig {
    pub completeness_limit_flux: f64,
    pub minimum_saturation_in_fit_region: f64,
    pub max_exposure_time_got_ms: u32,
    pub max_exposure_time_hei_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    pub max_thread_num: usize,
    pub output_directory: String,
    pub temp_directory: String,
    pub from_date: Timestamp,
    pub to_date: Timestamp,
    pub volcano: String,
    pub molecule: Molecule,
    pub processing_mode: ProcessingMode,
    pub fit_windows: Vec<String>,
    pub main_fit_window: String,
    pub sky_option: SkyOption,
    pub local_directory: String,
    pub include_sub_dirs_local: bool,
    pub filename_pattern_local: String,
    pub ftp_directory: String,
    pub ftp_username: String,
    pub ftp_password: String,
    pub include_sub_dirs_ftp: bool,
    pub upload_results: bool,
    pub wind_field_file: String,
    pub geometry: GeometrySettings,
    pub dual_beam: DualBeamConfig,
    pub discarding: DiscardingConfig,
}

/// Parses the ISO `YYYY.MM.DD` (or `YYYY-MM-DD`) UTC-day form used by both the
/// processing XML and `--FromDate`/`--ToDate` (spec §6, §8 seed scenario S6).
pub fn parse_date_only(text: &str) -> Result<Timestamp> {
    let normalised = text.trim().replace('.', "-");
    let fields: Vec<&str> = normalised.split('-').collect();
    if fields.len() != 3 {
        return Err(Error::ConfigurationInvalid(format!("bad date '{text}'")));
    }
    let year: i32 = fields[0]
        .parse()
        .map_err(|_| Error::ConfigurationInvalid(format!("bad date '{text}'")))?;
    let month: u32 = fields[1]
        .parse()
        .map_err(|_| Error::ConfigurationInvalid(format!("bad date '{text}'")))?;
    let day: u32 = fields[2]
        .parse()
        .map_err(|_| Error::ConfigurationInvalid(format!("bad date '{text}'")))?;
    Timestamp::from_ymd_hms_milli(year, month, day, 0, 0, 0, 0)
        .ok_or_else(|| Error::ConfigurationInvalid(format!("invalid calendar date '{text}'")))
}

/// Flattens `source` into a map from slash-joined element path (relative to the
/// document root) to trimmed leaf text, for every element that has no child
/// elements of its own.
fn flatten<R: Read>(source: R) -> Result<HashMap<String, String>> {
    let parser = EventReader::new(source);
    let mut map = HashMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for event in parser {
        match event.map_err(|e| Error::ConfigurationInvalid(e.to_string()))? {
            XmlEvent::StartElement { name, .. } => {
                path.push(name.local_name);
                buffer.clear();
            }
            XmlEvent::Characters(chars) => buffer.push_str(&chars),
            XmlEvent::EndElement { .. } => {
                let key = path.join("/");
                let text = buffer.trim();
                if !text.is_empty() {
                    map.insert(key, text.to_string());
                }
                path.pop();
                buffer.clear();
            }
            _ => {}
        }
    }
    Ok(map)
}

fn required<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    map.get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| Error::ConfigurationInvalid(format!("processing document missing '{key}'")))
}

fn optional(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    map.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn parse_f64(map: &HashMap<String, String>, key: &str, default: f64) -> Result<f64> {
    match map.get(key) {
        Some(text) => text.parse().map_err(|_| Error::ConfigurationInvalid(format!("'{key}' is not numeric: {text}"))),
        None => Ok(default),
    }
}

fn parse_i64(map: &HashMap<String, String>, key: &str, default: i64) -> Result<i64> {
    match map.get(key) {
        Some(text) => text.parse().map_err(|_| Error::ConfigurationInvalid(format!("'{key}' is not an integer: {text}"))),
        None => Ok(default),
    }
}

fn parse_bool(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match map.get(key).map(|s| s.to_ascii_lowercase()) {
        Some(s) if s == "true" || s == "1" => true,
        Some(s) if s == "false" || s == "0" => false,
        _ => default,
    }
}

/// Parses a Processing configuration document (spec §6 bullet 3).
pub fn load_processing_document<R: Read>(source: R) -> Result<ProcessingConfig> {
    let map = flatten(source)?;

    let sky_option = match required(&map, "SkySpectrum/option")? {
        "SCAN" => SkyOption::Scan,
        "AverageOfGood" => SkyOption::AverageOfGood,
        "Index" => SkyOption::Index(
            required(&map, "SkySpectrum/value")?
                .parse()
                .map_err(|_| Error::ConfigurationInvalid("SkySpectrum/value is not an index".to_string()))?,
        ),
        "User" => SkyOption::User(required(&map, "SkySpectrum/value")?.to_string()),
        other => return Err(Error::ConfigurationInvalid(format!("unknown SkySpectrum option '{other}'"))),
    };

    let fit_windows: Vec<String> = optional(&map, "FitWindows", "")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(ProcessingConfig {
        max_thread_num: optional(&map, "maxThreadNum", "1")
            .parse()
            .map_err(|_| Error::ConfigurationInvalid("maxThreadNum is not a positive integer".to_string()))?,
        output_directory: required(&map, "outputDirectory")?.to_string(),
        temp_directory: optional(&map, "tempDirectory", "."),
        from_date: parse_date_only(required(&map, "fromDate")?)?,
        to_date: parse_date_only(required(&map, "toDate")?)?,
        volcano: required(&map, "volcano")?.to_string(),
        molecule: Molecule::from_name(required(&map, "molecule")?)?,
        processing_mode: ProcessingMode::from_name(required(&map, "processingMode")?)?,
        main_fit_window: required(&map, "main")?.to_string(),
        fit_windows,
        sky_option,
        local_directory: optional(&map, "LocalDirectory", ""),
        include_sub_dirs_local: parse_bool(&map, "IncludeSubDirs_Local", false),
        filename_pattern_local: optional(&map, "FilenamePatternMatching_Local", "*.pak"),
        ftp_directory: optional(&map, "FTPDirectory", ""),
        ftp_username: optional(&map, "FTPUsername", ""),
        ftp_password: optional(&map, "FTPPassword", ""),
        include_sub_dirs_ftp: parse_bool(&map, "IncludeSubDirs_FTP", false),
        upload_results: parse_bool(&map, "UploadResults", false),
        wind_field_file: optional(&map, "WindFieldFile", ""),
        geometry: GeometrySettings {
            completeness_limit: parse_f64(&map, "GeometryCalc/CompletenessLimit", 0.7)?,
            valid_time_s: parse_i64(&map, "GeometryCalc/ValidTime", 900)?,
            max_time_difference_s: parse_i64(&map, "GeometryCalc/MaxTimeDifference", 600)?,
            min_distance_m: parse_f64(&map, "GeometryCalc/MinDistance", 1000.0)?,
            max_distance_m: parse_f64(&map, "GeometryCalc/MaxDistance", 20_000.0)?,
            max_plume_alt_error_m: parse_f64(&map, "GeometryCalc/MaxPlumeAltError", 500.0)?,
            max_wind_direction_error_deg: parse_f64(&map, "GeometryCalc/MaxWindDirectionError", 30.0)?,
        },
        dual_beam: DualBeamConfig {
            valid_time_s: parse_i64(&map, "DualBeam/ValidTime", 3600)?,
            use_max_test_length: parse_bool(&map, "DualBeam/UseMaxTestLength", false),
            max_wind_speed_error_mps: parse_f64(&map, "DualBeam/MaxWindSpeedError", 5.0)?,
        },
        discarding: DiscardingConfig {
            completeness_limit_flux: parse_f64(&map, "Discarding/CompletenessLimitFlux", 0.7)?,
            minimum_saturation_in_fit_region: parse_f64(&map, "Discarding/MinimumSaturationInFitRegion", 0.05)?,
            max_exposure_time_got_ms: parse_f64(&map, "Discarding/MaxExposureTime_got", 2000.0)? as u32,
            max_exposure_time_hei_ms: parse_f64(&map, "Discarding/MaxExposureTime_hei", 2000.0)? as u32,
        },
    })
}

/// Applies any flag the command line set over `config`, in place (spec §6 "CLI
/// surface (minimal core)", §8 seed scenario S6). Flags left unset on the command
/// line do not touch the corresponding field.
pub fn apply_cli_overrides(config: &mut ProcessingConfig, cli: &crate::cli::Cli) -> Result<()> {
    if let Some(value) = &cli.from_date {
        config.from_date = parse_date_only(value)?;
    }
    if let Some(value) = &cli.to_date {
        config.to_date = parse_date_only(value)?;
    }
    if let Some(value) = &cli.volcano {
        config.volcano = value.clone();
    }
    if let Some(value) = &cli.workdir {
        config.local_directory = value.clone();
    }
    if let Some(value) = &cli.output_directory {
        config.output_directory = value.clone();
    }
    if let Some(value) = &cli.temp_directory {
        config.temp_directory = value.clone();
    }
    if let Some(value) = &cli.wind_field_file {
        config.wind_field_file = value.clone();
    }
    if let Some(value) = cli.max_thread_num {
        config.max_thread_num = value;
    }
    if let Some(value) = cli.include_sub_dirs_local {
        config.include_sub_dirs_local = value;
    }
    if let Some(value) = cli.include_sub_dirs_ftp {
        config.include_sub_dirs_ftp = value;
    }
    if let Some(value) = &cli.ftp_directory {
        config.ftp_directory = value.clone();
    }
    if let Some(value) = &cli.ftp_username {
        config.ftp_username = value.clone();
    }
    if let Some(value) = &cli.ftp_password {
        config.ftp_password = value.clone();
    }
    if let Some(value) = cli.upload_results {
        config.upload_results = value;
    }
    if let Some(code) = cli.mode {
        config.processing_mode = ProcessingMode::from_code(code)?;
    }
    if let Some(name) = &cli.molecule {
        config.molecule = Molecule::from_name(name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <Processing>
            <maxThreadNum>4</maxThreadNum>
            <outputDirectory>/out</outputDirectory>
            <tempDirectory>/tmp</tempDirectory>
            <fromDate>2005.10.01</fromDate>
            <toDate>2005.11.01</toDate>
            <volcano>Masaya</volcano>
            <molecule>SO2</molecule>
            <processingMode>Flux</processingMode>
            <FitWindows>main,secondary</FitWindows>
            <main>main</main>
            <SkySpectrum><option>SCAN</option></SkySpectrum>
            <LocalDirectory>/data</LocalDirectory>
            <IncludeSubDirs_Local>true</IncludeSubDirs_Local>
            <WindFieldFile>/data/wind.xml</WindFieldFile>
            <GeometryCalc>
                <CompletenessLimit>0.7</CompletenessLimit>
                <MaxTimeDifference>600</MaxTimeDifference>
            </GeometryCalc>
        </Processing>
    "#;

    #[test]
    fn parses_required_and_nested_fields() {
        let config = load_processing_document(SAMPLE.as_bytes()).unwrap();
        assert_eq!(config.max_thread_num, 4);
        assert_eq!(config.molecule, Molecule::SO2);
        assert_eq!(config.processing_mode, ProcessingMode::Flux);
        assert_eq!(config.fit_windows, vec!["main".to_string(), "secondary".to_string()]);
        assert!(config.include_sub_dirs_local);
        assert_eq!(config.geometry.completeness_limit, 0.7);
        assert_eq!(config.geometry.max_distance_m, 20_000.0);
    }

    #[test]
    fn cli_style_date_with_dots_parses() {
        let ts = parse_date_only("2024.05.31").unwrap();
        assert_eq!(ts.year(), 2024);
    }

    #[test]
    fn missing_required_field_is_configuration_invalid() {
        let err = load_processing_document("<Processing></Processing>".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }

    #[test]
    fn cli_override_replaces_from_date_only() {
        let mut config = load_processing_document(SAMPLE.as_bytes()).unwrap();
        let original_to_date = config.to_date;
        let cli = crate::cli::Cli {
            from_date: Some("2006.01.01".to_string()),
            ..Default::default()
        };
        apply_cli_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.from_date.year(), 2006);
        assert_eq!(config.to_date, original_to_date);
    }
}
