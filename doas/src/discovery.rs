//!
//! Local scan-file discovery (spec §4.12 "For each discovered .pak file: infer
//! (serial, channel, start time, mode) from filename pattern, falling back to
//! reading the sky spectrum's header"). FTP discovery is an explicit Non-goal
//! (spec.md §1 "FTP/local file discovery" is named as an external collaborator, but
//! only the network transport is out of scope here — a real local directory walk is
//! needed for the driver to be runnable at all, matching the `--Workdir`/
//! `--IncludeSubDirs_Local` CLI surface spec.md itself defines).
//!

use crate::result::{Error, Result};
use doas_decode::ScanReader;
use doas_model::data::{MeasurementMode, Timestamp};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// One discovered scan file with the identity needed to group and order it before
/// evaluation (spec §4.12).
#[derive(Debug, Clone)]
pub struct DiscoveredScan {
    pub path: PathBuf,
    pub serial: String,
    pub channel: u16,
    pub start_time: Timestamp,
    pub mode: MeasurementMode,
}

/// Walks `root`, optionally recursing into subdirectories, collecting paths whose
/// file name matches `pattern` (a simple `*`/`?` glob, e.g. `*.pak`).
pub fn find_pak_files(root: &Path, include_sub_dirs: bool, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, include_sub_dirs, pattern, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(dir: &Path, recurse: bool, pattern: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::InputUnreachable(format!("cannot read directory '{}': {e}", dir.display()))
    })?;

    for entry in entries {
        let entry = entry.map_err(Error::Io)?;
        let path = entry.path();
        if path.is_dir() {
            if recurse {
                walk(&path, recurse, pattern, out)?;
            }
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if glob_match(pattern, file_name) {
            out.push(path);
        }
    }
    Ok(())
}

/// Minimal glob matcher supporting `*` (any run of characters) and `?` (exactly one
/// character), case-insensitively; sufficient for the `*.pak`-style patterns the
/// processing document's `FilenamePatternMatching_Local` carries.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&pattern[1..], text) || (!text.is_empty() && inner(pattern, &text[1..])),
            (Some(b'?'), Some(_)) => inner(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p.eq_ignore_ascii_case(t) => inner(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// Parses the conventional `{serial}_{yyMMdd}_{HHmm}_{channel}.pak` name (spec §8
/// seed scenarios' example names, e.g. `2002128M1_230120_0148_0.pak`). Returns
/// `None` on any deviation, in which case the caller should fall back to the
/// header (spec §4.12).
fn infer_from_filename(path: &Path) -> Option<(String, u16, Timestamp)> {
    let stem = path.file_stem()?.to_str()?;
    let fields: Vec<&str> = stem.split('_').collect();
    let [serial, date, time, channel] = fields[..] else {
        return None;
    };
    if date.len() != 6 || time.len() != 4 {
        return None;
    }
    let year = 2000 + date[0..2].parse::<i32>().ok()?;
    let month = date[2..4].parse::<u32>().ok()?;
    let day = date[4..6].parse::<u32>().ok()?;
    let hour = time[0..2].parse::<u32>().ok()?;
    let minute = time[2..4].parse::<u32>().ok()?;
    let channel: u16 = channel.parse().ok()?;
    let start_time = Timestamp::from_ymd_hms_milli(year, month, day, hour, minute, 0, 0)?;
    Some((serial.to_string(), channel, start_time))
}

/// Classifies a scan's measurement mode from its recorded scan angles: a wind-speed
/// scan dwells at a small fixed set of directions rather than sweeping the full
/// angular range a flux scan does.
fn classify_mode(reader: &ScanReader) -> MeasurementMode {
    let mut angles: Vec<i64> = reader
        .measurements()
        .map(|(_, s)| (s.meta.scan_angle * 10.0).round() as i64)
        .collect();
    angles.sort_unstable();
    angles.dedup();
    if angles.len() <= 3 {
        MeasurementMode::WindSpeed
    } else {
        MeasurementMode::Flux
    }
}

fn infer_from_header(path: &Path) -> Result<(String, u16, Timestamp, MeasurementMode)> {
    let bytes = fs::read(path).map_err(|e| {
        Error::InputUnreachable(format!("cannot read '{}': {e}", path.display()))
    })?;
    let reader = ScanReader::open(bytes.as_slice())?;
    let sky = reader.get_sky()?;
    let mode = classify_mode(&reader);
    Ok((sky.meta.device_serial.clone(), sky.meta.channel, sky.meta.start_time.clone(), mode))
}

/// Infers (serial, channel, start time, mode) for one discovered file, trying the
/// filename pattern first and falling back to the sky spectrum's header (spec
/// §4.12). Mode is never encoded in the filename convention, so it is always read
/// from the header once a file's identity is otherwise known from its name.
pub fn identify(path: PathBuf) -> Result<DiscoveredScan> {
    match infer_from_filename(&path) {
        Some((serial, channel, start_time)) => {
            let bytes = fs::read(&path).map_err(|e| {
                Error::InputUnreachable(format!("cannot read '{}': {e}", path.display()))
            })?;
            let reader = ScanReader::open(bytes.as_slice())?;
            let mode = classify_mode(&reader);
            debug!("identified '{}' from filename: serial={serial} channel={channel}", path.display());
            Ok(DiscoveredScan {
                path,
                serial,
                channel,
                start_time,
                mode,
            })
        }
        None => {
            warn!("'{}' does not match the expected filename pattern, reading header instead", path.display());
            let (serial, channel, start_time, mode) = infer_from_header(&path)?;
            Ok(DiscoveredScan {
                path,
                serial,
                channel,
                start_time,
                mode,
            })
        }
    }
}

/// Groups scans by (serial, channel) and sorts each group by start time (spec
/// §4.12, §5 "per-instrument ordering guarantee").
pub fn group_and_sort(scans: Vec<DiscoveredScan>) -> Vec<Vec<DiscoveredScan>> {
    use std::collections::BTreeMap;
    let mut groups: BTreeMap<(String, u16), Vec<DiscoveredScan>> = BTreeMap::new();
    for scan in scans {
        groups.entry((scan.serial.clone(), scan.channel)).or_default().push(scan);
    }
    let mut out: Vec<Vec<DiscoveredScan>> = groups.into_values().collect();
    for group in &mut out {
        group.sort_by_key(|s| s.start_time);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_extension_pattern() {
        assert!(glob_match("*.pak", "2002128M1_230120_0148_0.pak"));
        assert!(glob_match("*.PAK", "scan.pak"));
        assert!(!glob_match("*.pak", "scan.txt"));
    }

    #[test]
    fn filename_pattern_parses_serial_channel_and_time() {
        let path = PathBuf::from("2002128M1_230120_0148_0.pak");
        let (serial, channel, time) = infer_from_filename(&path).unwrap();
        assert_eq!(serial, "2002128M1");
        assert_eq!(channel, 0);
        assert_eq!(time.year(), 2023);
    }

    #[test]
    fn malformed_filename_falls_back_to_none() {
        let path = PathBuf::from("not-a-scan-file.pak");
        assert!(infer_from_filename(&path).is_none());
    }

    #[test]
    fn group_and_sort_orders_within_each_instrument_channel() {
        let make = |serial: &str, channel: u16, hour: u32| DiscoveredScan {
            path: PathBuf::from(format!("{serial}_{hour}.pak")),
            serial: serial.to_string(),
            channel,
            start_time: Timestamp::from_ymd_hms_milli(2024, 1, 1, hour, 0, 0, 0).unwrap(),
            mode: MeasurementMode::Flux,
        };
        let scans = vec![make("A", 0, 10), make("A", 0, 8), make("B", 0, 9)];
        let groups = group_and_sort(scans);
        assert_eq!(groups.len(), 2);
        let a_group = groups.iter().find(|g| g[0].serial == "A").unwrap();
        assert_eq!(a_group[0].start_time.hour(), 8);
        assert_eq!(a_group[1].start_time.hour(), 10);
    }
}
