//!
//! Post-processing statistics (SPEC_FULL.md supplemented feature, grounded on
//! `PostProcessingStatistics.h`/`.cpp`): a per-instrument, per-reject-reason tally
//! accumulated across the run and written out alongside the evaluation and flux logs
//! (spec §4.12 "a per-instrument rejection/acceptance tally", spec §7 "the driver
//! accumulates a per-instrument tally of skip reasons").
//!

use std::collections::BTreeMap;
use std::sync::Mutex;

/// One instrument's running counts: scans and spectra accepted, plus a count per
/// distinct rejection reason string (the reason text itself, not a fixed enum,
/// mirroring the original's free-form "why rejected" bookkeeping).
#[derive(Debug, Clone, Default)]
pub struct InstrumentTally {
    pub scans_evaluated: u64,
    pub scans_rejected: u64,
    pub spectra_accepted: u64,
    pub spectra_rejected: u64,
    pub spectra_corrupted: u64,
    pub fluxes_computed: u64,
    rejection_reasons: BTreeMap<String, u64>,
}

impl InstrumentTally {
    pub fn rejection_reasons(&self) -> impl Iterator<Item = (&str, u64)> {
        self.rejection_reasons.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A thread-safe accumulator shared by every worker in the evaluation pool (spec §5
/// "the driver runs ... as serialised phases"; the tally itself is written to from
/// every concurrent evaluation task within a phase, so it needs its own lock
/// independent of the wind/plume database's phase-level exclusivity).
#[derive(Debug, Default)]
pub struct Tally {
    instruments: Mutex<BTreeMap<String, InstrumentTally>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fully accepted scan: `good_count` spectra kept, `corrupted_count`
    /// unreadable records, no rejection.
    pub fn record_scan_accepted(&self, serial: &str, good_count: u64, corrupted_count: u64) {
        let mut instruments = self.instruments.lock().expect("tally mutex poisoned");
        let entry = instruments.entry(serial.to_string()).or_default();
        entry.scans_evaluated += 1;
        entry.spectra_accepted += good_count;
        entry.spectra_corrupted += corrupted_count;
    }

    /// Records a scan rejected wholesale (e.g. `SkySaturationOutOfBand`), under
    /// `reason`.
    pub fn record_scan_rejected(&self, serial: &str, reason: &str) {
        let mut instruments = self.instruments.lock().expect("tally mutex poisoned");
        let entry = instruments.entry(serial.to_string()).or_default();
        entry.scans_evaluated += 1;
        entry.scans_rejected += 1;
        *entry.rejection_reasons.entry(reason.to_string()).or_default() += 1;
    }

    /// Records one spectrum rejected within an otherwise accepted scan (bad
    /// evaluation, chi-square out of bound, and the like).
    pub fn record_spectrum_rejected(&self, serial: &str, reason: &str) {
        let mut instruments = self.instruments.lock().expect("tally mutex poisoned");
        let entry = instruments.entry(serial.to_string()).or_default();
        entry.spectra_rejected += 1;
        *entry.rejection_reasons.entry(reason.to_string()).or_default() += 1;
    }

    pub fn record_flux_computed(&self, serial: &str) {
        let mut instruments = self.instruments.lock().expect("tally mutex poisoned");
        instruments.entry(serial.to_string()).or_default().fluxes_computed += 1;
    }

    /// Snapshots the tally, sorted by instrument serial, for the output writer.
    pub fn snapshot(&self) -> Vec<(String, InstrumentTally)> {
        self.instruments
            .lock()
            .expect("tally mutex poisoned")
            .iter()
            .map(|(serial, tally)| (serial.clone(), tally.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_scans() {
        let tally = Tally::new();
        tally.record_scan_accepted("I2J1234", 40, 2);
        tally.record_scan_rejected("I2J1234", "SkySaturationOutOfBand");
        tally.record_scan_accepted("I2J1234", 38, 0);

        let snapshot = tally.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (serial, instrument) = &snapshot[0];
        assert_eq!(serial, "I2J1234");
        assert_eq!(instrument.scans_evaluated, 3);
        assert_eq!(instrument.scans_rejected, 1);
        assert_eq!(instrument.spectra_accepted, 78);
        assert_eq!(instrument.spectra_corrupted, 2);
        assert_eq!(instrument.rejection_reasons().next(), Some(("SkySaturationOutOfBand", 1)));
    }

    #[test]
    fn tracks_separate_instruments_independently() {
        let tally = Tally::new();
        tally.record_scan_accepted("A", 10, 0);
        tally.record_scan_accepted("B", 20, 0);
        let snapshot = tally.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
