//!
//! Instrument location and scanner-type metadata (spec §3 "Instrument location").
//!

use crate::data::gps::GpsPoint;
use crate::data::timestamp::Timestamp;

/// The scanner mechanism geometry family, which determines which flux/geometry
/// formula applies (spec §4.9, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScannerType {
    /// Single-axis scanner ("Gothenburg" style): only the primary scan angle varies.
    FlatSingleAxis,
    /// Two-axis scanner ("Heidelberg" style): both scan angles vary independently.
    TwoAxis,
}

/// One validity-windowed location/geometry record for an instrument.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentLocation {
    pub position: GpsPoint,
    /// Compass bearing of the scan plane, degrees clockwise from north.
    pub compass: f64,
    /// Scanner cone angle, degrees.
    pub cone_angle: f64,
    /// Scanner tilt, degrees.
    pub tilt: f64,
    pub scanner_type: ScannerType,
    pub spectrometer_model: String,
    pub site_label: String,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
}

impl InstrumentLocation {
    pub fn is_valid_at(&self, time: &Timestamp) -> bool {
        time.is_between(&self.valid_from, &self.valid_to)
    }

    /// Whether the scanner's cone angle is close enough to 90 degrees to be treated
    /// as the flat-scanner case for flux/geometry formula selection (spec §4.11).
    pub fn is_flat_scanner(&self) -> bool {
        (self.cone_angle - 90.0).abs() < 1.0
    }
}

/// An instrument's full location history. Validity windows must be disjoint (spec §6
/// Setup document).
#[derive(Debug, Clone, Default)]
pub struct InstrumentHistory {
    pub serial: String,
    pub locations: Vec<InstrumentLocation>,
}

impl InstrumentHistory {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            locations: Vec::new(),
        }
    }

    pub fn push(&mut self, location: InstrumentLocation) -> Result<(), crate::result::Error> {
        for existing in &self.locations {
            let overlap = Timestamp::intersect(
                (existing.valid_from, existing.valid_to),
                (location.valid_from, location.valid_to),
            );
            if overlap.is_some() {
                return Err(crate::result::Error::OverlappingValidityWindows {
                    serial: self.serial.clone(),
                });
            }
        }
        self.locations.push(location);
        Ok(())
    }

    pub fn at(&self, time: &Timestamp) -> Option<&InstrumentLocation> {
        self.locations.iter().find(|loc| loc.is_valid_at(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(from: i64, to: i64) -> InstrumentLocation {
        let base = Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap();
        InstrumentLocation {
            position: GpsPoint::new(19.4, -155.6, 1200.0),
            compass: 0.0,
            cone_angle: 90.0,
            tilt: 0.0,
            scanner_type: ScannerType::FlatSingleAxis,
            spectrometer_model: "USB2000".into(),
            site_label: "Kilauea".into(),
            valid_from: base.add_days(from),
            valid_to: base.add_days(to),
        }
    }

    #[test]
    fn overlapping_validity_windows_rejected() {
        let mut hist = InstrumentHistory::new("I2J1234");
        hist.push(loc(0, 10)).unwrap();
        let err = hist.push(loc(5, 20)).unwrap_err();
        assert!(matches!(
            err,
            crate::result::Error::OverlappingValidityWindows { .. }
        ));
    }

    #[test]
    fn disjoint_windows_accepted_and_queryable() {
        let mut hist = InstrumentHistory::new("I2J1234");
        hist.push(loc(0, 10)).unwrap();
        hist.push(loc(11, 20)).unwrap();
        let base = Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap();
        assert!(hist.at(&base.add_days(15)).is_some());
        assert!(hist.at(&base.add_days(100)).is_none());
    }
}
