//!
//! Single-instrument geometry: plume altitude given a wind direction, and its dual,
//! wind direction given a plume altitude (spec §4.9), grounded on
//! `GeometryCalculator.cpp::GetWindDirection`.
//!
//! Both directions work with the scanner's plume-centre ray expressed as
//! `origin + t * direction` in the scanner's own east-north-up frame (`direction`
//! from [crate::ray::plume_centre_direction]): moving one unit along the ray gains
//! one unit of altitude, with horizontal displacement `(x, y) * t`.

use crate::ray::plume_centre_direction;
use doas_model::data::{GpsPoint, InstrumentLocation};

/// Plume altitude above sea level given the wind direction blowing from the source
/// toward the plume, found by projecting the scanner's plume-centre ray onto the
/// vertical plane through `source` with that horizontal direction and reading off
/// the intersection's absolute altitude.
pub fn altitude_given_wind_direction(
    source: &GpsPoint,
    scanner: &InstrumentLocation,
    plume_centre_angle_deg: f64,
    wind_direction_deg: f64,
) -> Option<f64> {
    let [x, y, _] = plume_centre_direction(plume_centre_angle_deg, scanner.cone_angle, scanner.tilt);

    // The scanner ray's horizontal displacement per unit height, expressed in true
    // north/east axes (the local frame's (x, y) are aligned with north/east after
    // un-rotating by the scan plane's own compass bearing).
    let compass_rad = scanner.compass.to_radians();
    let east_per_unit_height = x * compass_rad.sin() + y * compass_rad.cos();
    let north_per_unit_height = x * compass_rad.cos() - y * compass_rad.sin();

    // Horizontal offset of the scanner from the source, in metres north/east.
    let scanner_bearing_from_source = source.bearing_to(&scanner.position).to_radians();
    let scanner_distance_from_source = source.horizontal_distance(&scanner.position);
    let scanner_north = scanner_distance_from_source * scanner_bearing_from_source.cos();
    let scanner_east = scanner_distance_from_source * scanner_bearing_from_source.sin();

    // The vertical plane through `source` with horizontal direction `wind_direction_deg`
    // has unit normal (cos(wind+90), sin(wind+90)) in (north, east). A point on the
    // ray lies in the plane when its offset from `source`, dotted with the normal, is
    // zero: solve for t (which equals height above the scanner).
    let normal_rad = (wind_direction_deg + 90.0).to_radians();
    let normal_north = normal_rad.cos();
    let normal_east = normal_rad.sin();

    let denominator = north_per_unit_height * normal_north + east_per_unit_height * normal_east;
    if denominator.abs() < 1e-12 {
        return None;
    }

    let t = -(scanner_north * normal_north + scanner_east * normal_east) / denominator;
    Some(scanner.position.altitude + t)
}

/// Wind direction (bearing from the plume toward the source, i.e. the direction the
/// wind is blowing toward) implied by a known plume altitude, by directly evaluating
/// the scanner's plume-centre ray at that height and taking the bearing from the
/// resulting ground-track point to `source`.
pub fn wind_direction_given_altitude(
    source: &GpsPoint,
    scanner: &InstrumentLocation,
    plume_centre_angle_deg: f64,
    plume_altitude_m: f64,
) -> f64 {
    let [x, y, _] = plume_centre_direction(plume_centre_angle_deg, scanner.cone_angle, scanner.tilt);
    let height_above_scanner = plume_altitude_m - scanner.position.altitude;
    let distance = height_above_scanner * (x * x + y * y).sqrt();
    let bearing = y.atan2(x).to_degrees() + scanner.compass;

    let intersection = scanner.position.destination(distance, bearing);
    intersection.bearing_to(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{ScannerType, Timestamp};

    fn scanner(compass: f64) -> InstrumentLocation {
        let base = Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap();
        InstrumentLocation {
            position: GpsPoint::new(19.40, -155.60, 1000.0),
            compass,
            cone_angle: 90.0,
            tilt: 0.0,
            scanner_type: ScannerType::FlatSingleAxis,
            spectrometer_model: "USB2000".into(),
            site_label: "test".into(),
            valid_from: base,
            valid_to: base.add_days(365),
        }
    }

    #[test]
    fn round_trips_altitude_and_wind_direction() {
        let source = GpsPoint::new(19.45, -155.65, 1000.0);
        let scanner = scanner(45.0);
        let angle = 10.0;
        let altitude = 3000.0;

        let wind_direction = wind_direction_given_altitude(&source, &scanner, angle, altitude);
        let recovered_altitude =
            altitude_given_wind_direction(&source, &scanner, angle, wind_direction).unwrap();

        assert!((recovered_altitude - altitude).abs() < 10.0);
    }
}
