//!
//! Two-instrument plume altitude from closed-form ray intersection (spec §4.9
//! "Two-instrument intersection"), grounded on
//! `GeometryCalculator.cpp::GetPlumeHeight_Exact`.
//!

use crate::ray::{closest_approach, evaluate, plume_centre_direction, rotate_about_vertical, Ray};
use crate::result::{Error, Result};
use doas_model::data::{InstrumentLocation, Timestamp};
use log::debug;

/// 40 m miss-distance threshold beyond which the two rays are declared not to
/// intersect (spec §4.9).
const MAX_MISS_DISTANCE_M: f64 = 40.0;

/// Maximum absolute scan angle a perturbed plume-centre angle may reach before it
/// is excluded from the error estimate, mirroring the reference implementation's
/// 89-degree sanity bound.
const MAX_PLUME_CENTRE_ANGLE_DEG: f64 = 89.0;

/// One instrument's plume-centre observation feeding the two-instrument solver.
#[derive(Debug, Clone, Copy)]
pub struct PlumeCentreObservation<'a> {
    pub location: &'a InstrumentLocation,
    pub plume_centre_angle_deg: f64,
    pub plume_centre_angle_error_deg: f64,
    pub start_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoInstrumentResult {
    /// Absolute altitude above sea level, metres.
    pub plume_altitude_m: f64,
    pub plume_altitude_error_m: f64,
    pub average_start_time: Timestamp,
    pub start_time_difference_s: i64,
}

/// Height above the lower scanner at which the two plume-centre rays pass closest
/// to each other, or `None` if they are parallel or miss by more than
/// [MAX_MISS_DISTANCE_M].
fn altitude_above_lower(lower: &PlumeCentreObservation, upper: &PlumeCentreObservation) -> Option<f64> {
    let lower_loc = lower.location;
    let upper_loc = upper.location;

    let distance = lower_loc.position.horizontal_distance(&upper_loc.position);
    let bearing = lower_loc.position.bearing_to(&upper_loc.position);

    let mut upper_origin = [
        distance * bearing.to_radians().cos(),
        distance * (-bearing.to_radians()).sin(),
        upper_loc.position.altitude - lower_loc.position.altitude,
    ];
    upper_origin = rotate_about_vertical(upper_origin, -lower_loc.compass);

    let mut lower_dir = plume_centre_direction(lower.plume_centre_angle_deg, lower_loc.cone_angle, lower_loc.tilt);
    let mut upper_dir = plume_centre_direction(upper.plume_centre_angle_deg, upper_loc.cone_angle, upper_loc.tilt);
    upper_dir = rotate_about_vertical(upper_dir, upper_loc.compass - lower_loc.compass);

    normalize(&mut lower_dir);
    normalize(&mut upper_dir);

    let lower_ray = Ray {
        origin: [0.0, 0.0, 0.0],
        direction: lower_dir,
    };
    let upper_ray = Ray {
        origin: upper_origin,
        direction: upper_dir,
    };

    let (t1, t2, miss2) = closest_approach(&lower_ray, &upper_ray)?;
    if miss2 > MAX_MISS_DISTANCE_M * MAX_MISS_DISTANCE_M {
        return None;
    }

    let point1 = evaluate(&lower_ray, t1);
    let point2 = evaluate(&upper_ray, t2);
    Some((point1[2] + point2[2]) / 2.0)
}

fn normalize(v: &mut [f64; 3]) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    v[0] /= norm;
    v[1] /= norm;
    v[2] /= norm;
}

/// Intersects the two plume-centre rays and returns the plume altitude, with an
/// error estimated by perturbing each plume-centre angle by its reported error and
/// a time-difference penalty applied on top (spec §4.9).
pub fn intersect(a: &PlumeCentreObservation, b: &PlumeCentreObservation) -> Result<TwoInstrumentResult> {
    let (lower, upper) = if a.location.position.altitude <= b.location.position.altitude {
        (a, b)
    } else {
        (b, a)
    };

    let base = altitude_above_lower(lower, upper)
        .ok_or_else(|| Error::GeometryAmbiguous("plume-centre rays miss by more than 40 m".to_string()))?;

    let mut deviations = Vec::new();
    for lower_sign in [-1.0, 1.0] {
        for upper_sign in [-1.0, 1.0] {
            let perturbed_lower = PlumeCentreObservation {
                plume_centre_angle_deg: lower.plume_centre_angle_deg + lower_sign * lower.plume_centre_angle_error_deg,
                ..*lower
            };
            let perturbed_upper = PlumeCentreObservation {
                plume_centre_angle_deg: upper.plume_centre_angle_deg + upper_sign * upper.plume_centre_angle_error_deg,
                ..*upper
            };
            if perturbed_lower.plume_centre_angle_deg.abs() > MAX_PLUME_CENTRE_ANGLE_DEG
                || perturbed_upper.plume_centre_angle_deg.abs() > MAX_PLUME_CENTRE_ANGLE_DEG
            {
                continue;
            }
            if let Some(perturbed) = altitude_above_lower(&perturbed_lower, &perturbed_upper) {
                deviations.push((perturbed - base).abs());
            }
        }
    }

    let mut altitude_error_m = if deviations.is_empty() {
        f64::INFINITY
    } else {
        deviations.iter().sum::<f64>() / deviations.len() as f64
    };

    let time_difference_minutes = (a.start_time.diff_minutes(&b.start_time)).abs();
    altitude_error_m *= 2f64.powf(time_difference_minutes / 30.0);

    let start_time_difference_s = a.start_time.diff_seconds(&b.start_time).abs();
    let average_start_time = a.start_time.add_seconds(a.start_time.diff_seconds(&b.start_time) / -2);

    debug!(
        "two-instrument intersection: altitude_above_lower={base:.1} m, error={altitude_error_m:.1} m, dt={start_time_difference_s}s"
    );

    Ok(TwoInstrumentResult {
        plume_altitude_m: base + lower.location.position.altitude,
        plume_altitude_error_m: altitude_error_m,
        average_start_time,
        start_time_difference_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::{GpsPoint, ScannerType};

    fn location(lat: f64, lon: f64, altitude: f64, compass: f64) -> InstrumentLocation {
        let base = Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap();
        InstrumentLocation {
            position: GpsPoint::new(lat, lon, altitude),
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
    fn recovers_known_plume_height_from_two_synthetic_scanners() {
        let point_a = GpsPoint::new(19.40, -155.60, 1000.0);
        let point_b = GpsPoint::new(19.40, -155.58, 1000.0);
        let distance = point_a.horizontal_distance(&point_b);
        let bearing_a_to_b = point_a.bearing_to(&point_b);
        // Both scanners share a compass so the plume (above the baseline midpoint)
        // sits on each ray's local y-axis with opposite signs (see module test notes).
        let compass = bearing_a_to_b + 90.0;

        let a_loc = location(19.40, -155.60, 1000.0, compass);
        let b_loc = location(19.40, -155.58, 1000.0, compass);
        let plume_height = 2000.0;

        let angle_a = ((distance / 2.0) / plume_height).atan().to_degrees();
        let angle_b = -angle_a;

        let time = Timestamp::from_ymd_hms_milli(2024, 3, 1, 10, 0, 0, 0).unwrap();
        let obs_a = PlumeCentreObservation {
            location: &a_loc,
            plume_centre_angle_deg: angle_a,
            plume_centre_angle_error_deg: 0.5,
            start_time: time,
        };
        let obs_b = PlumeCentreObservation {
            location: &b_loc,
            plume_centre_angle_deg: angle_b,
            plume_centre_angle_error_deg: 0.5,
            start_time: time,
        };

        let result = intersect(&obs_a, &obs_b).unwrap();
        assert!((result.plume_altitude_m - (1000.0 + plume_height)).abs() < 50.0);
    }

    #[test]
    fn rays_missing_by_more_than_40m_are_ambiguous() {
        let a_loc = location(19.40, -155.60, 1000.0, 0.0);
        let b_loc = location(19.50, -156.00, 1000.0, 0.0);
        let time = Timestamp::from_ymd_hms_milli(2024, 3, 1, 10, 0, 0, 0).unwrap();
        let obs_a = PlumeCentreObservation {
            location: &a_loc,
            plume_centre_angle_deg: 45.0,
            plume_centre_angle_error_deg: 0.5,
            start_time: time,
        };
        let obs_b = PlumeCentreObservation {
            location: &b_loc,
            plume_centre_angle_deg: -10.0,
            plume_centre_angle_error_deg: 0.5,
            start_time: time,
        };
        assert!(intersect(&obs_a, &obs_b).is_err());
    }
}
