//!
//! Wind field and plume height records (spec §3) and their provenance/quality
//! ordering, used by the databases (C8) to break ties deterministically.
//!

use crate::data::gps::GpsPoint;
use crate::data::timestamp::Timestamp;

/// Provenance of a meteorological datum. Ordered by [MeteorologySource::quality_rank]
/// so databases can deterministically prefer higher-quality sources (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeteorologySource {
    Default,
    User,
    GeometryCalculationSingleInstrument,
    GeometryCalculationTwoInstruments,
    DualBeamMeasurement,
    EcmwfForecast,
    NoaaForecast,
}

impl MeteorologySource {
    /// Higher is better; ties at the same rank are averaged by the database rather
    /// than arbitrarily preferred (spec §4.8).
    pub fn quality_rank(&self) -> u8 {
        match self {
            MeteorologySource::Default => 0,
            MeteorologySource::User => 1,
            MeteorologySource::GeometryCalculationSingleInstrument => 2,
            MeteorologySource::GeometryCalculationTwoInstruments => 3,
            MeteorologySource::DualBeamMeasurement => 4,
            MeteorologySource::EcmwfForecast => 4,
            MeteorologySource::NoaaForecast => 4,
        }
    }

    /// Whether this source counts as "default or user-supplied" for flux quality
    /// gating (spec §4.11, testable property 8).
    pub fn is_default_or_user(&self) -> bool {
        matches!(self, MeteorologySource::Default | MeteorologySource::User)
    }
}

impl Default for MeteorologySource {
    fn default() -> Self {
        MeteorologySource::Default
    }
}

/// A wind speed/direction datum valid over a time interval and (optionally) a
/// specific location.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindField {
    pub speed_mps: f64,
    pub speed_error_mps: f64,
    pub speed_source: MeteorologySource,
    /// Degrees clockwise from north, direction the wind blows *toward*.
    pub direction_deg: f64,
    pub direction_error_deg: f64,
    pub direction_source: MeteorologySource,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
    pub location: GpsPoint,
}

impl WindField {
    /// Combines two wind fields of equal standing into their mean, with the
    /// per-component uncertainty combined in quadrature (spec §4.8 "averaging ties").
    pub fn average(a: &WindField, b: &WindField) -> WindField {
        let (u_a, v_a) = polar_to_uv(a.speed_mps, a.direction_deg);
        let (u_b, v_b) = polar_to_uv(b.speed_mps, b.direction_deg);
        let (speed, direction) = uv_to_polar((u_a + u_b) / 2.0, (v_a + v_b) / 2.0);
        WindField {
            speed_mps: speed,
            speed_error_mps: ((a.speed_error_mps.powi(2) + b.speed_error_mps.powi(2)) / 2.0).sqrt(),
            speed_source: a.speed_source,
            direction_deg: direction,
            direction_error_deg: ((a.direction_error_deg.powi(2) + b.direction_error_deg.powi(2)) / 2.0)
                .sqrt(),
            direction_source: a.direction_source,
            valid_from: a.valid_from.min(b.valid_from),
            valid_to: a.valid_to.max(b.valid_to),
            location: a.location,
        }
    }
}

/// Decomposes a (speed, direction) pair into its (u, v) Cartesian wind components,
/// used both for bilinear interpolation (C8) and for tie-averaging above.
pub fn polar_to_uv(speed: f64, direction_deg: f64) -> (f64, f64) {
    let rad = direction_deg.to_radians();
    (speed * rad.sin(), speed * rad.cos())
}

/// Inverse of [polar_to_uv].
pub fn uv_to_polar(u: f64, v: f64) -> (f64, f64) {
    let speed = (u * u + v * v).sqrt();
    let direction = u.atan2(v).to_degrees();
    (speed, (direction + 360.0) % 360.0)
}

/// A plume altitude datum valid over a time interval (spec §3 "Plume height").
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlumeHeight {
    pub altitude_m: f64,
    pub altitude_error_m: f64,
    pub source: MeteorologySource,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
}

impl PlumeHeight {
    pub fn average(a: &PlumeHeight, b: &PlumeHeight) -> PlumeHeight {
        PlumeHeight {
            altitude_m: (a.altitude_m + b.altitude_m) / 2.0,
            altitude_error_m: ((a.altitude_error_m.powi(2) + b.altitude_error_m.powi(2)) / 2.0).sqrt(),
            source: a.source,
            valid_from: a.valid_from.min(b.valid_from),
            valid_to: a.valid_to.max(b.valid_to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_round_trip() {
        let (u, v) = polar_to_uv(5.0, 45.0);
        let (speed, direction) = uv_to_polar(u, v);
        assert!((speed - 5.0).abs() < 1e-9);
        assert!((direction - 45.0).abs() < 1e-6);
    }

    #[test]
    fn quality_rank_orders_sources() {
        assert!(
            MeteorologySource::GeometryCalculationTwoInstruments.quality_rank()
                > MeteorologySource::GeometryCalculationSingleInstrument.quality_rank()
        );
        assert!(MeteorologySource::Default.is_default_or_user());
        assert!(!MeteorologySource::EcmwfForecast.is_default_or_user());
    }
}
