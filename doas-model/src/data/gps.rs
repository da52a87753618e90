//!
//! Geographic position, used both for instrument locations and for plume-height /
//! wind-field database records.
//!

/// A WGS84 position: latitude and longitude in degrees, altitude in metres above sea
/// level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Great-circle distance to `other`, in metres, ignoring altitude.
    pub fn horizontal_distance(&self, other: &GpsPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_M * c
    }

    /// Initial compass bearing (degrees clockwise from north) from `self` toward
    /// `other`, along the great circle.
    pub fn bearing_to(&self, other: &GpsPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        let bearing = y.atan2(x).to_degrees();
        (bearing + 360.0) % 360.0
    }

    /// Computes the destination point reached by travelling `distance_m` metres along
    /// `bearing_deg` (degrees clockwise from north) from `self`, at the same altitude.
    pub fn destination(&self, distance_m: f64, bearing_deg: f64) -> GpsPoint {
        let angular_distance = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular_distance.cos()
            + lat1.cos() * angular_distance.sin() * bearing.cos())
        .asin();
        let lon2 = lon1
            + (bearing.sin() * angular_distance.sin() * lat1.cos())
                .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

        GpsPoint::new(lat2.to_degrees(), lon2.to_degrees(), self.altitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_zero_for_same_point() {
        let p = GpsPoint::new(19.48, -155.6, 1200.0);
        assert!(p.horizontal_distance(&p) < 1e-6);
    }

    #[test]
    fn destination_round_trips_distance() {
        let p = GpsPoint::new(19.48, -155.6, 1200.0);
        let q = p.destination(1000.0, 45.0);
        let back = p.horizontal_distance(&q);
        assert!((back - 1000.0).abs() < 1.0, "got {back}");
    }

    #[test]
    fn bearing_north_is_zero() {
        let p = GpsPoint::new(0.0, 0.0, 0.0);
        let q = p.destination(10_000.0, 0.0);
        let bearing = p.bearing_to(&q);
        assert!(bearing.abs() < 1e-3 || (bearing - 360.0).abs() < 1e-3);
    }
}
