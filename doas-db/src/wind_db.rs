//!
//! Wind field database (C8, spec §4.8): append-only time-bucketed wind records with
//! a deduplicated location table, queried by exact/nearest/bilinear lookup.
//!

use crate::result::{Error, Result};
use doas_model::data::wind::{polar_to_uv, uv_to_polar};
use doas_model::data::{GpsPoint, Timestamp, WindField};

/// Sentinel interned-location index meaning "not tied to a specific point" (spec
/// §4.8 "global, indexed as -1").
const GLOBAL_LOCATION: i32 = -1;

/// Deduplicated list of GPS points referenced by wind/plume records, interned by
/// value so repeated insertions at the same point share one index.
#[derive(Debug, Clone, Default)]
struct LocationTable {
    points: Vec<GpsPoint>,
}

impl LocationTable {
    fn intern(&mut self, point: Option<GpsPoint>) -> i32 {
        let Some(point) = point else { return GLOBAL_LOCATION };
        if let Some(index) = self.points.iter().position(|p| points_equal(p, &point)) {
            return index as i32;
        }
        self.points.push(point);
        (self.points.len() - 1) as i32
    }

    fn get(&self, index: i32) -> Option<GpsPoint> {
        if index == GLOBAL_LOCATION {
            None
        } else {
            self.points.get(index as usize).copied()
        }
    }

    fn nearest(&self, target: &GpsPoint) -> Option<i32> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.horizontal_distance(target)
                    .partial_cmp(&b.horizontal_distance(target))
                    .unwrap()
            })
            .map(|(i, _)| i as i32)
    }
}

fn points_equal(a: &GpsPoint, b: &GpsPoint) -> bool {
    (a.latitude - b.latitude).abs() < 1e-9
        && (a.longitude - b.longitude).abs() < 1e-9
        && (a.altitude - b.altitude).abs() < 1e-6
}

#[derive(Debug, Clone)]
struct WindBucket {
    valid_from: Timestamp,
    valid_to: Timestamp,
    records: Vec<(i32, WindField)>,
}

impl WindBucket {
    fn covers(&self, time: &Timestamp) -> bool {
        time.is_between(&self.valid_from, &self.valid_to)
    }
}

/// How a wind-field query resolves a location that does not have an exact-match
/// record (spec §4.8 "getWindField").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupMethod {
    Exact,
    Nearest,
    /// Valid only on a regular lat/lon grid; falls back to [LookupMethod::Nearest]
    /// when the grid is irregular.
    Bilinear,
}

/// Append-only store of [WindField] records, bucketed by validity interval (spec
/// §4.8). Read-mostly: queries never mutate the store.
#[derive(Debug, Clone, Default)]
pub struct WindDatabase {
    locations: LocationTable,
    buckets: Vec<WindBucket>,
}

impl WindDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `field`, interning `location` (or [GLOBAL_LOCATION] if `None`) and
    /// appending into the bucket whose validity interval exactly matches the field's,
    /// creating one lazily if none matches (spec §4.8 "created lazily when no bucket
    /// matches the exact interval").
    pub fn insert(&mut self, location: Option<GpsPoint>, field: WindField) {
        let location_index = self.locations.intern(location);
        let bucket = self
            .buckets
            .iter_mut()
            .find(|b| b.valid_from == field.valid_from && b.valid_to == field.valid_to);
        match bucket {
            Some(bucket) => bucket.records.push((location_index, field)),
            None => self.buckets.push(WindBucket {
                valid_from: field.valid_from,
                valid_to: field.valid_to,
                records: vec![(location_index, field)],
            }),
        }
    }

    pub fn get_wind_field(&self, time: &Timestamp, location: Option<&GpsPoint>, method: LookupMethod) -> Result<WindField> {
        match method {
            LookupMethod::Exact => self.exact(time, location),
            LookupMethod::Nearest => self.nearest(time, location),
            LookupMethod::Bilinear => self.bilinear(time, location).or_else(|_| self.nearest(time, location)),
        }
    }

    fn exact(&self, time: &Timestamp, location: Option<&GpsPoint>) -> Result<WindField> {
        let requested_index = location.and_then(|p| {
            self.locations
                .points
                .iter()
                .position(|q| points_equal(q, p))
                .map(|i| i as i32)
        });

        let mut candidates: Vec<&WindField> = Vec::new();
        for bucket in self.buckets.iter().filter(|b| b.covers(time)) {
            for (index, field) in &bucket.records {
                let matches = match requested_index {
                    Some(requested) => *index == requested || *index == GLOBAL_LOCATION,
                    None => true,
                };
                if matches {
                    candidates.push(field);
                }
            }
        }

        if candidates.is_empty() {
            return Err(Error::NoWindFieldAtTime(format!("{time:?}")));
        }

        let best_rank = candidates
            .iter()
            .map(|f| f.speed_source.quality_rank().max(f.direction_source.quality_rank()))
            .max()
            .unwrap();
        let best: Vec<&WindField> = candidates
            .into_iter()
            .filter(|f| f.speed_source.quality_rank().max(f.direction_source.quality_rank()) == best_rank)
            .collect();

        let mut result = *best[0];
        for field in best.iter().skip(1) {
            result = WindField::average(&result, field);
        }
        Ok(result)
    }

    fn nearest(&self, time: &Timestamp, location: Option<&GpsPoint>) -> Result<WindField> {
        let Some(location) = location else {
            return self.exact(time, None);
        };
        match self.locations.nearest(location) {
            Some(index) => {
                let nearest_point = self.locations.get(index);
                self.exact(time, nearest_point.as_ref())
            }
            None => self.exact(time, None),
        }
    }

    /// Bilinear interpolation on a regular lat/lon grid within the bucket covering
    /// `time`; decomposes (speed, direction) into (u, v) and interpolates each
    /// independently before recomposing (spec §4.8).
    fn bilinear(&self, time: &Timestamp, location: Option<&GpsPoint>) -> Result<WindField> {
        let location = location.ok_or(Error::IrregularGrid)?;
        let bucket = self.buckets.iter().find(|b| b.covers(time)).ok_or(Error::IrregularGrid)?;

        let mut lats: Vec<f64> = bucket
            .records
            .iter()
            .filter_map(|(i, _)| self.locations.get(*i).map(|p| p.latitude))
            .collect();
        let mut lons: Vec<f64> = bucket
            .records
            .iter()
            .filter_map(|(i, _)| self.locations.get(*i).map(|p| p.longitude))
            .collect();
        lats.sort_by(|a, b| a.partial_cmp(b).unwrap());
        lons.sort_by(|a, b| a.partial_cmp(b).unwrap());
        lats.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        lons.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let lat1 = lats.iter().filter(|&&v| v <= location.latitude).cloned().fold(f64::MIN, f64::max);
        let lat2 = lats.iter().filter(|&&v| v >= location.latitude).cloned().fold(f64::MAX, f64::min);
        let lon1 = lons.iter().filter(|&&v| v <= location.longitude).cloned().fold(f64::MIN, f64::max);
        let lon2 = lons.iter().filter(|&&v| v >= location.longitude).cloned().fold(f64::MAX, f64::min);

        if !lat1.is_finite() || !lat2.is_finite() || !lon1.is_finite() || !lon2.is_finite() {
            return Err(Error::IrregularGrid);
        }

        let corner = |lat: f64, lon: f64| -> Option<&WindField> {
            bucket.records.iter().find_map(|(i, f)| {
                self.locations.get(*i).filter(|p| (p.latitude - lat).abs() < 1e-9 && (p.longitude - lon).abs() < 1e-9)?;
                Some(f)
            })
        };

        let q11 = corner(lat1, lon1).ok_or(Error::IrregularGrid)?;
        let q12 = corner(lat1, lon2).ok_or(Error::IrregularGrid)?;
        let q21 = corner(lat2, lon1).ok_or(Error::IrregularGrid)?;
        let q22 = corner(lat2, lon2).ok_or(Error::IrregularGrid)?;

        let (tx, ty) = if (lat2 - lat1).abs() < 1e-9 || (lon2 - lon1).abs() < 1e-9 {
            (0.0, 0.0)
        } else {
            (
                (location.longitude - lon1) / (lon2 - lon1),
                (location.latitude - lat1) / (lat2 - lat1),
            )
        };

        let (u11, v11) = polar_to_uv(q11.speed_mps, q11.direction_deg);
        let (u12, v12) = polar_to_uv(q12.speed_mps, q12.direction_deg);
        let (u21, v21) = polar_to_uv(q21.speed_mps, q21.direction_deg);
        let (u22, v22) = polar_to_uv(q22.speed_mps, q22.direction_deg);

        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let u_lo = lerp(u11, u12, tx);
        let u_hi = lerp(u21, u22, tx);
        let u = lerp(u_lo, u_hi, ty);
        let v_lo = lerp(v11, v12, tx);
        let v_hi = lerp(v21, v22, tx);
        let v = lerp(v_lo, v_hi, ty);

        let (speed, direction) = uv_to_polar(u, v);
        Ok(WindField {
            speed_mps: speed,
            speed_error_mps: q11.speed_error_mps,
            speed_source: q11.speed_source,
            direction_deg: direction,
            direction_error_deg: q11.direction_error_deg,
            direction_source: q11.direction_source,
            valid_from: bucket.valid_from,
            valid_to: bucket.valid_to,
            location: *location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doas_model::data::MeteorologySource;

    fn interval() -> (Timestamp, Timestamp) {
        (
            Timestamp::from_ymd_hms_milli(2024, 1, 1, 0, 0, 0, 0).unwrap(),
            Timestamp::from_ymd_hms_milli(2024, 1, 1, 6, 0, 0, 0).unwrap(),
        )
    }

    fn field(speed: f64, direction: f64, source: MeteorologySource, location: GpsPoint) -> WindField {
        let (from, to) = interval();
        WindField {
            speed_mps: speed,
            speed_error_mps: 1.0,
            speed_source: source,
            direction_deg: direction,
            direction_error_deg: 5.0,
            direction_source: source,
            valid_from: from,
            valid_to: to,
            location,
        }
    }

    #[test]
    fn exact_lookup_prefers_highest_quality_source() {
        let mut db = WindDatabase::new();
        let point = GpsPoint::new(19.4, -155.6, 0.0);
        db.insert(Some(point), field(5.0, 90.0, MeteorologySource::Default, point));
        db.insert(Some(point), field(10.0, 270.0, MeteorologySource::EcmwfForecast, point));
        let (from, _) = interval();
        let result = db.get_wind_field(&from, Some(&point), LookupMethod::Exact).unwrap();
        assert!((result.speed_mps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn ties_at_same_quality_are_averaged() {
        let mut db = WindDatabase::new();
        let point = GpsPoint::new(19.4, -155.6, 0.0);
        db.insert(Some(point), field(10.0, 0.0, MeteorologySource::EcmwfForecast, point));
        db.insert(Some(point), field(10.0, 180.0, MeteorologySource::EcmwfForecast, point));
        let (from, _) = interval();
        let result = db.get_wind_field(&from, Some(&point), LookupMethod::Exact).unwrap();
        assert!(result.speed_mps < 1.0);
    }

    #[test]
    fn nearest_falls_back_to_closest_interned_location() {
        let mut db = WindDatabase::new();
        let near = GpsPoint::new(19.4, -155.6, 0.0);
        let far = GpsPoint::new(0.0, 0.0, 0.0);
        db.insert(Some(near), field(7.0, 45.0, MeteorologySource::NoaaForecast, near));
        let requested = GpsPoint::new(19.41, -155.59, 0.0);
        let (from, _) = interval();
        let result = db.get_wind_field(&from, Some(&requested), LookupMethod::Nearest).unwrap();
        assert!((result.speed_mps - 7.0).abs() < 1e-9);
        let _ = far;
    }

    #[test]
    fn no_record_covering_time_is_an_error() {
        let db = WindDatabase::new();
        let point = GpsPoint::new(19.4, -155.6, 0.0);
        let (from, _) = interval();
        assert!(db.get_wind_field(&from, Some(&point), LookupMethod::Exact).is_err());
    }
}
