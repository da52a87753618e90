//!
//! Plume-height database (C8, spec §4.8): append-only time-bucketed altitude
//! records, queried with source-tier preference (two-instrument geometry, then
//! single-instrument, then other sources), averaging within a tier.
//!

use crate::result::{Error, Result};
use doas_model::data::{MeteorologySource, PlumeHeight, Timestamp};

#[derive(Debug, Clone)]
struct PlumeHeightBucket {
    valid_from: Timestamp,
    valid_to: Timestamp,
    records: Vec<PlumeHeight>,
}

impl PlumeHeightBucket {
    fn covers(&self, time: &Timestamp) -> bool {
        time.is_between(&self.valid_from, &self.valid_to)
    }
}

fn tier(source: MeteorologySource) -> u8 {
    match source {
        MeteorologySource::GeometryCalculationTwoInstruments => 3,
        MeteorologySource::GeometryCalculationSingleInstrument => 2,
        MeteorologySource::Default | MeteorologySource::User => 0,
        _ => 1,
    }
}

/// Append-only store of [PlumeHeight] records bucketed by validity interval (spec
/// §4.8).
#[derive(Debug, Clone, Default)]
pub struct PlumeHeightDatabase {
    buckets: Vec<PlumeHeightBucket>,
}

impl PlumeHeightDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, height: PlumeHeight) {
        let bucket = self
            .buckets
            .iter_mut()
            .find(|b| b.valid_from == height.valid_from && b.valid_to == height.valid_to);
        match bucket {
            Some(bucket) => bucket.records.push(height),
            None => self.buckets.push(PlumeHeightBucket {
                valid_from: height.valid_from,
                valid_to: height.valid_to,
                records: vec![height],
            }),
        }
    }

    /// Returns the highest-tier record covering `time`, averaged within its tier,
    /// with the validity interval intersected against `time` itself (spec §4.8
    /// "intersected with the scan timestamp").
    pub fn get_plume_height(&self, time: &Timestamp) -> Result<PlumeHeight> {
        let candidates: Vec<&PlumeHeight> = self
            .buckets
            .iter()
            .filter(|b| b.covers(time))
            .flat_map(|b| b.records.iter())
            .collect();

        if candidates.is_empty() {
            return Err(Error::NoPlumeHeightAtTime(format!("{time:?}")));
        }

        let best_tier = candidates.iter().map(|r| tier(r.source)).max().unwrap();
        let best: Vec<&PlumeHeight> = candidates.into_iter().filter(|r| tier(r.source) == best_tier).collect();

        let mut result = *best[0];
        for record in best.iter().skip(1) {
            result = PlumeHeight::average(&result, record);
        }
        if let Some((from, to)) = Timestamp::intersect((result.valid_from, result.valid_to), (*time, *time)) {
            result.valid_from = from;
            result.valid_to = to;
        }
        Ok(result)
    }
}
