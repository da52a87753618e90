//!
//! Flux calculation output (spec §3 "Flux result", §4.11).
//!

use crate::data::instrument::ScannerType;
use crate::data::timestamp::Timestamp;
use crate::data::wind::MeteorologySource;

/// Overall confidence tier for a flux measurement (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FluxQuality {
    Green,
    Yellow,
    Red,
}

/// The three independently-reported error components of a flux measurement (spec
/// §4.11 "Uncertainty").
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxErrorComponents {
    pub wind_direction_component: f64,
    pub wind_speed_component: f64,
    pub plume_height_component: f64,
}

impl FluxErrorComponents {
    /// Combines the three components in quadrature.
    pub fn combined(&self) -> f64 {
        (self.wind_direction_component.powi(2)
            + self.wind_speed_component.powi(2)
            + self.plume_height_component.powi(2))
        .sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxResult {
    pub flux_kg_s: f64,
    pub error: FluxErrorComponents,
    pub wind_speed_mps: f64,
    pub wind_speed_error_mps: f64,
    pub wind_speed_source: MeteorologySource,
    pub wind_direction_deg: f64,
    pub wind_direction_error_deg: f64,
    pub wind_direction_source: MeteorologySource,
    pub plume_altitude_m: f64,
    pub plume_altitude_error_m: f64,
    pub plume_altitude_source: MeteorologySource,
    pub good_spectrum_count: usize,
    /// Averaged across every spectrum in the scan, good or rejected, for the flux
    /// log's per-scan telemetry columns (spec §6 "Flux log (append)").
    pub average_temperature: f64,
    pub average_battery_voltage: f64,
    pub average_exposure_time_ms: u32,
    pub cone_angle: f64,
    pub tilt: f64,
    pub compass: f64,
    pub instrument_serial: String,
    pub scanner_type: ScannerType,
    pub scan_offset: f64,
    pub completeness: f64,
    pub plume_centre_alpha: f64,
    pub plume_centre_phi: f64,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub quality: FluxQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrature_combination() {
        let e = FluxErrorComponents {
            wind_direction_component: 3.0,
            wind_speed_component: 4.0,
            plume_height_component: 0.0,
        };
        assert!((e.combined() - 5.0).abs() < 1e-9);
    }
}
