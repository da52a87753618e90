//!
//! Flux quality tiering (spec §4.11 "Quality tier"), grounded on
//! `FluxCalculator.cpp`'s `WindFieldFluxQuality`/`PlumeHeightFluxQuality`/
//! `CompletessFluxQuality` and their combination in `CalculateFlux`.
//!

use doas_model::data::{FluxQuality, MeteorologySource};

fn wind_quality(source: MeteorologySource) -> FluxQuality {
    match source {
        MeteorologySource::Default | MeteorologySource::User => FluxQuality::Red,
        MeteorologySource::EcmwfForecast | MeteorologySource::NoaaForecast | MeteorologySource::DualBeamMeasurement => {
            FluxQuality::Green
        }
        _ => FluxQuality::Yellow,
    }
}

fn plume_height_quality(source: MeteorologySource) -> FluxQuality {
    match source {
        MeteorologySource::Default | MeteorologySource::User => FluxQuality::Red,
        MeteorologySource::GeometryCalculationTwoInstruments => FluxQuality::Green,
        _ => FluxQuality::Yellow,
    }
}

fn completeness_quality(completeness: f64) -> FluxQuality {
    if completeness < 0.7 {
        FluxQuality::Red
    } else if completeness < 0.9 {
        FluxQuality::Yellow
    } else {
        FluxQuality::Green
    }
}

fn worst(tiers: &[FluxQuality]) -> FluxQuality {
    if tiers.contains(&FluxQuality::Red) {
        FluxQuality::Red
    } else if tiers.contains(&FluxQuality::Yellow) {
        FluxQuality::Yellow
    } else {
        FluxQuality::Green
    }
}

/// Overall tier: the worst of the wind-source, plume-height-source, and
/// completeness tiers (spec §4.11).
pub fn overall_quality(wind_speed_source: MeteorologySource, plume_height_source: MeteorologySource, completeness: f64) -> FluxQuality {
    worst(&[
        wind_quality(wind_speed_source),
        plume_height_quality(plume_height_source),
        completeness_quality(completeness),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wind_source_forces_red() {
        let q = overall_quality(MeteorologySource::Default, MeteorologySource::GeometryCalculationTwoInstruments, 0.95);
        assert_eq!(q, FluxQuality::Red);
    }

    #[test]
    fn single_instrument_plume_height_is_yellow_when_otherwise_green() {
        let q = overall_quality(
            MeteorologySource::EcmwfForecast,
            MeteorologySource::GeometryCalculationSingleInstrument,
            0.95,
        );
        assert_eq!(q, FluxQuality::Yellow);
    }

    #[test]
    fn all_good_sources_and_high_completeness_is_green() {
        let q = overall_quality(
            MeteorologySource::DualBeamMeasurement,
            MeteorologySource::GeometryCalculationTwoInstruments,
            0.95,
        );
        assert_eq!(q, FluxQuality::Green);
    }

    #[test]
    fn marginal_completeness_is_yellow() {
        let q = overall_quality(
            MeteorologySource::DualBeamMeasurement,
            MeteorologySource::GeometryCalculationTwoInstruments,
            0.8,
        );
        assert_eq!(q, FluxQuality::Yellow);
    }
}
