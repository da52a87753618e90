use doas_db::{read_wind_database, write_wind_database, LookupMethod, PlumeHeightDatabase};
use doas_model::data::{GpsPoint, MeteorologySource, PlumeHeight, Timestamp, WindField};

#[test]
fn wind_database_xml_round_trip_across_two_locations() {
    let as_of = Timestamp::from_ymd_hms_milli(2024, 6, 1, 0, 0, 0, 0).unwrap();
    let from = Timestamp::from_ymd_hms_milli(2024, 5, 1, 0, 0, 0, 0).unwrap();
    let to = Timestamp::from_ymd_hms_milli(2024, 5, 1, 6, 0, 0, 0).unwrap();

    let a = GpsPoint::new(19.4, -155.6, 1200.0);
    let b = GpsPoint::new(19.5, -155.7, 1100.0);

    let field = |location: GpsPoint, speed: f64, direction: f64| WindField {
        speed_mps: speed,
        speed_error_mps: 0.5,
        speed_source: MeteorologySource::EcmwfForecast,
        direction_deg: direction,
        direction_error_deg: 5.0,
        direction_source: MeteorologySource::EcmwfForecast,
        valid_from: from,
        valid_to: to,
        location,
    };

    let records = vec![(a, field(a, 4.0, 90.0)), (b, field(b, 6.0, 180.0))];

    let mut buffer = Vec::new();
    write_wind_database(&mut buffer, "Kilauea", &records).unwrap();

    let database = read_wind_database(buffer.as_slice(), &as_of).unwrap();
    let result_a = database.get_wind_field(&from, Some(&a), LookupMethod::Exact).unwrap();
    let result_b = database.get_wind_field(&from, Some(&b), LookupMethod::Exact).unwrap();
    assert!((result_a.speed_mps - 4.0).abs() < 1e-6);
    assert!((result_b.speed_mps - 6.0).abs() < 1e-6);
}

#[test]
fn plume_height_database_prefers_two_instrument_tier_within_overlapping_interval() {
    let from = Timestamp::from_ymd_hms_milli(2024, 5, 1, 0, 0, 0, 0).unwrap();
    let to = Timestamp::from_ymd_hms_milli(2024, 5, 1, 6, 0, 0, 0).unwrap();

    let mut db = PlumeHeightDatabase::new();
    db.insert(PlumeHeight {
        altitude_m: 2500.0,
        altitude_error_m: 100.0,
        source: MeteorologySource::Default,
        valid_from: from,
        valid_to: to,
    });
    db.insert(PlumeHeight {
        altitude_m: 3200.0,
        altitude_error_m: 80.0,
        source: MeteorologySource::GeometryCalculationTwoInstruments,
        valid_from: from,
        valid_to: to,
    });

    let result = db.get_plume_height(&from).unwrap();
    assert_eq!(result.source, MeteorologySource::GeometryCalculationTwoInstruments);
    assert!((result.altitude_m - 3200.0).abs() < 1e-6);
}
