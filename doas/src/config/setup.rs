//!
//! Setup configuration document (spec §6 bullet 1): per-instrument location
//! history. Parsed with the `xml` crate's `EventReader` using the same
//! accumulate-into-a-block-then-commit-on-close-tag idiom as
//! `doas-db::xml::read_wind_database`, since (unlike the processing document) this
//! one repeats a nested `<Location>` element per instrument and a flat path-to-text
//! map would lose that repetition.
//!

use crate::config::processing::parse_date_only;
use crate::result::{Error, Result};
use doas_model::data::{GpsPoint, InstrumentHistory, InstrumentLocation, ScannerType, Timestamp};
use std::io::Read;
use xml::reader::XmlEvent;
use xml::EventReader;

#[derive(Default)]
struct LocationBlock {
    valid_from: Option<Timestamp>,
    valid_to: Option<Timestamp>,
    lat: Option<f64>,
    lon: Option<f64>,
    altitude: Option<f64>,
    compass: Option<f64>,
    cone_angle: Option<f64>,
    tilt: Option<f64>,
    scanner_type: Option<ScannerType>,
    spectrometer_model: Option<String>,
    site_label: Option<String>,
}

fn scanner_type_from_str(text: &str) -> Result<ScannerType> {
    match text {
        "FlatSingleAxis" | "Gothenburg" => Ok(ScannerType::FlatSingleAxis),
        "TwoAxis" | "Heidelberg" => Ok(ScannerType::TwoAxis),
        other => Err(Error::ConfigurationInvalid(format!("unknown scanner type '{other}'"))),
    }
}

/// Parses a Setup configuration document into one [InstrumentHistory] per
/// `<Instrument>` block, validating that each instrument's location validity
/// windows are disjoint (spec §6 "Validity windows of locations for one instrument
/// must be disjoint").
pub fn load_setup_document<R: Read>(source: R) -> Result<Vec<InstrumentHistory>> {
    let parser = EventReader::new(source);

    let mut histories: Vec<InstrumentHistory> = Vec::new();
    let mut current_serial: Option<String> = None;
    let mut current_locations: Vec<LocationBlock> = Vec::new();
    let mut location: Option<LocationBlock> = None;
    let mut field: Option<&'static str> = None;
    let mut buffer = String::new();

    for event in parser {
        match event.map_err(|e| Error::ConfigurationInvalid(e.to_string()))? {
            XmlEvent::StartElement { name, .. } => {
                buffer.clear();
                match name.local_name.as_str() {
                    "Instrument" => {
                        current_serial = None;
                        current_locations = Vec::new();
                    }
                    "Location" => location = Some(LocationBlock::default()),
                    "serial" => field = Some("serial"),
                    "validFrom" => field = Some("validFrom"),
                    "validTo" => field = Some("validTo"),
                    "lat" => field = Some("lat"),
                    "lon" => field = Some("lon"),
                    "altitude" => field = Some("altitude"),
                    "compass" => field = Some("compass"),
                    "coneAngle" => field = Some("coneAngle"),
                    "tilt" => field = Some("tilt"),
                    "scannerType" => field = Some("scannerType"),
                    "spectrometerModel" => field = Some("spectrometerModel"),
                    "siteLabel" => field = Some("siteLabel"),
                    _ => field = None,
                }
            }
            XmlEvent::Characters(chars) => buffer.push_str(&chars),
            XmlEvent::EndElement { name } => {
                let text = buffer.trim().to_string();
                if let Some(field_name) = field.take() {
                    match field_name {
                        "serial" => current_serial = Some(text),
                        _ => {
                            let block = location.as_mut().ok_or_else(|| {
                                Error::ConfigurationInvalid(format!("'{field_name}' found outside <Location>"))
                            })?;
                            match field_name {
                                "validFrom" => block.valid_from = Some(parse_date_only(&text)?),
                                "validTo" => block.valid_to = Some(parse_date_only(&text)?),
                                "lat" => {
                                    block.lat = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad lat '{text}'"))
                                    })?)
                                }
                                "lon" => {
                                    block.lon = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad lon '{text}'"))
                                    })?)
                                }
                                "altitude" => {
                                    block.altitude = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad altitude '{text}'"))
                                    })?)
                                }
                                "compass" => {
                                    block.compass = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad compass '{text}'"))
                                    })?)
                                }
                                "coneAngle" => {
                                    block.cone_angle = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad coneAngle '{text}'"))
                                    })?)
                                }
                                "tilt" => {
                                    block.tilt = Some(text.parse().map_err(|_| {
                                        Error::ConfigurationInvalid(format!("bad tilt '{text}'"))
                                    })?)
                                }
                                "scannerType" => block.scanner_type = Some(scanner_type_from_str(&text)?),
                                "spectrometerModel" => block.spectrometer_model = Some(text),
                                "siteLabel" => block.site_label = Some(text),
                                _ => {}
                            }
                        }
                    }
                }
                buffer.clear();

                if name.local_name == "Location" {
                    if let Some(block) = location.take() {
                        current_locations.push(block);
                    }
                } else if name.local_name == "Instrument" {
                    let serial = current_serial.take().ok_or_else(|| {
                        Error::ConfigurationInvalid("<Instrument> missing <serial>".to_string())
                    })?;
                    let mut history = InstrumentHistory::new(serial.clone());
                    for block in current_locations.drain(..) {
                        let missing = |field: &str| Error::ConfigurationInvalid(format!("instrument '{serial}' location missing '{field}'"));
                        let location = InstrumentLocation {
                            position: GpsPoint::new(
                                block.lat.ok_or_else(|| missing("lat"))?,
                                block.lon.ok_or_else(|| missing("lon"))?,
                                block.altitude.ok_or_else(|| missing("altitude"))?,
                            ),
                            compass: block.compass.ok_or_else(|| missing("compass"))?,
                            cone_angle: block.cone_angle.ok_or_else(|| missing("coneAngle"))?,
                            tilt: block.tilt.unwrap_or(0.0),
                            scanner_type: block.scanner_type.ok_or_else(|| missing("scannerType"))?,
                            spectrometer_model: block.spectrometer_model.unwrap_or_default(),
                            site_label: block.site_label.unwrap_or_default(),
                            valid_from: block.valid_from.ok_or_else(|| missing("validFrom"))?,
                            valid_to: block.valid_to.ok_or_else(|| missing("validTo"))?,
                        };
                        history.push(location)?;
                    }
                    histories.push(history);
                }
            }
            _ => {}
        }
    }

    Ok(histories)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <Setup>
            <Instrument>
                <serial>I2J1234</serial>
                <Location>
                    <validFrom>2020-01-01</validFrom>
                    <validTo>2030-01-01</validTo>
                    <lat>19.40</lat>
                    <lon>-155.60</lon>
                    <altitude>1200</altitude>
                    <compass>266</compass>
                    <coneAngle>60</coneAngle>
                    <tilt>0</tilt>
                    <scannerType>FlatSingleAxis</scannerType>
                    <spectrometerModel>USB2000</spectrometerModel>
                    <siteLabel>Kilauea</siteLabel>
                </Location>
            </Instrument>
        </Setup>
    "#;

    #[test]
    fn parses_one_instrument_with_one_location() {
        let histories = load_setup_document(SAMPLE.as_bytes()).unwrap();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].serial, "I2J1234");
        assert_eq!(histories[0].locations.len(), 1);
        assert_eq!(histories[0].locations[0].cone_angle, 60.0);
    }

    #[test]
    fn instrument_missing_serial_is_rejected() {
        let xml = SAMPLE.replace("<serial>I2J1234</serial>", "");
        assert!(load_setup_document(xml.as_bytes()).is_err());
    }
}
