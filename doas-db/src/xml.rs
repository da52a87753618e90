//!
//! Wind field XML (de)serialisation (spec §6 "Wind field XML (read/write)"):
//! document root `<Wind volcano="...">`, one `<windfield>` block per validity
//! interval carrying `<source>`/`<altitude>`/`<valid_from>`/`<valid_to>` and a list
//! of `<item lat lon ws wse wd wde/>` records.
//!

use crate::result::{Error, Result};
use crate::wind_db::WindDatabase;
use doas_model::data::{GpsPoint, MeteorologySource, Timestamp, WindField};
use std::io::{Read, Write};
use xml::reader::XmlEvent as ReaderEvent;
use xml::writer::XmlEvent as WriterEvent;
use xml::{EmitterConfig, EventReader};

fn source_to_string(source: MeteorologySource) -> &'static str {
    match source {
        MeteorologySource::Default => "default",
        MeteorologySource::User => "user",
        MeteorologySource::GeometryCalculationSingleInstrument => "geometry_single",
        MeteorologySource::GeometryCalculationTwoInstruments => "geometry_dual",
        MeteorologySource::DualBeamMeasurement => "dual_beam",
        MeteorologySource::EcmwfForecast => "ecmwf",
        MeteorologySource::NoaaForecast => "noaa",
    }
}

fn source_from_string(text: &str) -> MeteorologySource {
    match text {
        "user" => MeteorologySource::User,
        "geometry_single" => MeteorologySource::GeometryCalculationSingleInstrument,
        "geometry_dual" => MeteorologySource::GeometryCalculationTwoInstruments,
        "dual_beam" => MeteorologySource::DualBeamMeasurement,
        "ecmwf" => MeteorologySource::EcmwfForecast,
        "noaa" => MeteorologySource::NoaaForecast,
        _ => MeteorologySource::Default,
    }
}

/// Resolves an ISO `YYYY.MM.DDTHH:MM:SS` timestamp or a `TODAY(n)` expression
/// against `as_of` rather than the wall clock, so parsing stays pure and testable
/// (spec §6, SPEC_FULL "Wind field XML writer").
fn parse_date(text: &str, as_of: &Timestamp) -> Result<Timestamp> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix("TODAY(").and_then(|s| s.strip_suffix(')')) {
        let offset: i64 = inner
            .trim()
            .parse()
            .map_err(|_| Error::MalformedDocument(format!("bad TODAY(n) expression: {text}")))?;
        return Ok(as_of.add_days(offset));
    }

    let mut parts = text.splitn(2, 'T');
    let date_part = parts.next().unwrap_or("");
    let time_part = parts.next().unwrap_or("00:00:00");

    let date_fields: Vec<&str> = date_part.split('.').collect();
    let time_fields: Vec<&str> = time_part.split(':').collect();
    if date_fields.len() != 3 || time_fields.len() != 3 {
        return Err(Error::MalformedDocument(format!("bad timestamp: {text}")));
    }

    let field = |s: &str| s.parse::<u32>().map_err(|_| Error::MalformedDocument(format!("bad timestamp: {text}")));
    let year: i32 = date_fields[0]
        .parse()
        .map_err(|_| Error::MalformedDocument(format!("bad timestamp: {text}")))?;
    let month = field(date_fields[1])?;
    let day = field(date_fields[2])?;
    let hour = field(time_fields[0])?;
    let minute = field(time_fields[1])?;
    let second = field(time_fields[2])?;

    Timestamp::from_ymd_hms_milli(year, month, day, hour, minute, second, 0)
        .ok_or_else(|| Error::MalformedDocument(format!("invalid calendar timestamp: {text}")))
}

fn format_date(time: &Timestamp) -> String {
    format!("{time}")
}

#[derive(Default)]
struct WindFieldBlock {
    source: MeteorologySource,
    altitude: f64,
    valid_from: Option<Timestamp>,
    valid_to: Option<Timestamp>,
    items: Vec<(GpsPoint, f64, f64, f64, f64)>,
}

/// Parses a wind field XML document into a [WindDatabase], resolving any
/// `TODAY(n)` expressions against `as_of`.
pub fn read_wind_database<R: Read>(reader: R, as_of: &Timestamp) -> Result<WindDatabase> {
    let parser = EventReader::new(reader);
    let mut database = WindDatabase::new();

    let mut block: Option<WindFieldBlock> = None;
    let mut field: Option<&'static str> = None;
    let mut text_buffer = String::new();

    for event in parser {
        match event? {
            ReaderEvent::StartElement { name, attributes, .. } => match name.local_name.as_str() {
                "windfield" => block = Some(WindFieldBlock::default()),
                "source" => field = Some("source"),
                "altitude" => field = Some("altitude"),
                "valid_from" => field = Some("valid_from"),
                "valid_to" => field = Some("valid_to"),
                "item" => {
                    let attr = |key: &str| -> Result<f64> {
                        attributes
                            .iter()
                            .find(|a| a.name.local_name == key)
                            .ok_or_else(|| Error::MalformedDocument(format!("<item> missing attribute {key}")))?
                            .value
                            .parse()
                            .map_err(|_| Error::MalformedDocument(format!("<item> has non-numeric {key}")))
                    };
                    let point = GpsPoint::new(attr("lat")?, attr("lon")?, 0.0);
                    let block = block
                        .as_mut()
                        .ok_or_else(|| Error::MalformedDocument("<item> outside <windfield>".to_string()))?;
                    block.items.push((point, attr("ws")?, attr("wse")?, attr("wd")?, attr("wde")?));
                }
                _ => field = None,
            },
            ReaderEvent::Characters(chars) => {
                if field.is_some() {
                    text_buffer.push_str(&chars);
                }
            }
            ReaderEvent::EndElement { name } => match name.local_name.as_str() {
                "source" | "altitude" | "valid_from" | "valid_to" => {
                    if let (Some(field_name), Some(block)) = (field.take(), block.as_mut()) {
                        let text = text_buffer.trim().to_string();
                        match field_name {
                            "source" => block.source = source_from_string(&text),
                            "altitude" => {
                                block.altitude = text
                                    .parse()
                                    .map_err(|_| Error::MalformedDocument(format!("bad altitude: {text}")))?;
                            }
                            "valid_from" => block.valid_from = Some(parse_date(&text, as_of)?),
                            "valid_to" => block.valid_to = Some(parse_date(&text, as_of)?),
                            _ => {}
                        }
                    }
                    text_buffer.clear();
                }
                "windfield" => {
                    if let Some(block) = block.take() {
                        let valid_from = block
                            .valid_from
                            .ok_or_else(|| Error::MalformedDocument("windfield missing valid_from".to_string()))?;
                        let valid_to = block
                            .valid_to
                            .ok_or_else(|| Error::MalformedDocument("windfield missing valid_to".to_string()))?;
                        for (mut point, speed, speed_error, direction, direction_error) in block.items {
                            point.altitude = block.altitude;
                            let field = WindField {
                                speed_mps: speed,
                                speed_error_mps: speed_error,
                                speed_source: block.source,
                                direction_deg: direction,
                                direction_error_deg: direction_error,
                                direction_source: block.source,
                                valid_from,
                                valid_to,
                                location: point,
                            };
                            database.insert(Some(point), field);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(database)
}

/// Writes `records` (each a location and its wind field) as a wind field XML
/// document with a single `<windfield>` block per distinct validity interval and
/// source, matching the reference writer's grouping (spec §6).
pub fn write_wind_database<W: Write>(writer: W, volcano: &str, records: &[(GpsPoint, WindField)]) -> Result<()> {
    let mut out = xml::EventWriter::new_with_config(
        writer,
        EmitterConfig::new().perform_indent(true).write_document_declaration(true),
    );

    out.write(WriterEvent::start_element("Wind").attr("volcano", volcano))?;

    let mut groups: Vec<(Timestamp, Timestamp, MeteorologySource, Vec<(GpsPoint, WindField)>)> = Vec::new();
    for (point, field) in records {
        let group = groups.iter_mut().find(|(from, to, source, _)| {
            *from == field.valid_from && *to == field.valid_to && *source == field.speed_source
        });
        match group {
            Some((_, _, _, items)) => items.push((*point, *field)),
            None => groups.push((
                field.valid_from,
                field.valid_to,
                field.speed_source,
                vec![(*point, *field)],
            )),
        }
    }

    for (from, to, source, items) in &groups {
        out.write(WriterEvent::start_element("windfield"))?;

        out.write(WriterEvent::start_element("source"))?;
        out.write(WriterEvent::characters(source_to_string(*source)))?;
        out.write(WriterEvent::end_element())?;

        let altitude = items.first().map(|(p, _)| p.altitude).unwrap_or(0.0);
        out.write(WriterEvent::start_element("altitude"))?;
        out.write(WriterEvent::characters(&format!("{altitude:.1}")))?;
        out.write(WriterEvent::end_element())?;

        out.write(WriterEvent::start_element("valid_from"))?;
        out.write(WriterEvent::characters(&format_date(from)))?;
        out.write(WriterEvent::end_element())?;

        out.write(WriterEvent::start_element("valid_to"))?;
        out.write(WriterEvent::characters(&format_date(to)))?;
        out.write(WriterEvent::end_element())?;

        for (point, field) in items {
            let lat = format!("{:.2}", point.latitude);
            let lon = format!("{:.2}", point.longitude);
            let ws = format!("{:.2}", field.speed_mps);
            let wse = format!("{:.2}", field.speed_error_mps);
            let wd = format!("{:.2}", field.direction_deg);
            let wde = format!("{:.2}", field.direction_error_deg);
            out.write(
                WriterEvent::start_element("item")
                    .attr("lat", &lat)
                    .attr("lon", &lon)
                    .attr("ws", &ws)
                    .attr("wse", &wse)
                    .attr("wd", &wd)
                    .attr("wde", &wde),
            )?;
            out.write(WriterEvent::end_element())?;
        }

        out.write(WriterEvent::end_element())?;
    }

    out.write(WriterEvent::end_element())?;
    Ok(())
}
