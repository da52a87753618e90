//!
//! Evaluation configuration document (spec §6 bullet 2): per-instrument ordered fit
//! windows, their references, and dark-correction rules. Nested three levels deep
//! (`Instrument` > `FitWindow` > `Reference`), which is awkward for a flat path map
//! or a single running state machine, so this parser first folds the `xml` crate's
//! `EventReader` events into a small DOM-like [XmlNode] tree and then walks that
//! tree with ordinary struct-building code.
//!

use crate::config::processing::parse_date_only;
use crate::result::{Error, Result};
use doas_fit::reference_loader::read_cross_section_file;
use doas_model::data::{ComponentOption, DarkSettings, DarkSpecOption, FitOption, FitType, FitWindow, Reference, Timestamp};
use std::io::{BufReader, Read};
use xml::reader::XmlEvent;
use xml::EventReader;

#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    fn text_of(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.text.trim().to_string())
    }

    fn required_text(&self, name: &str) -> Result<String> {
        self.text_of(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::ConfigurationInvalid(format!("'{}' missing <{name}>", self.name)))
    }

    fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.text_of(name) {
            Some(text) if !text.is_empty() => text
                .parse()
                .map_err(|_| Error::ConfigurationInvalid(format!("'{name}' is not numeric: {text}"))),
            _ => Ok(default),
        }
    }

    fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.text_of(name).as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }
}

fn parse_tree<R: Read>(source: R) -> Result<XmlNode> {
    let parser = EventReader::new(source);
    let mut root = XmlNode {
        name: "#document".to_string(),
        ..Default::default()
    };
    let mut stack: Vec<XmlNode> = vec![];

    for event in parser {
        match event.map_err(|e| Error::ConfigurationInvalid(e.to_string()))? {
            XmlEvent::StartElement { name, .. } => stack.push(XmlNode {
                name: name.local_name,
                ..Default::default()
            }),
            XmlEvent::Characters(chars) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&chars);
                }
            }
            XmlEvent::EndElement { .. } => {
                if let Some(finished) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(finished),
                        None => root.children.push(finished),
                    }
                }
            }
            _ => {}
        }
    }
    Ok(root)
}

fn parse_fit_type(text: &str) -> Result<FitType> {
    match text {
        "HighPassDivide" => Ok(FitType::HighPassDivide),
        "HighPassSubtract" => Ok(FitType::HighPassSubtract),
        "PolynomialOnOpticalDepth" => Ok(FitType::PolynomialOnOpticalDepth),
        "NoFilter" => Ok(FitType::NoFilter),
        other => Err(Error::ConfigurationInvalid(format!("unknown fit type '{other}'"))),
    }
}

/// Builds a [FitOption] from a node's `<{prefix}Option>` (`Free`/`Fixed`/`Linked`/
/// `Bounded`) and its accompanying `<{prefix}Value>`/`<{prefix}LinkTo>`/
/// `<{prefix}Bound>` leaves.
fn parse_fit_option(node: &XmlNode, prefix: &str, default: FitOption) -> Result<FitOption> {
    let Some(kind) = node.text_of(&format!("{prefix}Option")) else {
        return Ok(default);
    };
    match kind.as_str() {
        "Free" => Ok(FitOption::Free),
        "Fixed" => Ok(FitOption::Fixed {
            value: node.f64_or(&format!("{prefix}Value"), 0.0)?,
        }),
        "Linked" => Ok(FitOption::Linked {
            to: node
                .text_of(&format!("{prefix}LinkTo"))
                .ok_or_else(|| Error::ConfigurationInvalid(format!("'{prefix}Option' is Linked but no LinkTo given")))?,
        }),
        "Bounded" => Ok(FitOption::Bounded {
            value: node.f64_or(&format!("{prefix}Value"), 0.0)?,
            bound: node.f64_or(&format!("{prefix}Bound"), 0.0)?,
        }),
        other => Err(Error::ConfigurationInvalid(format!("unknown fit option kind '{other}'"))),
    }
}

fn load_reference(node: &XmlNode) -> Result<Reference> {
    let species_name = node.required_text("speciesName")?;
    let path = node.required_text("path")?;
    let file = std::fs::File::open(&path).map_err(Error::Io)?;
    let loaded = read_cross_section_file(BufReader::new(file))?;

    let mut reference = Reference::new(species_name, loaded.cross_section);
    reference.source_path = Some(path);
    reference.shift_option = parse_fit_option(node, "shift", FitOption::Free)?;
    reference.squeeze_option = parse_fit_option(node, "squeeze", FitOption::Fixed { value: 1.0 })?;
    reference.column_option = parse_fit_option(node, "column", FitOption::Free)?;
    Ok(reference)
}

fn load_fit_window(node: &XmlNode) -> Result<FitWindow> {
    let references = node
        .children_named("Reference")
        .into_iter()
        .map(load_reference)
        .collect::<Result<Vec<_>>>()?;

    let fraunhofer_reference = match node.child("FraunhoferReference") {
        Some(child) => Some(load_reference(child)?),
        None => None,
    };

    Ok(FitWindow {
        name: node.required_text("name")?,
        fit_low: node.required_text("fitLow")?.parse().map_err(|_| Error::ConfigurationInvalid("bad fitLow".to_string()))?,
        fit_high: node.required_text("fitHigh")?.parse().map_err(|_| Error::ConfigurationInvalid("bad fitHigh".to_string()))?,
        polynomial_order: node.f64_or("polynomialOrder", 3.0)? as u32,
        fit_type: parse_fit_type(&node.required_text("fitType")?)?,
        spectrometer_channel: node.f64_or("spectrometerChannel", 0.0)? as u16,
        spectrum_length: node.f64_or("spectrumLength", 2048.0)? as usize,
        interlace_step: node.f64_or("interlaceStep", 1.0)? as u16,
        start_channel: node.f64_or("startChannel", 0.0)? as u16,
        references,
        fraunhofer_reference,
        child_windows: Vec::new(),
        auto_shift: node.bool_or("autoShift", false),
        sky_shift: node.bool_or("skyShift", false),
        offset_removal_range: None,
        valid_from: parse_date_only(&node.required_text("validFrom")?)?,
        valid_to: parse_date_only(&node.required_text("validTo")?)?,
    })
}

fn parse_dark_spec_option(text: &str) -> Result<DarkSpecOption> {
    match text {
        "MeasuredInScan" => Ok(DarkSpecOption::MeasuredInScan),
        "ModelIfMissing" => Ok(DarkSpecOption::ModelIfMissing),
        "ModelAlways" => Ok(DarkSpecOption::ModelAlways),
        "UserSupplied" => Ok(DarkSpecOption::UserSupplied),
        other => Err(Error::ConfigurationInvalid(format!("unknown dark option '{other}'"))),
    }
}

fn parse_component_option(text: &str) -> Result<ComponentOption> {
    match text {
        "MeasuredInScan" => Ok(ComponentOption::MeasuredInScan),
        "UserSupplied" => Ok(ComponentOption::UserSupplied),
        other => Err(Error::ConfigurationInvalid(format!("unknown component option '{other}'"))),
    }
}

fn load_dark_rule(node: &XmlNode) -> Result<(Timestamp, Timestamp, DarkSettings)> {
    let valid_from = parse_date_only(&node.required_text("validFrom")?)?;
    let valid_to = parse_date_only(&node.required_text("validTo")?)?;
    let settings = DarkSettings {
        dark_spec_option: parse_dark_spec_option(&node.text_of("darkSpecOption").unwrap_or_else(|| "MeasuredInScan".to_string()))?,
        dark_current_option: parse_component_option(&node.text_of("darkCurrentOption").unwrap_or_else(|| "MeasuredInScan".to_string()))?,
        offset_option: parse_component_option(&node.text_of("offsetOption").unwrap_or_else(|| "MeasuredInScan".to_string()))?,
        user_dark_path: node.text_of("userDarkPath"),
        user_offset_path: node.text_of("userOffsetPath"),
        user_dark_current_path: node.text_of("userDarkCurrentPath"),
    };
    Ok((valid_from, valid_to, settings))
}

/// One instrument's ordered fit windows and dark-correction rules, each with their
/// own validity window (spec §6 bullet 2).
#[derive(Debug, Clone)]
pub struct InstrumentEvaluation {
    pub serial: String,
    pub fit_windows: Vec<FitWindow>,
    pub dark_rules: Vec<(Timestamp, Timestamp, DarkSettings)>,
}

impl InstrumentEvaluation {
    /// The fit window valid at `time`, if any.
    pub fn fit_window_at(&self, time: &Timestamp) -> Option<&FitWindow> {
        self.fit_windows.iter().find(|w| w.is_valid_at(time))
    }

    /// The dark-correction rule valid at `time`, falling back to
    /// [DarkSettings::measured_in_scan] when none matches.
    pub fn dark_settings_at(&self, time: &Timestamp) -> DarkSettings {
        self.dark_rules
            .iter()
            .find(|(from, to, _)| time.is_between(from, to))
            .map(|(_, _, settings)| settings.clone())
            .unwrap_or_else(DarkSettings::measured_in_scan)
    }
}

/// Parses an Evaluation configuration document (spec §6 bullet 2).
pub fn load_evaluation_document<R: Read>(source: R) -> Result<Vec<InstrumentEvaluation>> {
    let root = parse_tree(source)?;
    let document = root.child("Evaluation").unwrap_or(&root);

    document
        .children_named("Instrument")
        .into_iter()
        .map(|instrument| {
            let serial = instrument.required_text("serial")?;
            let fit_windows = instrument
                .children_named("FitWindow")
                .into_iter()
                .map(load_fit_window)
                .collect::<Result<Vec<_>>>()?;
            let dark_rules = instrument
                .children_named("DarkRule")
                .into_iter()
                .map(load_dark_rule)
                .collect::<Result<Vec<_>>>()?;
            Ok(InstrumentEvaluation {
                serial,
                fit_windows,
                dark_rules,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TempPath(std::path::PathBuf);

    impl TempPath {
        fn with_contents(contents: &str) -> Self {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            let id = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!("doas-eval-test-{}-{}.txt", std::process::id(), id));
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
            TempPath(path)
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn write_reference_file() -> TempPath {
        TempPath::with_contents("0.001\n0.002\n0.003\n")
    }

    #[test]
    fn parses_one_instrument_with_one_fit_window_and_reference() {
        let reference_file = write_reference_file();
        let xml = format!(
            r#"
            <Evaluation>
                <Instrument>
                    <serial>I2J1234</serial>
                    <FitWindow>
                        <name>main</name>
                        <validFrom>2000-01-01</validFrom>
                        <validTo>2100-01-01</validTo>
                        <fitLow>464</fitLow>
                        <fitHigh>630</fitHigh>
                        <polynomialOrder>3</polynomialOrder>
                        <fitType>HighPassDivide</fitType>
                        <Reference>
                            <speciesName>SO2</speciesName>
                            <path>{}</path>
                            <shiftOption>Free</shiftOption>
                        </Reference>
                    </FitWindow>
                </Instrument>
            </Evaluation>
            "#,
            reference_file.0.display()
        );
        let instruments = load_evaluation_document(xml.as_bytes()).unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].serial, "I2J1234");
        assert_eq!(instruments[0].fit_windows.len(), 1);
        assert_eq!(instruments[0].fit_windows[0].references[0].species_name, "SO2");
        assert_eq!(instruments[0].fit_windows[0].references[0].cross_section.len(), 3);
    }

    #[test]
    fn missing_fit_window_name_is_rejected() {
        let xml = r#"
            <Evaluation>
                <Instrument>
                    <serial>I2J1234</serial>
                    <FitWindow>
                        <validFrom>2000-01-01</validFrom>
                        <validTo>2100-01-01</validTo>
                        <fitLow>464</fitLow>
                        <fitHigh>630</fitHigh>
                        <fitType>HighPassDivide</fitType>
                    </FitWindow>
                </Instrument>
            </Evaluation>
        "#;
        assert!(load_evaluation_document(xml.as_bytes()).is_err());
    }
}
