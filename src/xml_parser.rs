//! Tagged-report XML source parser
//!
//! One element per observation. Tag names are matched exactly first, then
//! case-insensitively, since report schemas change tag case between versions.
//!
//! Two layouts are supported:
//! - **wide**: each child element of a record is one field (`<COAL>12</COAL>`)
//! - **name/value**: a record names its field in one child and carries the value in
//!   another (`<FUEL>WIND</FUEL><MW>12</MW>`)
//!
//! Attributes of the record element are read as fields too.

use quick_xml::{
    events::{BytesStart, Event},
    name::LocalName,
    Reader,
};
use serde::Deserialize;

use crate::error::SourceFormatError;
use crate::parser::{build_record, ParseContext, RowRules, TimeField};
use crate::types::RawRecord;

/// XML parser settings, `format = "tagged_xml"` in profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct XmlSpec {
    /// Element holding one observation
    pub record_tag: String,
    #[serde(default)]
    pub layout: XmlLayout,
    pub time: TimeField,
    #[serde(default)]
    pub decimal_comma: bool,
    #[serde(default)]
    pub error_sentinels: Vec<String>,
}

/// Field layout inside a record element
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlLayout {
    #[default]
    Wide,
    NameValue { name_tag: String, value_tag: String },
}

fn tag_matches(tag: &str, wanted: &str) -> bool {
    tag == wanted || tag.eq_ignore_ascii_case(wanted)
}

fn local_name_as_str<'a>(name: &'a LocalName<'a>) -> &'a str {
    std::str::from_utf8(name.as_ref()).unwrap_or_default()
}

fn xml_error(e: impl std::fmt::Display) -> SourceFormatError {
    SourceFormatError::Xml(e.to_string())
}

fn attribute_cells(event: &BytesStart) -> Result<Vec<(String, String)>, SourceFormatError> {
    let mut cells = Vec::new();
    for attr in event.attributes().with_checks(false) {
        let attr = attr.map_err(xml_error)?;
        if let Ok(name) = std::str::from_utf8(attr.key.local_name().as_ref()) {
            let value = attr.unescape_value().map_err(xml_error)?;
            cells.push((name.to_string(), value.into_owned()));
        }
    }
    Ok(cells)
}

/// Fold a name/value record into a single `(name, value)` field
fn apply_layout(cells: Vec<(String, String)>, layout: &XmlLayout) -> Vec<(String, String)> {
    let XmlLayout::NameValue {
        name_tag,
        value_tag,
    } = layout
    else {
        return cells;
    };

    let find = |tag: &str| {
        cells
            .iter()
            .find(|(k, _)| tag_matches(k, tag))
            .map(|(_, v)| v.clone())
    };
    let (Some(name), Some(value)) = (find(name_tag), find(value_tag)) else {
        return cells;
    };

    let mut folded: Vec<(String, String)> = cells
        .iter()
        .filter(|(k, _)| !tag_matches(k, name_tag) && !tag_matches(k, value_tag))
        .cloned()
        .collect();
    folded.push((name, value));
    folded
}

/// Parse an XML report into raw records
///
/// # Returns
///
/// * `Ok(Vec<RawRecord>)` - One record per record element with a usable timestamp
/// * `Err(SourceFormatError::MissingElement)` - No record element in the document
/// * `Err(SourceFormatError::Xml)` - Malformed XML
///
/// # Example
///
/// ```
/// # use gridnorm::xml_parser::{parse_tagged_xml, XmlSpec, XmlLayout};
/// # use gridnorm::parser::{ParseContext, TimeField, TimeEncoding};
/// let xml = r#"<report>
///   <Gen><Time>2016-05-01T01:00:00-04:00</Time><Coal>10</Coal><Wind>2</Wind></Gen>
/// </report>"#;
/// let spec = XmlSpec {
///     record_tag: "gen".to_string(),
///     layout: XmlLayout::Wide,
///     time: TimeField::Single {
///         field: "time".to_string(),
///         encoding: TimeEncoding::Zoned,
///         dst_field: None,
///     },
///     decimal_comma: false,
///     error_sentinels: vec![],
/// };
/// let ctx = ParseContext::new("America/New_York".parse().unwrap());
/// let records = parse_tagged_xml(xml, &spec, &ctx).unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].fields.len(), 2);
/// ```
pub fn parse_tagged_xml(
    text: &str,
    spec: &XmlSpec,
    ctx: &ParseContext,
) -> Result<Vec<RawRecord>, SourceFormatError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let rules = RowRules {
        time: &spec.time,
        decimal_comma: spec.decimal_comma,
        error_sentinels: &spec.error_sentinels,
    };

    let mut records = Vec::new();
    let mut record_count = 0;
    let mut current: Option<Vec<(String, String)>> = None;
    let mut active_tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                if current.is_none() {
                    if tag_matches(tag, &spec.record_tag) {
                        current = Some(attribute_cells(e)?);
                    }
                } else {
                    active_tag = Some(tag.to_string());
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                match current.as_mut() {
                    Some(cells) => cells.push((tag.to_string(), String::new())),
                    None if tag_matches(tag, &spec.record_tag) => {
                        record_count += 1;
                        let cells = apply_layout(attribute_cells(e)?, &spec.layout);
                        records.extend(build_record(cells, rules, ctx)?);
                    }
                    None => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(cells), Some(tag)) = (current.as_mut(), active_tag.as_ref()) {
                    let text = e.unescape().map_err(xml_error)?.trim().to_string();
                    cells.push((tag.clone(), text));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                if active_tag.as_deref() == Some(tag) {
                    active_tag = None;
                } else if current.is_some() && tag_matches(tag, &spec.record_tag) {
                    if let Some(cells) = current.take() {
                        record_count += 1;
                        let cells = apply_layout(cells, &spec.layout);
                        records.extend(build_record(cells, rules, ctx)?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    if record_count == 0 {
        return Err(SourceFormatError::MissingElement(spec.record_tag.clone()));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TimeEncoding;
    use crate::types::{RawValue, TimeBasis};

    fn zoned_time(field: &str) -> TimeField {
        TimeField::Single {
            field: field.to_string(),
            encoding: TimeEncoding::Zoned,
            dst_field: None,
        }
    }

    fn spec(layout: XmlLayout) -> XmlSpec {
        XmlSpec {
            record_tag: "INTERVAL".to_string(),
            layout,
            time: zoned_time("TIMESTAMP"),
            decimal_comma: false,
            error_sentinels: vec![],
        }
    }

    fn ctx() -> ParseContext {
        ParseContext::new("America/Los_Angeles".parse().unwrap())
    }

    #[test]
    fn test_wide_layout_case_insensitive_tags() {
        let xml = r#"<?xml version="1.0"?>
<REPORT>
  <interval>
    <timestamp>2016-05-01T07:00:00Z</timestamp>
    <Solar>1,250</Solar>
    <wind>300</wind>
  </interval>
  <INTERVAL>
    <TIMESTAMP>2016-05-01T08:00:00Z</TIMESTAMP>
    <SOLAR>0</SOLAR>
    <WIND/>
  </INTERVAL>
</REPORT>"#;

        let records = parse_tagged_xml(xml, &spec(XmlLayout::Wide), &ctx()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].basis,
            TimeBasis::Zoned("2016-05-01T07:00:00Z".to_string())
        );
        assert_eq!(
            records[0].fields,
            vec![
                ("Solar".to_string(), RawValue::Number(1250.0)),
                ("wind".to_string(), RawValue::Number(300.0)),
            ]
        );
        assert_eq!(records[1].fields[1], ("WIND".to_string(), RawValue::Missing));
    }

    #[test]
    fn test_name_value_layout() {
        let xml = r#"<RESULTS>
  <INTERVAL><TIMESTAMP>2016-05-01T07:00:00Z</TIMESTAMP><FUEL>NATURAL GAS</FUEL><MW>4100</MW></INTERVAL>
  <INTERVAL><TIMESTAMP>2016-05-01T07:00:00Z</TIMESTAMP><FUEL>WIND</FUEL><MW>950.5</MW></INTERVAL>
</RESULTS>"#;
        let layout = XmlLayout::NameValue {
            name_tag: "FUEL".to_string(),
            value_tag: "MW".to_string(),
        };

        let records = parse_tagged_xml(xml, &spec(layout), &ctx()).unwrap();
        assert_eq!(
            records[0].fields,
            vec![("NATURAL GAS".to_string(), RawValue::Number(4100.0))]
        );
        assert_eq!(
            records[1].fields,
            vec![("WIND".to_string(), RawValue::Number(950.5))]
        );
    }

    #[test]
    fn test_attribute_records() {
        let xml = r#"<data><row time="2016-05-01T07:00:00Z" load="21000"/></data>"#;
        let mut spec = spec(XmlLayout::Wide);
        spec.record_tag = "row".to_string();
        spec.time = zoned_time("time");

        let records = parse_tagged_xml(xml, &spec, &ctx()).unwrap();
        assert_eq!(
            records[0].fields,
            vec![("load".to_string(), RawValue::Number(21000.0))]
        );
    }

    #[test]
    fn test_missing_record_element() {
        let xml = "<REPORT><ERROR>No data for requested date</ERROR></REPORT>";
        assert_eq!(
            parse_tagged_xml(xml, &spec(XmlLayout::Wide), &ctx()).unwrap_err(),
            SourceFormatError::MissingElement("INTERVAL".to_string())
        );
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<REPORT><INTERVAL><TIMESTAMP>x</INTERVAL></REPORT>";
        assert!(matches!(
            parse_tagged_xml(xml, &spec(XmlLayout::Wide), &ctx()),
            Err(SourceFormatError::Xml(_))
        ));
    }
}
