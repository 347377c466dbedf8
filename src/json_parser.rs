//! Keyed JSON series parser
//!
//! Two payload shapes are supported, both located by a JSON pointer:
//! - **rows**: an array of flat objects, one per interval
//!   (`[{"time": "...", "wind": 10}, ...]`)
//! - **series**: an object keyed by field name, each value a list of
//!   `[time, value]` pairs (`{"wind": [["20160501T05Z", 10], ...]}`); pairs sharing a
//!   time are joined into one row
//!
//! # Features
//!
//! - **Scalars only**: numbers and strings become cell text, `null` an empty cell
//! - **Error handling**: a missing pointer target is a `SourceFormatError::MissingElement`

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SourceFormatError;
use crate::parser::{build_record, ParseContext, RowRules, TimeField};
use crate::types::RawRecord;

/// JSON parser settings, `format = "keyed_json"` in profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonSpec {
    /// JSON pointer to the data; empty selects the document root
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub layout: JsonLayout,
    pub time: TimeField,
    #[serde(default)]
    pub decimal_comma: bool,
    #[serde(default)]
    pub error_sentinels: Vec<String>,
}

/// Shape of the selected JSON value
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonLayout {
    #[default]
    Rows,
    Series,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_cells(row: &Value) -> Result<Vec<(String, String)>, SourceFormatError> {
    let object = row
        .as_object()
        .ok_or_else(|| SourceFormatError::Json(format!("expected object row, found {}", row)))?;

    Ok(object
        .iter()
        .map(|(k, v)| (k.clone(), cell_text(v)))
        .collect())
}

/// Join `[time, value]` series into rows keyed by time text, in first-seen order
fn series_rows(
    series: &serde_json::Map<String, Value>,
    time_column: &str,
) -> Result<Vec<Vec<(String, String)>>, SourceFormatError> {
    let mut rows: Vec<Vec<(String, String)>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (field, points) in series {
        let points = points.as_array().ok_or_else(|| {
            SourceFormatError::Json(format!("series '{}' is not an array", field))
        })?;

        for point in points {
            let (time, value) = match point.as_array().map(Vec::as_slice) {
                Some([time, value, ..]) => (cell_text(time), cell_text(value)),
                _ => {
                    return Err(SourceFormatError::Json(format!(
                        "series '{}' point {} is not a [time, value] pair",
                        field, point
                    )))
                }
            };

            let slot = *index.entry(time.clone()).or_insert_with(|| {
                rows.push(vec![(time_column.to_string(), time)]);
                rows.len() - 1
            });
            rows[slot].push((field.clone(), value));
        }
    }

    Ok(rows)
}

/// Parse a JSON payload into raw records
///
/// # Example
///
/// ```
/// # use gridnorm::json_parser::{parse_keyed_json, JsonSpec, JsonLayout};
/// # use gridnorm::parser::{ParseContext, TimeField, TimeEncoding};
/// let json = r#"{"data": [{"ts": 1462078800000, "load": 15234.5}]}"#;
/// let spec = JsonSpec {
///     path: "/data".to_string(),
///     layout: JsonLayout::Rows,
///     time: TimeField::Single {
///         field: "ts".to_string(),
///         encoding: TimeEncoding::EpochMillis,
///         dst_field: None,
///     },
///     decimal_comma: false,
///     error_sentinels: vec![],
/// };
/// let ctx = ParseContext::new("America/Chicago".parse().unwrap());
/// let records = parse_keyed_json(json, &spec, &ctx).unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub fn parse_keyed_json(
    text: &str,
    spec: &JsonSpec,
    ctx: &ParseContext,
) -> Result<Vec<RawRecord>, SourceFormatError> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| SourceFormatError::Json(e.to_string()))?;

    let selected = document
        .pointer(&spec.path)
        .ok_or_else(|| SourceFormatError::MissingElement(spec.path.clone()))?;

    let rows = match spec.layout {
        JsonLayout::Rows => selected
            .as_array()
            .ok_or_else(|| {
                SourceFormatError::Json(format!("expected array at '{}'", spec.path))
            })?
            .iter()
            .map(row_cells)
            .collect::<Result<Vec<_>, _>>()?,
        JsonLayout::Series => {
            let series = selected.as_object().ok_or_else(|| {
                SourceFormatError::Json(format!("expected object at '{}'", spec.path))
            })?;
            let time_column = spec.time.columns().first().copied().unwrap_or("time");
            series_rows(series, time_column)?
        }
    };

    let rules = RowRules {
        time: &spec.time,
        decimal_comma: spec.decimal_comma,
        error_sentinels: &spec.error_sentinels,
    };

    let mut records = Vec::with_capacity(rows.len());
    for cells in rows {
        records.extend(build_record(cells, rules, ctx)?);
    }

    Ok(records)
}
