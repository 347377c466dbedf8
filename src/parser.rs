//! Source parser contract
//!
//! Every raw format is one variant of the closed `ParserSpec` family. A variant
//! splits its payload into rows of `(field name, cell text)` pairs; the shared
//! `build_record` step turns each row into a `RawRecord` with a local-time basis.
//! No domain normalization happens here: field names stay as the source wrote them.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::csv_parser::{parse_delimited, DelimitedSpec};
use crate::csv_utils::lookup_cell;
use crate::error::{SourceFormatError, TemporalParseError};
use crate::json_parser::{parse_keyed_json, JsonSpec};
use crate::temporal::{parse_date, parse_dst_marker, parse_hour_index, parse_local, parse_zoned};
use crate::transformations::{clean_numeric, is_error_sentinel};
use crate::types::{RawRecord, TimeBasis};
use crate::xml_parser::{parse_tagged_xml, XmlSpec};

/// Raw format of a feed, tagged by `format` in profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParserSpec {
    Delimited(DelimitedSpec),
    TaggedXml(XmlSpec),
    KeyedJson(JsonSpec),
}

impl ParserSpec {
    /// Parse one fetched payload into raw records
    pub fn parse(
        &self,
        raw: &str,
        ctx: &ParseContext,
    ) -> Result<Vec<RawRecord>, SourceFormatError> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match self {
            ParserSpec::Delimited(spec) => parse_delimited(raw, spec, ctx),
            ParserSpec::TaggedXml(spec) => parse_tagged_xml(raw, spec, ctx),
            ParserSpec::KeyedJson(spec) => parse_keyed_json(raw, spec, ctx),
        }
    }
}

/// Where a row's timestamp lives, tagged by `style` in profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum TimeField {
    /// One column holds the whole timestamp
    Single {
        field: String,
        #[serde(default)]
        encoding: TimeEncoding,
        #[serde(default)]
        dst_field: Option<String>,
    },
    /// Separate date and time columns, joined with a space before parsing
    DateTime {
        date_field: String,
        time_field: String,
        #[serde(default = "default_datetime_format")]
        format: String,
        #[serde(default)]
        dst_field: Option<String>,
    },
    /// Hour label on a report date; the date comes from a column or the file
    HourEnding {
        hour_field: String,
        #[serde(default)]
        date_field: Option<String>,
        #[serde(default = "default_date_format")]
        date_format: String,
        #[serde(default)]
        dst_field: Option<String>,
    },
}

/// Encoding of a single timestamp column, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeEncoding {
    /// Text carrying its own UTC offset
    #[default]
    Zoned,
    /// Local wall-clock text, optionally followed by a zone abbreviation
    Local { format: String },
    /// Milliseconds since the Unix epoch
    EpochMillis,
}

fn default_datetime_format() -> String {
    "%Y-%m-%d %H:%M".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl TimeField {
    /// Columns consumed by the time basis, excluded from the value fields
    pub fn columns(&self) -> Vec<&str> {
        let (mut cols, dst) = match self {
            TimeField::Single {
                field, dst_field, ..
            } => (vec![field.as_str()], dst_field),
            TimeField::DateTime {
                date_field,
                time_field,
                dst_field,
                ..
            } => (vec![date_field.as_str(), time_field.as_str()], dst_field),
            TimeField::HourEnding {
                hour_field,
                date_field,
                dst_field,
                ..
            } => {
                let mut cols = vec![hour_field.as_str()];
                cols.extend(date_field.as_deref());
                (cols, dst_field)
            }
        };
        cols.extend(dst.as_deref());
        cols
    }

    /// Text that identifies a row's interval, used to drop duplicate rows
    pub fn key(&self, cells: &[(String, String)]) -> String {
        self.columns()
            .iter()
            .map(|c| lookup_cell(cells, c).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn dst_field(&self) -> Option<&str> {
        match self {
            TimeField::Single { dst_field, .. }
            | TimeField::DateTime { dst_field, .. }
            | TimeField::HourEnding { dst_field, .. } => dst_field.as_deref(),
        }
    }

    /// Build the local-time basis of one row
    ///
    /// # Returns
    ///
    /// * `Ok(Some(basis))` - Row carries a usable timestamp
    /// * `Ok(None)` - Time cell is empty or unreadable (footer, error row)
    /// * `Err(SourceFormatError)` - Time column absent or no file date for hour labels
    pub fn basis(
        &self,
        cells: &[(String, String)],
        ctx: &ParseContext,
    ) -> Result<Option<TimeBasis>, SourceFormatError> {
        let required = |name: &str| {
            lookup_cell(cells, name)
                .map(str::trim)
                .ok_or_else(|| SourceFormatError::MissingField(name.to_string()))
        };
        let flag = self
            .dst_field()
            .and_then(|f| lookup_cell(cells, f))
            .and_then(parse_dst_marker);

        let parsed: Result<TimeBasis, TemporalParseError> = match self {
            TimeField::Single {
                field, encoding, ..
            } => {
                let text = required(field)?;
                if text.is_empty() {
                    return Ok(None);
                }
                match encoding {
                    TimeEncoding::Zoned => {
                        parse_zoned(text).map(|_| TimeBasis::Zoned(text.to_string()))
                    }
                    TimeEncoding::Local { format } => {
                        parse_local(text, format).map(|(naive, marker)| TimeBasis::Local {
                            naive,
                            zone: ctx.zone_name(),
                            dst: marker.or(flag),
                        })
                    }
                    TimeEncoding::EpochMillis => {
                        parse_epoch_millis(text).map(TimeBasis::EpochMillis)
                    }
                }
            }
            TimeField::DateTime {
                date_field,
                time_field,
                format,
                ..
            } => {
                let (date, time) = (required(date_field)?, required(time_field)?);
                if date.is_empty() || time.is_empty() {
                    return Ok(None);
                }
                parse_local(&format!("{} {}", date, time), format).map(|(naive, marker)| {
                    TimeBasis::Local {
                        naive,
                        zone: ctx.zone_name(),
                        dst: marker.or(flag),
                    }
                })
            }
            TimeField::HourEnding {
                hour_field,
                date_field,
                date_format,
                ..
            } => {
                let hour_text = required(hour_field)?;
                if hour_text.is_empty() {
                    return Ok(None);
                }
                let date = match date_field {
                    Some(f) => parse_date(required(f)?, date_format),
                    None => Ok(ctx.file_date.ok_or(SourceFormatError::MissingFileDate)?),
                };
                date.and_then(|date| {
                    parse_hour_index(hour_text).map(|hour| TimeBasis::HourEnding {
                        date,
                        hour,
                        zone: ctx.zone_name(),
                        dst: flag,
                    })
                })
            }
        };

        match parsed {
            Ok(basis) => Ok(Some(basis)),
            Err(e) => {
                warn!(error = %e, "skipping row with unreadable timestamp");
                Ok(None)
            }
        }
    }
}

fn parse_epoch_millis(text: &str) -> Result<i64, TemporalParseError> {
    text.parse::<i64>()
        .ok()
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i64)
        })
        .ok_or_else(|| TemporalParseError::Malformed {
            text: text.to_string(),
            expected: "epoch milliseconds".to_string(),
        })
}

/// Per-unit parsing context supplied by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ParseContext {
    /// Zone the source's local times are written in
    pub zone: Tz,
    /// Report date of the fetched file, for hour labels without a date column
    pub file_date: Option<NaiveDate>,
    /// Report date is a DST transition day
    pub dst_transition: bool,
}

impl ParseContext {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            file_date: None,
            dst_transition: false,
        }
    }

    fn zone_name(&self) -> String {
        self.zone.name().to_string()
    }
}

/// Row-level rules shared by every variant
#[derive(Debug, Clone, Copy)]
pub struct RowRules<'a> {
    pub time: &'a TimeField,
    pub decimal_comma: bool,
    pub error_sentinels: &'a [String],
}

/// Turn one row of `(field, cell)` pairs into a raw record
///
/// Blank rows, rows carrying an error sentinel, and rows whose timestamp
/// cannot be read are skipped (`Ok(None)`).
pub fn build_record(
    cells: Vec<(String, String)>,
    rules: RowRules<'_>,
    ctx: &ParseContext,
) -> Result<Option<RawRecord>, SourceFormatError> {
    if cells.iter().all(|(_, v)| v.trim().is_empty()) {
        return Ok(None);
    }

    if let Some((field, value)) = cells
        .iter()
        .find(|(_, v)| is_error_sentinel(v, rules.error_sentinels))
    {
        debug!(field = %field, value = %value, "dropping row with error sentinel");
        return Ok(None);
    }

    let basis = match rules.time.basis(&cells, ctx)? {
        Some(basis) => basis,
        None => return Ok(None),
    };

    let time_columns = rules.time.columns();
    let fields = cells
        .into_iter()
        .filter(|(name, _)| {
            !time_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(name.as_str()))
        })
        .map(|(name, value)| {
            let cleaned = clean_numeric(&value, rules.decimal_comma);
            (name, cleaned)
        })
        .collect();

    Ok(Some(RawRecord { basis, fields }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DstMarker, RawValue};

    fn cells(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ctx() -> ParseContext {
        ParseContext {
            zone: "America/New_York".parse().unwrap(),
            file_date: NaiveDate::from_ymd_opt(2016, 5, 1),
            dst_transition: false,
        }
    }

    fn hour_ending() -> TimeField {
        TimeField::HourEnding {
            hour_field: "Hour".to_string(),
            date_field: None,
            date_format: default_date_format(),
            dst_field: None,
        }
    }

    #[test]
    fn test_build_record_hour_ending_uses_file_date() {
        let time = hour_ending();
        let rules = RowRules {
            time: &time,
            decimal_comma: false,
            error_sentinels: &[],
        };

        let record = build_record(cells(&[("Hour", "24"), ("WIND", "5")]), rules, &ctx())
            .unwrap()
            .unwrap();

        assert_eq!(
            record.basis,
            TimeBasis::HourEnding {
                date: NaiveDate::from_ymd_opt(2016, 5, 1).unwrap(),
                hour: 24,
                zone: "America/New_York".to_string(),
                dst: None,
            }
        );
        assert_eq!(
            record.fields,
            vec![("WIND".to_string(), RawValue::Number(5.0))]
        );
    }

    #[test]
    fn test_build_record_without_file_date_fails() {
        let time = hour_ending();
        let rules = RowRules {
            time: &time,
            decimal_comma: false,
            error_sentinels: &[],
        };
        let mut ctx = ctx();
        ctx.file_date = None;

        assert_eq!(
            build_record(cells(&[("Hour", "1"), ("WIND", "5")]), rules, &ctx),
            Err(SourceFormatError::MissingFileDate)
        );
    }

    #[test]
    fn test_build_record_skips_sentinel_and_footer_rows() {
        let time = hour_ending();
        let sentinels = vec!["#VALUE!".to_string()];
        let rules = RowRules {
            time: &time,
            decimal_comma: false,
            error_sentinels: &sentinels,
        };

        let sentinel_row = cells(&[("Hour", "3"), ("WIND", "#VALUE!")]);
        assert_eq!(build_record(sentinel_row, rules, &ctx()), Ok(None));

        let footer = cells(&[("Hour", "Total"), ("WIND", "120")]);
        assert_eq!(build_record(footer, rules, &ctx()), Ok(None));

        let blank = cells(&[("Hour", ""), ("WIND", " ")]);
        assert_eq!(build_record(blank, rules, &ctx()), Ok(None));
    }

    #[test]
    fn test_local_time_with_flag_column() {
        let time = TimeField::Single {
            field: "Time".to_string(),
            encoding: TimeEncoding::Local {
                format: "%Y-%m-%d %H:%M".to_string(),
            },
            dst_field: Some("DST".to_string()),
        };

        let basis = time
            .basis(&cells(&[("Time", "2016-11-06 01:30"), ("DST", "N")]), &ctx())
            .unwrap()
            .unwrap();

        match basis {
            TimeBasis::Local { dst, .. } => assert_eq!(dst, Some(DstMarker::Standard)),
            other => panic!("Expected local basis, got {other:?}"),
        }
        assert_eq!(time.columns(), vec!["Time", "DST"]);
    }

    #[test]
    fn test_missing_time_column_is_format_error() {
        let time = TimeField::DateTime {
            date_field: "Date".to_string(),
            time_field: "Time".to_string(),
            format: default_datetime_format(),
            dst_field: None,
        };

        assert_eq!(
            time.basis(&cells(&[("Date", "2016-05-01")]), &ctx()),
            Err(SourceFormatError::MissingField("Time".to_string()))
        );
    }

    #[test]
    fn test_zoned_footer_row_skipped() {
        let time = TimeField::Single {
            field: "Time".to_string(),
            encoding: TimeEncoding::Zoned,
            dst_field: None,
        };
        let rules = RowRules {
            time: &time,
            decimal_comma: false,
            error_sentinels: &[],
        };

        let row = cells(&[("Time", "2016-05-01T01:00:00-05:00"), ("Load", "100")]);
        let record = build_record(row, rules, &ctx()).unwrap().unwrap();
        assert_eq!(
            record.basis,
            TimeBasis::Zoned("2016-05-01T01:00:00-05:00".to_string())
        );

        let footer = cells(&[("Time", "Total"), ("Load", "210")]);
        assert_eq!(build_record(footer, rules, &ctx()), Ok(None));
    }

    #[test]
    fn test_epoch_millis_accepts_float_text() {
        assert_eq!(parse_epoch_millis("1462078800000").unwrap(), 1_462_078_800_000);
        assert_eq!(parse_epoch_millis("1462078800000.0").unwrap(), 1_462_078_800_000);
        assert!(parse_epoch_millis("soon").is_err());
    }

    #[test]
    fn test_empty_payload_parses_to_nothing() {
        let spec = ParserSpec::Delimited(DelimitedSpec::new(hour_ending()));
        assert!(spec.parse("\n\n", &ctx()).unwrap().is_empty());
    }
}
