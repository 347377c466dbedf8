//! Delimited-text source parser
//!
//! Parses tab/comma/semicolon separated reports into raw records using the csv crate.
//!
//! # Layout
//!
//! - **Blocks:** a document holds one or more header + data blocks at known line
//!   offsets (stacked tables). Without explicit blocks the header is the first line.
//! - **Row counts:** a block may declare its number of data rows; fewer rows is a
//!   `SourceFormatError::RowCount`.
//! - **DST transition days:** a block may carry a fixed number of extra rows on the
//!   transition day, which pushes every later block down by the same amount.
//!   Rows repeating an already seen time key are dropped.
//! - **Footer:** everything from the first line starting with the footer marker is ignored.
//!
//! # Examples
//!
//! ```rust
//! use gridnorm::csv_parser::{parse_delimited, DelimitedSpec};
//! use gridnorm::parser::{ParseContext, TimeField};
//!
//! let csv = "Hour,NUCLEAR,WIND\n1,100,10\n2,100,\n";
//! let spec = DelimitedSpec::new(TimeField::HourEnding {
//!     hour_field: "Hour".to_string(),
//!     date_field: None,
//!     date_format: "%Y-%m-%d".to_string(),
//!     dst_field: None,
//! });
//! let mut ctx = ParseContext::new("America/New_York".parse().unwrap());
//! ctx.file_date = chrono::NaiveDate::from_ymd_opt(2016, 5, 1);
//!
//! let records = parse_delimited(csv, &spec, &ctx).unwrap();
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[1].fields[1].1, gridnorm::RawValue::Missing);
//! ```

use std::collections::HashSet;

use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::csv_utils::find_column;
use crate::error::SourceFormatError;
use crate::parser::{build_record, ParseContext, RowRules, TimeField};
use crate::types::RawRecord;

/// Delimited parser settings, `format = "delimited"` in profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DelimitedSpec {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Source writes `1.234,5`
    #[serde(default)]
    pub decimal_comma: bool,
    /// Stacked header/data blocks; empty means one block headed by line 0
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    pub time: TimeField,
    /// Cell values that invalidate the whole row
    #[serde(default)]
    pub error_sentinels: Vec<String>,
    /// Lines starting with this text end the table
    #[serde(default)]
    pub footer_marker: Option<String>,
}

/// One stacked table inside a delimited document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockSpec {
    /// Zero-based line of the header row on a regular day
    pub header_line: usize,
    /// Number of data rows on a regular day
    #[serde(default)]
    pub rows: Option<usize>,
    /// Additional rows this block carries on a DST transition day
    #[serde(default)]
    pub transition_extra_rows: usize,
}

fn default_delimiter() -> char {
    ','
}

impl DelimitedSpec {
    /// Comma-separated, single block, no sentinels
    pub fn new(time: TimeField) -> Self {
        Self {
            delimiter: default_delimiter(),
            decimal_comma: false,
            blocks: Vec::new(),
            time,
            error_sentinels: Vec::new(),
            footer_marker: None,
        }
    }

    fn delimiter_byte(&self) -> Result<u8, SourceFormatError> {
        u8::try_from(self.delimiter).map_err(|_| {
            SourceFormatError::Delimited(format!(
                "delimiter {:?} is not a single byte",
                self.delimiter
            ))
        })
    }
}

// ============================================================================
// Block layout
// ============================================================================

/// Line span `[header, end)` of one block in the document
#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockSpan {
    header: usize,
    end: usize,
    expected_rows: Option<usize>,
}

/// Resolve block positions for this document
///
/// On a transition day every block's extra rows push later blocks down.
fn block_spans(spec: &DelimitedSpec, line_count: usize, dst_transition: bool) -> Vec<BlockSpan> {
    let default_block = [BlockSpec {
        header_line: 0,
        rows: None,
        transition_extra_rows: 0,
    }];
    let blocks: &[BlockSpec] = if spec.blocks.is_empty() {
        &default_block
    } else {
        &spec.blocks
    };

    let mut shift = 0;
    let mut headers = Vec::with_capacity(blocks.len());
    for block in blocks {
        headers.push(block.header_line + shift);
        if dst_transition {
            shift += block.transition_extra_rows;
        }
    }

    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let header = headers[i];
            let extra = if dst_transition {
                block.transition_extra_rows
            } else {
                0
            };
            let expected_rows = block.rows.map(|n| n + extra);
            let end = match expected_rows {
                Some(n) => header + 1 + n,
                None => headers.get(i + 1).copied().unwrap_or(line_count),
            };
            BlockSpan {
                header,
                end: end.max(header + 1).min(line_count),
                expected_rows,
            }
        })
        .collect()
}

// ============================================================================
// Main Parsing Function
// ============================================================================

/// Parse a delimited document into raw records
///
/// # Arguments
///
/// * `text` - Raw document
/// * `spec` - Delimiter, block layout, time columns
/// * `ctx` - Zone and report date of this unit
///
/// # Returns
///
/// * `Ok(Vec<RawRecord>)` - One record per usable data row, in document order
/// * `Err(SourceFormatError)` - Header missing at its expected line, short block,
///   or text the csv reader rejects
pub fn parse_delimited(
    text: &str,
    spec: &DelimitedSpec,
    ctx: &ParseContext,
) -> Result<Vec<RawRecord>, SourceFormatError> {
    let delimiter = spec.delimiter_byte()?;
    let mut lines: Vec<&str> = text.lines().collect();

    if let Some(marker) = spec.footer_marker.as_deref() {
        if let Some(pos) = lines.iter().position(|l| l.trim_start().starts_with(marker)) {
            lines.truncate(pos);
        }
    }

    let required = spec.time.columns();
    let rules = RowRules {
        time: &spec.time,
        decimal_comma: spec.decimal_comma,
        error_sentinels: &spec.error_sentinels,
    };

    let mut records = Vec::new();

    for span in block_spans(spec, lines.len(), ctx.dst_transition) {
        let first_column = required.first().copied().unwrap_or_default();
        if span.header >= lines.len() {
            return Err(SourceFormatError::MissingHeader {
                line: span.header + 1,
                column: first_column.to_string(),
            });
        }

        let segment = lines[span.header..span.end].join("\n");
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(segment.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| SourceFormatError::Delimited(format!("Failed to read header: {}", e)))?
            .clone();

        if let Some(missing) = required.iter().find(|c| find_column(&headers, c).is_none()) {
            return Err(SourceFormatError::MissingHeader {
                line: span.header + 1,
                column: missing.to_string(),
            });
        }

        let mut found = 0;
        let mut seen = HashSet::new();

        for result in reader.records() {
            let row = result
                .map_err(|e| SourceFormatError::Delimited(format!("CSV parse error: {}", e)))?;
            found += 1;

            let cells: Vec<(String, String)> = headers
                .iter()
                .zip(row.iter())
                .filter(|(h, _)| !h.is_empty())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();

            if !seen.insert(spec.time.key(&cells)) {
                debug!(line = span.header + 1 + found, "dropping duplicate time row");
                continue;
            }

            if let Some(record) = build_record(cells, rules, ctx)? {
                records.push(record);
            }
        }

        if let Some(expected) = span.expected_rows {
            if found < expected {
                return Err(SourceFormatError::RowCount {
                    line: span.header + 1,
                    expected,
                    found,
                });
            }
        }
    }

    Ok(records)
}
