//! Error types for gridnorm
//!
//! Covers every failure mode of the normalization pipeline:
//! - Request shape and capability violations (fatal, raised before any fetch)
//! - Raw data shape problems (recovered per fetch unit)
//! - Temporal localization failures (per unit, or per record for DST edge cases)
//! - Incomplete records (recovered per record)
//! - Fetch collaborator and configuration failures

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{DataKind, Market, Mode};

/// Top-level error type for gridnorm
///
/// Supports automatic conversion from the specific error kinds via `From`.
#[derive(Error, Debug)]
pub enum GridError {
    /// Bad request shape or capability violation
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Raw payload did not have the expected structure
    #[error("Source format error: {0}")]
    Format(#[from] SourceFormatError),

    /// Timestamp could not be localized
    #[error("Temporal parse error: {0}")]
    Temporal(#[from] TemporalParseError),

    /// Normalized bucket could not become a canonical record
    #[error("Incomplete record: {0}")]
    Incomplete(#[from] IncompleteRecordError),

    /// Fetch collaborator failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Source profile could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// How the pipeline reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Surface to the caller before any I/O
    Fatal,
    /// Log, drop the fetch unit, continue with the next one
    SkipUnit,
    /// Log, drop the record, continue with the unit
    SkipRecord,
}

impl GridError {
    /// Classify the error for the pipeline's recovery policy
    pub fn recovery(&self) -> Recovery {
        match self {
            GridError::Request(_) | GridError::Config(_) => Recovery::Fatal,
            GridError::Format(_) | GridError::Fetch(_) => Recovery::SkipUnit,
            GridError::Temporal(e) if e.is_record_level() => Recovery::SkipRecord,
            GridError::Temporal(_) => Recovery::SkipUnit,
            GridError::Incomplete(_) => Recovery::SkipRecord,
        }
    }
}

/// Request resolution errors
///
/// All of these are fatal and raised before the fetch collaborator is called.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// `start_at` is after `end_at`
    #[error("Invalid range: start_at ({start}) must be <= end_at ({end})")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Neither `latest`, `yesterday`, nor a complete range was given
    #[error("Missing arguments: expected latest, yesterday, or both start_at and end_at")]
    MissingArguments,

    /// Source declares the operation unsupported
    #[error("Unsupported operation for {ba}: {kind} data in {mode} mode ({market})")]
    UnsupportedOperation {
        ba: String,
        kind: DataKind,
        mode: Mode,
        market: Market,
    },

    /// Source publishes this data with a delay that the request does not respect
    #[error("Data delay for {ba}: {kind} data is only available until {available_until}")]
    DataDelay {
        ba: String,
        kind: DataKind,
        available_until: DateTime<Utc>,
    },
}

/// Raw payload structure errors
///
/// Recovered per unit: the unit is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceFormatError {
    /// Expected header row not found at the configured position
    ///
    /// Example: stacked table whose second header moved after a layout change
    #[error("Missing header at line {line}: expected column '{column}'")]
    MissingHeader { line: usize, column: String },

    /// Required column or element missing from a row
    #[error("Missing required field: '{0}'")]
    MissingField(String),

    /// Block has fewer data rows than declared
    #[error("Expected {expected} data rows in block at line {line}, found {found}")]
    RowCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Document does not contain any record element
    #[error("Missing element: '{0}'")]
    MissingElement(String),

    /// Hour-ending rows without a date column need the unit's file date
    #[error("No file date available for hour-index rows")]
    MissingFileDate,

    /// Delimited text could not be tokenized
    #[error("Delimited format error: {0}")]
    Delimited(String),

    /// XML could not be read
    #[error("XML format error: {0}")]
    Xml(String),

    /// JSON could not be read
    #[error("JSON format error: {0}")]
    Json(String),
}

/// Timestamp localization errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemporalParseError {
    /// Zone name is not a known IANA zone
    #[error("Unknown time zone: '{0}'")]
    UnknownZone(String),

    /// Timestamp text did not match the expected format
    #[error("Malformed timestamp '{text}' (expected {expected})")]
    Malformed { text: String, expected: String },

    /// Local time repeats (DST fall-back) and no DST marker disambiguates it
    #[error("Ambiguous local time {local} in {zone}")]
    AmbiguousLocalTime { local: String, zone: String },

    /// Local time falls in the DST spring-forward gap
    #[error("Nonexistent local time {local} in {zone}")]
    NonexistentLocalTime { local: String, zone: String },

    /// Hour index outside 0..=24
    #[error("Hour index {0} out of range (expected 0..=24)")]
    HourOutOfRange(u32),
}

impl TemporalParseError {
    /// Whether only the offending record is dropped rather than the whole unit
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            TemporalParseError::AmbiguousLocalTime { .. }
                | TemporalParseError::NonexistentLocalTime { .. }
                | TemporalParseError::HourOutOfRange(_)
        )
    }
}

/// Record completeness errors
///
/// Recovered per record: the record is dropped with a warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IncompleteRecordError {
    /// A contributing raw value was missing or not numeric
    #[error("No numeric value for {category} at {timestamp}")]
    MissingValue {
        timestamp: DateTime<Utc>,
        category: String,
    },

    /// Generation record without a fuel category
    #[error("Generation record at {timestamp} has no fuel_name ({category})")]
    MissingFuel {
        timestamp: DateTime<Utc>,
        category: String,
    },

    /// Category does not belong to the requested data kind
    #[error("Category {category} at {timestamp} is not {kind} data")]
    KindMismatch {
        timestamp: DateTime<Utc>,
        category: String,
        kind: DataKind,
    },
}

/// Fetch collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport failed (connection, DNS, timeout)
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Source profile loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Profile file could not be read
    #[error("Failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    /// Profile is not valid TOML for a source profile
    #[error("Invalid profile: {0}")]
    Toml(#[from] toml::de::Error),

    /// Profile is well-formed but inconsistent
    #[error("Invalid profile: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_error_conversion() {
        let err: GridError = RequestError::MissingArguments.into();

        match err {
            GridError::Request(RequestError::MissingArguments) => {}
            _ => panic!("Expected Request error"),
        }
        assert_eq!(err_recovery(RequestError::MissingArguments.into()), Recovery::Fatal);
    }

    fn err_recovery(err: GridError) -> Recovery {
        err.recovery()
    }

    #[test]
    fn test_recovery_classification() {
        assert_eq!(
            err_recovery(SourceFormatError::MissingFileDate.into()),
            Recovery::SkipUnit
        );
        assert_eq!(
            err_recovery(TemporalParseError::UnknownZone("Mars/Olympus".into()).into()),
            Recovery::SkipUnit
        );
        assert_eq!(
            err_recovery(TemporalParseError::HourOutOfRange(25).into()),
            Recovery::SkipRecord
        );
        assert_eq!(
            err_recovery(
                FetchError::Status {
                    url: "http://x".into(),
                    status: 500
                }
                .into()
            ),
            Recovery::SkipUnit
        );
        assert_eq!(
            err_recovery(ConfigError::Invalid("x".into()).into()),
            Recovery::Fatal
        );
    }

    #[test]
    fn test_error_display_formatting() {
        let start = Utc.with_ymd_and_hms(2016, 5, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2016, 5, 1, 0, 0, 0).unwrap();
        let msg = RequestError::InvalidRange { start, end }.to_string();
        assert!(msg.contains("Invalid range"));
        assert!(msg.contains("2016-05-02"));

        let msg = SourceFormatError::RowCount {
            line: 3,
            expected: 24,
            found: 20,
        }
        .to_string();
        assert!(msg.contains("24"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_temporal_record_level() {
        assert!(TemporalParseError::AmbiguousLocalTime {
            local: "2016-11-06 01:30".into(),
            zone: "America/New_York".into()
        }
        .is_record_level());
        assert!(!TemporalParseError::Malformed {
            text: "x".into(),
            expected: "%Y".into()
        }
        .is_record_level());
    }
}
