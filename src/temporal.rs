//! Temporal normalizer
//!
//! Converts operator-local timestamps into UTC instants:
//! - Local naive timestamps in an IANA zone, with optional "EDT"/"EST" style markers
//! - Hour-ending indices (1..=24) on a report date, including the hour-24 rollover
//! - Timestamps that already carry an offset, and epoch milliseconds
//! - The inverse lookup `report_file_for`: which daily report contains an instant
//!
//! Zones are always explicit. Nothing here reads the system clock or a locale default.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

use crate::error::TemporalParseError;
use crate::types::{DstMarker, NormalizedRecord, RawRecord, TimeBasis};

/// How a source labels its hourly intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HourConvention {
    /// Label N denotes the interval ending at local N:00 (1..=24)
    #[default]
    Ending,
    /// Label N denotes the interval starting at local N:00 (0..=23)
    Starting,
}

// ============================================================================
// Zones and markers
// ============================================================================

/// Parse an IANA zone name
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::parse_zone;
/// assert!(parse_zone("America/New_York").is_ok());
/// assert!(parse_zone("Eastern").is_err());
/// ```
pub fn parse_zone(name: &str) -> Result<Tz, TemporalParseError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TemporalParseError::UnknownZone(name.to_string()))
}

/// Interpret a zone abbreviation or flag value as a DST marker
///
/// Accepts abbreviations (`EDT`, `CST`, `CEST`, ...) and flag columns
/// (`Y`/`N`, `D`/`S`, `1`/`0`, `true`/`false`). Returns `None` for anything else.
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::parse_dst_marker;
/// # use gridnorm::DstMarker;
/// assert_eq!(parse_dst_marker("EDT"), Some(DstMarker::Daylight));
/// assert_eq!(parse_dst_marker("est"), Some(DstMarker::Standard));
/// assert_eq!(parse_dst_marker("N"), Some(DstMarker::Standard));
/// assert_eq!(parse_dst_marker("Hour"), None);
/// ```
pub fn parse_dst_marker(value: &str) -> Option<DstMarker> {
    match value.trim().to_uppercase().as_str() {
        "EDT" | "CDT" | "MDT" | "PDT" | "ADT" | "AKDT" | "HDT" | "BST" | "CEST" | "EEST"
        | "WEST" | "Y" | "D" | "1" | "TRUE" | "DST" => Some(DstMarker::Daylight),
        "EST" | "CST" | "MST" | "PST" | "AST" | "AKST" | "HST" | "GMT" | "CET" | "EET"
        | "WET" | "N" | "S" | "0" | "FALSE" | "STD" => Some(DstMarker::Standard),
        _ => None,
    }
}

// ============================================================================
// Forward mapping: local → UTC
// ============================================================================

/// Resolve a local wall-clock time to UTC
///
/// # Arguments
///
/// * `naive` - Local wall-clock time
/// * `tz` - Zone the wall clock belongs to
/// * `dst` - Marker from the source, used only when the time is ambiguous
///
/// # Returns
///
/// * `Ok(DateTime<Utc>)` - Unique instant
/// * `Err(AmbiguousLocalTime)` - Repeated fall-back hour without a marker
/// * `Err(NonexistentLocalTime)` - Spring-forward gap
pub fn localize(
    naive: NaiveDateTime,
    tz: Tz,
    dst: Option<DstMarker>,
) -> Result<DateTime<Utc>, TemporalParseError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, later) => match dst {
            // daylight time is the first pass through the repeated hour
            Some(DstMarker::Daylight) => Ok(earlier.with_timezone(&Utc)),
            Some(DstMarker::Standard) => Ok(later.with_timezone(&Utc)),
            None => Err(TemporalParseError::AmbiguousLocalTime {
                local: naive.to_string(),
                zone: tz.name().to_string(),
            }),
        },
        LocalResult::None => Err(TemporalParseError::NonexistentLocalTime {
            local: naive.to_string(),
            zone: tz.name().to_string(),
        }),
    }
}

/// Resolve an hour-ending index on a report date to UTC
///
/// Hour N is stamped at local `date + N:00`, so hour 24 of day D is the same
/// instant as hour 0 of day D+1.
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::hour_ending_to_utc;
/// # use chrono::{NaiveDate, TimeZone, Utc};
/// let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
/// let d = NaiveDate::from_ymd_opt(2016, 5, 1).unwrap();
/// let h24 = hour_ending_to_utc(d, 24, tz, None).unwrap();
/// let h0_next = hour_ending_to_utc(d.succ_opt().unwrap(), 0, tz, None).unwrap();
/// assert_eq!(h24, h0_next);
/// assert_eq!(h24, Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap());
/// ```
pub fn hour_ending_to_utc(
    date: NaiveDate,
    hour: u32,
    tz: Tz,
    dst: Option<DstMarker>,
) -> Result<DateTime<Utc>, TemporalParseError> {
    if hour > 24 {
        return Err(TemporalParseError::HourOutOfRange(hour));
    }

    let naive = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour));
    localize(naive, tz, dst)
}

/// Convert any time basis to a UTC instant
///
/// Never defaults a zone: unknown zone names and malformed text are errors.
pub fn localize_and_convert(basis: &TimeBasis) -> Result<DateTime<Utc>, TemporalParseError> {
    match basis {
        TimeBasis::Local { naive, zone, dst } => localize(*naive, parse_zone(zone)?, *dst),
        TimeBasis::HourEnding {
            date,
            hour,
            zone,
            dst,
        } => hour_ending_to_utc(*date, *hour, parse_zone(zone)?, *dst),
        TimeBasis::Zoned(text) => parse_zoned(text),
        TimeBasis::EpochMillis(ms) => {
            DateTime::from_timestamp_millis(*ms).ok_or_else(|| TemporalParseError::Malformed {
                text: ms.to_string(),
                expected: "epoch milliseconds".to_string(),
            })
        }
    }
}

/// Express a UTC instant as local wall-clock time
pub fn to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}

// ============================================================================
// Inverse mapping and day arithmetic
// ============================================================================

/// Date of the daily report that contains an instant
///
/// Under the hour-ending convention an instant at exactly local midnight is hour 24
/// of the previous day, so the previous day's report is returned.
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::{report_file_for, HourConvention};
/// # use chrono::{NaiveDate, TimeZone, Utc};
/// let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
/// let midnight = Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap();
/// assert_eq!(
///     report_file_for(midnight, tz, HourConvention::Ending),
///     NaiveDate::from_ymd_opt(2016, 5, 1).unwrap()
/// );
/// assert_eq!(
///     report_file_for(midnight, tz, HourConvention::Starting),
///     NaiveDate::from_ymd_opt(2016, 5, 2).unwrap()
/// );
/// ```
pub fn report_file_for(instant: DateTime<Utc>, tz: Tz, convention: HourConvention) -> NaiveDate {
    let local = to_local(instant, tz);
    let date = local.date();

    match convention {
        HourConvention::Ending if local.time() == NaiveTime::MIN => {
            date.pred_opt().unwrap_or(date)
        }
        _ => date,
    }
}

/// UTC instant at which a local day starts
///
/// Zones that skip midnight start the day at the first existing local time.
pub fn start_of_local_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=3)
        .find_map(|h| {
            tz.from_local_datetime(&(midnight + Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// UTC bounds `[start, end)` of a local day
pub fn day_bounds_utc(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (start_of_local_day(date, tz), start_of_local_day(next, tz))
}

/// Whether a local day is a DST transition day (23 or 25 hours long)
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::is_transition_day;
/// # use chrono::NaiveDate;
/// let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
/// assert!(is_transition_day(NaiveDate::from_ymd_opt(2016, 3, 13).unwrap(), tz));
/// assert!(is_transition_day(NaiveDate::from_ymd_opt(2016, 11, 6).unwrap(), tz));
/// assert!(!is_transition_day(NaiveDate::from_ymd_opt(2016, 5, 1).unwrap(), tz));
/// ```
pub fn is_transition_day(date: NaiveDate, tz: Tz) -> bool {
    let (start, end) = day_bounds_utc(date, tz);
    end - start != Duration::hours(24)
}

// ============================================================================
// Text parsing
// ============================================================================

/// Parse a local timestamp, splitting off a trailing zone abbreviation
///
/// Date-only formats resolve to local midnight.
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::parse_local;
/// # use gridnorm::DstMarker;
/// let (naive, dst) = parse_local("11/06/2016 01:30 EST", "%m/%d/%Y %H:%M").unwrap();
/// assert_eq!(naive.to_string(), "2016-11-06 01:30:00");
/// assert_eq!(dst, Some(DstMarker::Standard));
/// ```
pub fn parse_local(
    text: &str,
    format: &str,
) -> Result<(NaiveDateTime, Option<DstMarker>), TemporalParseError> {
    let trimmed = text.trim();
    let (body, dst) = match trimmed.rsplit_once(char::is_whitespace) {
        Some((head, tail)) => match parse_dst_marker(tail) {
            Some(marker) if tail.chars().all(|c| c.is_ascii_alphabetic()) => {
                (head.trim_end(), Some(marker))
            }
            _ => (trimmed, None),
        },
        None => (trimmed, None),
    };

    let naive = NaiveDateTime::parse_from_str(body, format)
        .or_else(|_| NaiveDate::parse_from_str(body, format).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| TemporalParseError::Malformed {
            text: text.to_string(),
            expected: format.to_string(),
        })?;

    Ok((naive, dst))
}

/// Parse a report date
pub fn parse_date(text: &str, format: &str) -> Result<NaiveDate, TemporalParseError> {
    NaiveDate::parse_from_str(text.trim(), format).map_err(|_| TemporalParseError::Malformed {
        text: text.to_string(),
        expected: format.to_string(),
    })
}

/// Parse an hour label such as `"24"`, `"HE 07"`, or `"03*"`
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::parse_hour_index;
/// assert_eq!(parse_hour_index("24").unwrap(), 24);
/// assert_eq!(parse_hour_index("HE 07").unwrap(), 7);
/// assert!(parse_hour_index("Total").is_err());
/// ```
pub fn parse_hour_index(text: &str) -> Result<u32, TemporalParseError> {
    let digits: String = text
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits.parse::<u32>().map_err(|_| TemporalParseError::Malformed {
        text: text.to_string(),
        expected: "hour index".to_string(),
    })
}

/// Parse a timestamp that carries its own offset and express it in UTC
///
/// Accepts RFC 3339, offsets without a colon, and the compact `20160501T05Z` form.
///
/// # Examples
///
/// ```
/// # use gridnorm::temporal::parse_zoned;
/// # use chrono::{TimeZone, Utc};
/// let expected = Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap();
/// assert_eq!(parse_zoned("2016-05-01T01:00:00-04:00").unwrap(), expected);
/// assert_eq!(parse_zoned("2016-05-01 01:00:00-0400").unwrap(), expected);
/// assert_eq!(parse_zoned("20160501T05Z").unwrap(), expected);
/// ```
pub fn parse_zoned(text: &str) -> Result<DateTime<Utc>, TemporalParseError> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    const OFFSET_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%d %H:%M%z",
    ];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    if let Some(body) = trimmed.strip_suffix('Z') {
        let padded = format!("{}00", body);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&padded, "%Y%m%dT%H%M") {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TemporalParseError::Malformed {
        text: text.to_string(),
        expected: "timestamp with UTC offset".to_string(),
    })
}

// ============================================================================
// Unit-level normalization
// ============================================================================

/// Localize every record of one fetch unit
///
/// Record-level failures (ambiguous or nonexistent local time, bad hour index)
/// drop the record with a warning. Any other failure aborts the unit.
pub fn normalize_unit(
    records: Vec<RawRecord>,
) -> Result<Vec<NormalizedRecord>, TemporalParseError> {
    let mut normalized = Vec::with_capacity(records.len());

    for record in records {
        match localize_and_convert(&record.basis) {
            Ok(timestamp) => normalized.push(NormalizedRecord {
                timestamp,
                fields: record.fields,
            }),
            Err(e) if e.is_record_level() => {
                warn!(error = %e, "dropping record with unresolvable local time");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawValue;

    fn ny() -> Tz {
        parse_zone("America/New_York").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_trip_through_year() {
        let tz = ny();
        let mut local = date(2016, 1, 1).and_time(NaiveTime::MIN);
        let end = date(2017, 1, 1).and_time(NaiveTime::MIN);

        while local < end {
            match localize(local, tz, None) {
                Ok(utc) => assert_eq!(to_local(utc, tz), local),
                Err(e) => assert!(e.is_record_level(), "unexpected {e}"),
            }
            local += Duration::minutes(30);
        }
    }

    #[test]
    fn test_hour_ending_24_rolls_over() {
        let tz = ny();
        let d = date(2016, 5, 1);
        let h24 = hour_ending_to_utc(d, 24, tz, None).unwrap();

        assert_eq!(h24, hour_ending_to_utc(d.succ_opt().unwrap(), 0, tz, None).unwrap());
        assert_eq!(h24, Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap());
        assert_eq!(report_file_for(h24, tz, HourConvention::Ending), d);
    }

    #[test]
    fn test_hour_ending_first_hour() {
        let h1 = hour_ending_to_utc(date(2016, 5, 1), 1, ny(), None).unwrap();
        assert_eq!(h1, Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap());
        assert_eq!(report_file_for(h1, ny(), HourConvention::Ending), date(2016, 5, 1));
    }

    #[test]
    fn test_hour_out_of_range() {
        let err = hour_ending_to_utc(date(2016, 5, 1), 25, ny(), None).unwrap_err();
        assert_eq!(err, TemporalParseError::HourOutOfRange(25));
        assert!(err.is_record_level());
    }

    #[test]
    fn test_ambiguous_time_uses_marker() {
        let tz = ny();
        let naive = date(2016, 11, 6).and_hms_opt(1, 30, 0).unwrap();

        let daylight = localize(naive, tz, Some(DstMarker::Daylight)).unwrap();
        let standard = localize(naive, tz, Some(DstMarker::Standard)).unwrap();
        assert_eq!(daylight, Utc.with_ymd_and_hms(2016, 11, 6, 5, 30, 0).unwrap());
        assert_eq!(standard, Utc.with_ymd_and_hms(2016, 11, 6, 6, 30, 0).unwrap());

        assert!(matches!(
            localize(naive, tz, None),
            Err(TemporalParseError::AmbiguousLocalTime { .. })
        ));
    }

    #[test]
    fn test_spring_forward_gap() {
        let naive = date(2016, 3, 13).and_hms_opt(2, 30, 0).unwrap();
        assert!(matches!(
            localize(naive, ny(), None),
            Err(TemporalParseError::NonexistentLocalTime { .. })
        ));
    }

    #[test]
    fn test_unknown_zone_never_defaults() {
        let basis = TimeBasis::Local {
            naive: date(2016, 5, 1).and_hms_opt(1, 0, 0).unwrap(),
            zone: "US/Nowhere".to_string(),
            dst: None,
        };
        assert_eq!(
            localize_and_convert(&basis).unwrap_err(),
            TemporalParseError::UnknownZone("US/Nowhere".to_string())
        );
    }

    #[test]
    fn test_epoch_millis() {
        let basis = TimeBasis::EpochMillis(1_462_078_800_000);
        assert_eq!(
            localize_and_convert(&basis).unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_day_bounds_on_transition_days() {
        let tz = ny();
        let (start, end) = day_bounds_utc(date(2016, 3, 13), tz);
        assert_eq!(end - start, Duration::hours(23));

        let (start, end) = day_bounds_utc(date(2016, 11, 6), tz);
        assert_eq!(end - start, Duration::hours(25));
        assert_eq!(start, Utc.with_ymd_and_hms(2016, 11, 6, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_local_without_marker() {
        let (naive, dst) = parse_local("2016-05-01 13:05", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(naive, date(2016, 5, 1).and_hms_opt(13, 5, 0).unwrap());
        assert_eq!(dst, None);

        let (naive, _) = parse_local("05/01/2016", "%m/%d/%Y").unwrap();
        assert_eq!(naive, date(2016, 5, 1).and_time(NaiveTime::MIN));

        assert!(parse_local("yesterday", "%Y-%m-%d").is_err());
    }

    #[test]
    fn test_parse_zoned_rejects_naive() {
        assert!(parse_zoned("2016-05-01 01:00:00").is_err());
    }

    #[test]
    fn test_normalize_unit_drops_record_level_failures() {
        let zone = "America/New_York".to_string();
        let records = vec![
            RawRecord {
                basis: TimeBasis::HourEnding {
                    date: date(2016, 5, 1),
                    hour: 1,
                    zone: zone.clone(),
                    dst: None,
                },
                fields: vec![("WIND".to_string(), RawValue::Number(1.0))],
            },
            RawRecord {
                basis: TimeBasis::HourEnding {
                    date: date(2016, 5, 1),
                    hour: 30,
                    zone: zone.clone(),
                    dst: None,
                },
                fields: vec![],
            },
        ];

        let normalized = normalize_unit(records).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(
            normalized[0].timestamp,
            Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_unit_fails_on_unit_level_error() {
        let records = vec![RawRecord {
            basis: TimeBasis::Zoned("not a time".to_string()),
            fields: vec![],
        }];
        assert!(normalize_unit(records).is_err());
    }
}
