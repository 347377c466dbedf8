//! Fetch-unit planning
//!
//! Splits a resolved request into the units a source publishes: one file per
//! report day, one per calendar year, or a single range request.
//!
//! # Routing Logic
//!
//! - **Latest**: the feed's `latest_url` if it has one; otherwise the previous and
//!   current report day (daily), the current year (yearly), or the last 24 hours (single)
//! - **Historical / forecast**: every report day between `report_file_for(start)` and
//!   `report_file_for(end)`, so an hour-ending source never fetches the next day's file
//!   just for its midnight value
//!
//! # Example
//!
//! ```rust
//! use gridnorm::query_router::build_url;
//!
//! let url = build_url(
//!     "https://example.org/{market}/{date}.csv",
//!     &[("market", "RTHR".to_string()), ("date", "20160501".to_string())],
//! );
//! assert_eq!(url, "https://example.org/RTHR/20160501.csv");
//! ```

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::config::{Bucketing, FeedSource, SourceProfile};
use crate::temporal::report_file_for;
use crate::types::{Mode, RequestContext};

// ============================================================================
// Data Structures
// ============================================================================

/// Period covered by one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSpan {
    /// Dedicated snapshot endpoint
    Latest,
    /// One daily report
    Day(NaiveDate),
    /// One yearly file
    Year(i32),
    /// One request for an arbitrary UTC range
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// One planned fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUnit {
    pub span: UnitSpan,
    pub url: String,
}

impl FetchUnit {
    /// Report date for parsers that read hour labels without a date column
    pub fn file_date(&self) -> Option<NaiveDate> {
        match self.span {
            UnitSpan::Day(date) => Some(date),
            _ => None,
        }
    }
}

// ============================================================================
// URL rendering
// ============================================================================

/// Substitute `{name}` placeholders in a URL template
///
/// Unknown placeholders are left as they are.
pub fn build_url(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |url, (name, value)| {
        url.replace(&format!("{{{}}}", name), value)
    })
}

/// Whether a chrono format string contains only valid items
///
/// # Examples
///
/// ```
/// # use gridnorm::query_router::is_valid_format;
/// assert!(is_valid_format("%Y%m%d"));
/// assert!(!is_valid_format("%Y%Q"));
/// ```
pub fn is_valid_format(format: &str) -> bool {
    StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

fn render(source: &FeedSource, ctx: &RequestContext, span: UnitSpan) -> String {
    let fmt = source.date_format.as_str();
    let mut values = vec![("market", ctx.market.code().to_string())];

    match span {
        UnitSpan::Day(date) => {
            values.push(("date", date.format(fmt).to_string()));
            values.push(("year", date.year().to_string()));
        }
        UnitSpan::Year(year) => {
            values.push(("year", year.to_string()));
            if let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1) {
                values.push(("date", first.format(fmt).to_string()));
            }
        }
        UnitSpan::Range { start, end } => {
            values.push(("start", start.format(fmt).to_string()));
            values.push(("end", end.format(fmt).to_string()));
        }
        UnitSpan::Latest => {}
    }

    let template = match (span, source.latest_url.as_deref()) {
        (UnitSpan::Latest, Some(latest)) => latest,
        _ => source.url.as_str(),
    };
    build_url(template, &values)
}

// ============================================================================
// Planning
// ============================================================================

/// Plan the fetch units for a resolved request
///
/// # Arguments
///
/// * `ctx` - Resolved request context
/// * `profile` - Source profile (zone and hour convention)
/// * `source` - Feed being fetched
///
/// # Returns
///
/// Units in chronological order. A unit whose span holds no data for the
/// request is still planned; the assembler filters the records.
pub fn plan_units(
    ctx: &RequestContext,
    profile: &SourceProfile,
    source: &FeedSource,
) -> Vec<FetchUnit> {
    let tz = profile.timezone;
    let convention = profile.hour_convention;

    let spans: Vec<UnitSpan> = match (ctx.mode, ctx.range) {
        (Mode::Latest, _) | (_, None) => {
            if source.latest_url.is_some() {
                vec![UnitSpan::Latest]
            } else {
                let current = report_file_for(ctx.now, tz, convention);
                match source.bucketing {
                    Bucketing::Daily => current
                        .pred_opt()
                        .into_iter()
                        .chain(std::iter::once(current))
                        .map(UnitSpan::Day)
                        .collect(),
                    Bucketing::Yearly if current.ordinal() == 1 => {
                        vec![UnitSpan::Year(current.year() - 1), UnitSpan::Year(current.year())]
                    }
                    Bucketing::Yearly => vec![UnitSpan::Year(current.year())],
                    Bucketing::Single => vec![UnitSpan::Range {
                        start: ctx.now - Duration::days(1),
                        end: ctx.now,
                    }],
                }
            }
        }
        (_, Some(range)) => {
            let last_instant = if range.is_closed() {
                range.end()
            } else {
                range.end() - Duration::seconds(1)
            }
            .max(range.start());
            let first = report_file_for(range.start(), tz, convention);
            let last = report_file_for(last_instant, tz, convention);

            match source.bucketing {
                Bucketing::Daily => first
                    .iter_days()
                    .take_while(|d| *d <= last)
                    .map(UnitSpan::Day)
                    .collect(),
                Bucketing::Yearly => (first.year()..=last.year()).map(UnitSpan::Year).collect(),
                Bucketing::Single => vec![UnitSpan::Range {
                    start: range.start(),
                    end: range.end(),
                }],
            }
        }
    };

    spans
        .into_iter()
        .map(|span| FetchUnit {
            span,
            url: render(source, ctx, span),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParserSpec, TimeField};
    use crate::csv_parser::DelimitedSpec;
    use crate::temporal::HourConvention;
    use crate::types::{DataKind, Freq, Market, TimeRange};
    use chrono::TimeZone;

    fn profile(convention: HourConvention) -> SourceProfile {
        let mut profile = SourceProfile::from_toml_str(
            r#"
ba_name = "NYISO"
timezone = "America/New_York"
"#,
        )
        .unwrap();
        profile.hour_convention = convention;
        profile
    }

    fn source(url: &str, bucketing: Bucketing) -> FeedSource {
        FeedSource {
            url: url.to_string(),
            latest_url: None,
            date_format: "%Y%m%d".to_string(),
            bucketing,
            parser: ParserSpec::Delimited(DelimitedSpec::new(TimeField::Single {
                field: "Time".to_string(),
                encoding: Default::default(),
                dst_field: None,
            })),
        }
    }

    fn ctx(mode: Mode, range: Option<TimeRange>) -> RequestContext {
        RequestContext {
            kind: DataKind::Generation,
            mode,
            range,
            market: Market::RealTimeHourly,
            freq: Freq::Hourly,
            now: Utc.with_ymd_and_hms(2016, 5, 10, 15, 0, 0).unwrap(),
        }
    }

    fn urls(units: &[FetchUnit]) -> Vec<&str> {
        units.iter().map(|u| u.url.as_str()).collect()
    }

    #[test]
    fn test_daily_range_hour_ending_skips_next_day() {
        // local 2016-05-01 01:00 through 2016-05-02 00:00 (hour 24 of May 1)
        let range = TimeRange::closed(
            Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap(),
        );
        let units = plan_units(
            &ctx(Mode::Historical, range),
            &profile(HourConvention::Ending),
            &source("http://x/{date}_{market}.csv", Bucketing::Daily),
        );

        assert_eq!(urls(&units), vec!["http://x/20160501_RTHR.csv"]);
        assert_eq!(units[0].file_date(), NaiveDate::from_ymd_opt(2016, 5, 1));
    }

    #[test]
    fn test_daily_range_hour_starting_includes_next_day() {
        let range = TimeRange::closed(
            Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap(),
        );
        let units = plan_units(
            &ctx(Mode::Historical, range),
            &profile(HourConvention::Starting),
            &source("http://x/{date}.csv", Bucketing::Daily),
        );

        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_half_open_range_excludes_end_day() {
        let range = TimeRange::half_open(
            Utc.with_ymd_and_hms(2016, 5, 1, 4, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 4, 0, 0).unwrap(),
        );
        let units = plan_units(
            &ctx(Mode::Historical, range),
            &profile(HourConvention::Starting),
            &source("http://x/{date}.csv", Bucketing::Daily),
        );

        assert_eq!(urls(&units), vec!["http://x/20160501.csv"]);
    }

    #[test]
    fn test_yearly_and_single_bucketing() {
        let range = TimeRange::closed(
            Utc.with_ymd_and_hms(2015, 12, 30, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2016, 1, 2, 12, 0, 0).unwrap(),
        );

        let yearly = plan_units(
            &ctx(Mode::Historical, range),
            &profile(HourConvention::Ending),
            &source("http://x/{year}.xls", Bucketing::Yearly),
        );
        assert_eq!(urls(&yearly), vec!["http://x/2015.xls", "http://x/2016.xls"]);

        let mut single_source = source("http://x?from={start}&to={end}", Bucketing::Single);
        single_source.date_format = "%Y-%m-%dT%H:%MZ".to_string();
        let single = plan_units(
            &ctx(Mode::Historical, range),
            &profile(HourConvention::Ending),
            &single_source,
        );
        assert_eq!(
            urls(&single),
            vec!["http://x?from=2015-12-30T12:00Z&to=2016-01-02T12:00Z"]
        );
    }

    #[test]
    fn test_latest_planning() {
        let daily = plan_units(
            &ctx(Mode::Latest, None),
            &profile(HourConvention::Ending),
            &source("http://x/{date}.csv", Bucketing::Daily),
        );
        assert_eq!(urls(&daily), vec!["http://x/20160509.csv", "http://x/20160510.csv"]);

        let mut snapshot = source("http://x/{date}.csv", Bucketing::Daily);
        snapshot.latest_url = Some("http://x/current_{market}.csv".to_string());
        let units = plan_units(
            &ctx(Mode::Latest, None),
            &profile(HourConvention::Ending),
            &snapshot,
        );
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].span, UnitSpan::Latest);
        assert_eq!(units[0].url, "http://x/current_RTHR.csv");
        assert_eq!(units[0].file_date(), None);
    }

    #[test]
    fn test_build_url_leaves_unknown_placeholders() {
        assert_eq!(
            build_url("http://x/{date}/{region}", &[("date", "20160501".to_string())]),
            "http://x/20160501/{region}"
        );
    }
}
