//! Request pipeline
//!
//! One `Engine` serves one source: a declarative `SourceProfile` plus a `Fetcher`.
//! A request runs synchronously through
//! resolve → plan → fetch → parse → normalize → aggregate → residual → assemble.
//!
//! # Recovery
//!
//! - Request errors are returned before the fetcher is called
//! - A unit that fails to fetch, parse or localize is logged and skipped
//! - Records that cannot be localized or assembled are logged and dropped
//!
//! # Example
//!
//! ```rust
//! use gridnorm::{DataKind, Engine, MemoryFetcher, RequestFlags, SourceProfile};
//! use chrono::{TimeZone, Utc};
//!
//! let profile = SourceProfile::from_toml_str(r#"
//! ba_name = "NYISO"
//! timezone = "America/New_York"
//!
//! [feeds.load]
//! url = "https://example.org/load/{date}.csv"
//! market = "RTHR"
//!
//! [feeds.load.parser]
//! format = "delimited"
//! time = { style = "hour_ending", hour_field = "HE" }
//!
//! [feeds.load.categories]
//! "Total Load" = "load"
//! "#).unwrap();
//!
//! let fetcher = MemoryFetcher::new().with_response(
//!     "https://example.org/load/20160501.csv",
//!     200,
//!     "HE,Total Load\n1,15000\n2,14800\n",
//! );
//! let engine = Engine::new(profile, &fetcher);
//!
//! let start = Utc.with_ymd_and_hms(2016, 5, 1, 4, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2016, 5, 1, 12, 0, 0).unwrap();
//! let now = Utc.with_ymd_and_hms(2016, 5, 10, 0, 0, 0).unwrap();
//!
//! let points = engine.run(DataKind::Load, &RequestFlags::range(start, end), now).unwrap();
//! assert_eq!(points.len(), 2);
//! assert_eq!(points[0].value(), 15000.0);
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::aggregator::{aggregate, resample_hourly, residual, Aggregation, CategoryMap, Target};
use crate::assembler::assemble;
use crate::config::{Feed, FeedSource, ResidualFeed, SourceProfile};
use crate::error::{GridError, Recovery, RequestError};
use crate::mode_resolver::{resolve, RequestFlags};
use crate::parser::ParseContext;
use crate::query_router::{plan_units, FetchUnit, UnitSpan};
use crate::source::{fetch_text, FetchRequest, Fetcher};
use crate::temporal::{is_transition_day, normalize_unit, report_file_for};
use crate::types::{DataKind, DataPoint, NormalizedRecord, RequestContext};

/// Normalization engine for one source
#[derive(Debug)]
pub struct Engine<F> {
    profile: SourceProfile,
    fetcher: F,
}

impl<F: Fetcher> Engine<F> {
    pub fn new(profile: SourceProfile, fetcher: F) -> Self {
        Self { profile, fetcher }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run one request
    ///
    /// # Arguments
    ///
    /// * `kind` - Data kind to return
    /// * `flags` - Request flags (`latest`, `yesterday`, or a range)
    /// * `now` - Instant the request is evaluated against
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<DataPoint>)` - Canonical points, possibly empty
    /// * `Err(GridError::Request)` - Bad request or capability violation, raised
    ///   before any fetch
    pub fn run(
        &self,
        kind: DataKind,
        flags: &RequestFlags,
        now: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, GridError> {
        let ctx = resolve(kind, flags, &self.profile, now)?;
        let feed = self
            .profile
            .feed(kind)
            .ok_or_else(|| RequestError::UnsupportedOperation {
                ba: self.profile.ba_name.clone(),
                kind,
                mode: ctx.mode,
                market: ctx.market,
            })?;

        let span = info_span!(
            "request",
            ba = %self.profile.ba_name,
            kind = %kind,
            mode = %ctx.mode,
            market = %ctx.market,
        );
        let _guard = span.enter();

        let aggregation = self.aggregate_feed(&ctx, feed)?;
        let points = assemble(&aggregation, &ctx, &self.profile.ba_name);

        info!(points = points.len(), "request complete");
        Ok(points)
    }

    fn aggregate_feed(&self, ctx: &RequestContext, feed: &Feed) -> Result<Aggregation, GridError> {
        let records = self.collect(ctx, &feed.source)?;
        let mut aggregation = aggregate(&records, &feed.categories);

        if let Some(residual_feed) = &feed.residual {
            self.add_residual(ctx, residual_feed, &mut aggregation)?;
        }

        if feed.resample_hourly {
            aggregation = resample_hourly(&aggregation);
        }
        Ok(aggregation)
    }

    /// Join the total feed against the known categories and add the residual
    ///
    /// Timestamps missing from either side produce no residual value.
    fn add_residual(
        &self,
        ctx: &RequestContext,
        feed: &ResidualFeed,
        aggregation: &mut Aggregation,
    ) -> Result<(), GridError> {
        let category = feed.category.category;
        let total_map: CategoryMap = feed
            .total_fields
            .iter()
            .map(|field| (field.clone(), Target::new(category)))
            .collect();

        let total_records = self.collect(ctx, &feed.source)?;
        let total = aggregate(&total_records, &total_map).series(category);

        let mut remainder = residual(&total, &aggregation.series_total());
        for value in remainder.values_mut() {
            *value *= feed.category.sign;
        }

        debug!(
            category = %feed.category,
            totals = total.len(),
            residuals = remainder.len(),
            "computed residual"
        );
        aggregation.insert_series(category, &remainder);
        Ok(())
    }

    /// Fetch, parse and normalize every planned unit of one feed
    ///
    /// Unit failures are skipped; only a fatal error ends the request.
    fn collect(
        &self,
        ctx: &RequestContext,
        source: &FeedSource,
    ) -> Result<Vec<NormalizedRecord>, GridError> {
        let mut records = Vec::new();

        for unit in plan_units(ctx, &self.profile, source) {
            match self.run_unit(ctx, source, &unit) {
                Ok(unit_records) => {
                    debug!(url = %unit.url, records = unit_records.len(), "unit normalized");
                    records.extend(unit_records);
                }
                Err(e) => match e.recovery() {
                    Recovery::Fatal => return Err(e),
                    Recovery::SkipUnit | Recovery::SkipRecord => {
                        warn!(url = %unit.url, error = %e, "skipping unit");
                    }
                },
            }
        }

        Ok(records)
    }

    fn run_unit(
        &self,
        ctx: &RequestContext,
        source: &FeedSource,
        unit: &FetchUnit,
    ) -> Result<Vec<NormalizedRecord>, GridError> {
        let body = fetch_text(&self.fetcher, &FetchRequest::get(unit.url.clone()))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let zone = self.profile.timezone;
        let file_date = match unit.span {
            UnitSpan::Latest => Some(report_file_for(ctx.now, zone, self.profile.hour_convention)),
            _ => unit.file_date(),
        };
        let parse_ctx = ParseContext {
            zone,
            file_date,
            dst_transition: file_date.is_some_and(|date| is_transition_day(date, zone)),
        };

        let raw = source.parser.parse(&body, &parse_ctx)?;
        let records = normalize_unit(raw)?;
        Ok(records)
    }
}
