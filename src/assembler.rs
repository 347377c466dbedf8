//! Record assembler
//!
//! Turns aggregated (timestamp, category) buckets into canonical data points:
//! - Incomplete buckets and buckets of the wrong kind are dropped with a warning
//! - `latest` keeps only the most recent timestamp strictly before `now`
//! - `historical` and `forecast` keep timestamps inside the requested range
//!
//! Forecast output is not filtered to future timestamps; a source that returns past
//! values for a forecast range passes them through.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::aggregator::Aggregation;
use crate::error::IncompleteRecordError;
use crate::types::{Category, DataKind, DataPoint, Measurement, Mode, RequestContext};

/// Build one data point from a bucket
///
/// # Returns
///
/// * `Ok(DataPoint)` - Complete record of the requested kind
/// * `Err(IncompleteRecordError)` - Missing value, missing fuel, or wrong kind
pub fn assemble_point(
    timestamp: DateTime<Utc>,
    category: Category,
    value: Option<f64>,
    ctx: &RequestContext,
    ba_name: &str,
) -> Result<DataPoint, IncompleteRecordError> {
    if category.kind() != ctx.kind {
        return Err(IncompleteRecordError::KindMismatch {
            timestamp,
            category: category.to_string(),
            kind: ctx.kind,
        });
    }

    let value = value.ok_or_else(|| IncompleteRecordError::MissingValue {
        timestamp,
        category: category.to_string(),
    })?;

    let measurement = match (ctx.kind, category) {
        (DataKind::Generation, Category::Fuel(fuel_name)) => Measurement::Generation {
            fuel_name,
            gen_mw: value,
        },
        (DataKind::Generation, other) => {
            return Err(IncompleteRecordError::MissingFuel {
                timestamp,
                category: other.to_string(),
            })
        }
        (DataKind::Load, _) => Measurement::Load { load_mw: value },
        (DataKind::Trade, _) => Measurement::Trade { net_exp_mw: value },
    };

    Ok(DataPoint {
        timestamp,
        ba_name: ba_name.to_string(),
        market: ctx.market,
        freq: ctx.freq,
        measurement,
    })
}

/// Assemble canonical data points for a request
///
/// Output is ordered by timestamp, then category.
pub fn assemble(aggregation: &Aggregation, ctx: &RequestContext, ba_name: &str) -> Vec<DataPoint> {
    let mut points: Vec<DataPoint> = aggregation
        .buckets()
        .filter_map(|(ts, category, value)| {
            match assemble_point(ts, category, value, ctx, ba_name) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!(ba = ba_name, error = %e, "dropping incomplete record");
                    None
                }
            }
        })
        .collect();

    match ctx.mode {
        Mode::Latest => {
            let newest = points
                .iter()
                .map(|p| p.timestamp)
                .filter(|ts| *ts < ctx.now)
                .max();
            match newest {
                Some(newest) => points.retain(|p| p.timestamp == newest),
                None => points.clear(),
            }
        }
        Mode::Historical | Mode::Forecast => {
            if let Some(range) = ctx.range {
                points.retain(|p| range.contains(p.timestamp));
            }
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Freq, Fuel, Market, TimeRange};
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 5, 1, hour, 0, 0).unwrap()
    }

    fn ctx(kind: DataKind, mode: Mode, range: Option<TimeRange>) -> RequestContext {
        RequestContext {
            kind,
            mode,
            range,
            market: Market::RealTimeHourly,
            freq: Freq::Hourly,
            now: at(12),
        }
    }

    fn hourly(categories: &[Category], hours: std::ops::Range<u32>) -> Aggregation {
        let mut agg = Aggregation::new();
        for hour in hours {
            for category in categories {
                agg.add(at(hour), *category, Some(f64::from(hour)));
            }
        }
        agg
    }

    #[test]
    fn test_generation_points() {
        let agg = hourly(
            &[Category::Fuel(Fuel::Wind), Category::Fuel(Fuel::Nuclear)],
            0..3,
        );
        let range = TimeRange::closed(at(0), at(2));
        let points = assemble(&agg, &ctx(DataKind::Generation, Mode::Historical, range), "NYISO");

        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.ba_name == "NYISO"));
        assert!(points.iter().all(|p| p.market == Market::RealTimeHourly));
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(points[0].fuel(), Some(Fuel::Nuclear));
        assert_eq!(points[1].fuel(), Some(Fuel::Wind));
    }

    #[test]
    fn test_incomplete_bucket_dropped() {
        let mut agg = hourly(&[Category::Fuel(Fuel::Wind)], 0..2);
        agg.add(at(1), Category::Fuel(Fuel::Wind), None);

        let range = TimeRange::closed(at(0), at(2));
        let points = assemble(&agg, &ctx(DataKind::Generation, Mode::Historical, range), "NYISO");

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, at(0));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let request = ctx(DataKind::Generation, Mode::Historical, None);

        assert!(matches!(
            assemble_point(at(0), Category::Load, Some(1.0), &request, "X"),
            Err(IncompleteRecordError::KindMismatch { .. })
        ));
        assert!(matches!(
            assemble_point(at(0), Category::Fuel(Fuel::Coal), None, &request, "X"),
            Err(IncompleteRecordError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_load_and_trade_measurements() {
        let load = assemble_point(
            at(0),
            Category::Load,
            Some(500.0),
            &ctx(DataKind::Load, Mode::Latest, None),
            "X",
        )
        .unwrap();
        assert_eq!(load.measurement, Measurement::Load { load_mw: 500.0 });
        assert_eq!(load.fuel(), None);

        let trade = assemble_point(
            at(0),
            Category::NetExport,
            Some(-20.0),
            &ctx(DataKind::Trade, Mode::Latest, None),
            "X",
        )
        .unwrap();
        assert_eq!(trade.value(), -20.0);
        assert_eq!(trade.kind(), DataKind::Trade);
    }

    #[test]
    fn test_latest_keeps_one_timestamp_before_now() {
        // 0..15 straddles now (12:00)
        let agg = hourly(&[Category::Load], 0..15);
        let points = assemble(&agg, &ctx(DataKind::Load, Mode::Latest, None), "X");

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, at(11));
    }

    #[test]
    fn test_latest_without_past_data_is_empty() {
        let agg = hourly(&[Category::Load], 12..15);
        assert!(assemble(&agg, &ctx(DataKind::Load, Mode::Latest, None), "X").is_empty());
    }

    #[test]
    fn test_historical_range_is_inclusive() {
        let agg = hourly(&[Category::Load], 0..10);
        let range = TimeRange::closed(at(2), at(5));
        let points = assemble(&agg, &ctx(DataKind::Load, Mode::Historical, range), "X");

        let stamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![at(2), at(3), at(4), at(5)]);
    }

    #[test]
    fn test_half_open_range_excludes_end() {
        let agg = hourly(&[Category::Load], 0..10);
        let range = TimeRange::half_open(at(2), at(5));
        let points = assemble(&agg, &ctx(DataKind::Load, Mode::Historical, range), "X");

        assert_eq!(points.len(), 3);
        assert_eq!(points.last().map(|p| p.timestamp), Some(at(4)));
    }

    #[test]
    fn test_forecast_keeps_past_values_in_range() {
        let agg = hourly(&[Category::Load], 0..24);
        let range = TimeRange::closed(at(10), at(12) + Duration::hours(11));
        let points = assemble(&agg, &ctx(DataKind::Load, Mode::Forecast, range), "X");

        assert_eq!(points.len(), 14);
        assert!(points.iter().any(|p| p.timestamp < at(12)));
    }
}
