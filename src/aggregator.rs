//! Fuel/category aggregator
//!
//! Reduces normalized raw records into per-(timestamp, category) totals:
//! - Raw field names are mapped to canonical targets by a per-source `CategoryMap`
//! - Fields mapping to the same category are summed, never overwritten
//! - Trade fields carry a sign: exports add to net export, imports subtract
//! - A missing or non-numeric contribution marks the whole bucket incomplete
//! - Residual categories are `total - sum(known)` over timestamps present in both series

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::types::{Category, Fuel, NormalizedRecord};

/// Canonical destination of a raw field
///
/// Parsed from profile strings: a fuel name, `load`, `export` / `net_exp`, or `import`.
///
/// # Examples
///
/// ```
/// # use gridnorm::aggregator::Target;
/// # use gridnorm::{Category, Fuel};
/// let t: Target = "natgas".parse().unwrap();
/// assert_eq!(t.category, Category::Fuel(Fuel::Natgas));
///
/// let t: Target = "import".parse().unwrap();
/// assert_eq!(t.category, Category::NetExport);
/// assert_eq!(t.sign, -1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Target {
    pub category: Category,
    pub sign: f64,
}

impl Target {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            sign: 1.0,
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "load" => Ok(Target::new(Category::Load)),
            "export" | "net_exp" => Ok(Target::new(Category::NetExport)),
            "import" => Ok(Target {
                category: Category::NetExport,
                sign: -1.0,
            }),
            other => other
                .parse::<Fuel>()
                .map(|fuel| Target::new(Category::Fuel(fuel)))
                .map_err(|_| format!("Unknown category target: '{}'", s)),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.category, self.sign < 0.0) {
            (Category::NetExport, true) => f.write_str("import"),
            (category, _) => write!(f, "{}", category),
        }
    }
}

/// Raw field name → canonical target, supplied by configuration
pub type CategoryMap = BTreeMap<String, Target>;

/// Complete values of one category (or a total) keyed by timestamp
pub type TimeSeries = BTreeMap<DateTime<Utc>, f64>;

fn lookup_target(map: &CategoryMap, field: &str) -> Option<Target> {
    map.get(field).copied().or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, t)| *t)
    })
}

/// Per-(timestamp, category) totals
///
/// `None` marks a bucket that received a missing or non-numeric contribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    buckets: BTreeMap<(DateTime<Utc>, Category), Option<f64>>,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one contribution to a bucket
    pub fn add(&mut self, timestamp: DateTime<Utc>, category: Category, value: Option<f64>) {
        let bucket = self.buckets.entry((timestamp, category)).or_insert(Some(0.0));
        *bucket = match (*bucket, value) {
            (Some(total), Some(v)) => Some(total + v),
            _ => None,
        };
    }

    /// Buckets in (timestamp, category) order
    pub fn buckets(&self) -> impl Iterator<Item = (DateTime<Utc>, Category, Option<f64>)> + '_ {
        self.buckets.iter().map(|((ts, cat), v)| (*ts, *cat, *v))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Complete values of one category
    pub fn series(&self, category: Category) -> TimeSeries {
        self.buckets
            .iter()
            .filter(|((_, cat), _)| *cat == category)
            .filter_map(|((ts, _), v)| v.map(|v| (*ts, v)))
            .collect()
    }

    /// Sum over all categories per timestamp
    ///
    /// Timestamps with any incomplete bucket are left out.
    pub fn series_total(&self) -> TimeSeries {
        let mut totals: BTreeMap<DateTime<Utc>, Option<f64>> = BTreeMap::new();
        for ((ts, _), value) in &self.buckets {
            let total = totals.entry(*ts).or_insert(Some(0.0));
            *total = match (*total, value) {
                (Some(t), Some(v)) => Some(t + v),
                _ => None,
            };
        }
        totals
            .into_iter()
            .filter_map(|(ts, v)| v.map(|v| (ts, v)))
            .collect()
    }

    /// Add a complete series under one category
    pub fn insert_series(&mut self, category: Category, series: &TimeSeries) {
        for (ts, value) in series {
            self.add(*ts, category, Some(*value));
        }
    }
}

/// Reduce normalized records into per-(timestamp, category) totals
///
/// Unmapped fields are ignored. Mapped fields are summed with their target's sign.
///
/// # Example
///
/// ```
/// # use gridnorm::aggregator::{aggregate, CategoryMap};
/// # use gridnorm::{Category, Fuel, NormalizedRecord, RawValue};
/// # use chrono::{TimeZone, Utc};
/// let mut map = CategoryMap::new();
/// map.insert("GAS CT".to_string(), "natgas".parse().unwrap());
/// map.insert("GAS CC".to_string(), "natgas".parse().unwrap());
///
/// let ts = Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap();
/// let records = vec![NormalizedRecord {
///     timestamp: ts,
///     fields: vec![
///         ("GAS CT".to_string(), RawValue::Number(100.0)),
///         ("GAS CC".to_string(), RawValue::Number(250.0)),
///         ("Notes".to_string(), RawValue::Text("ok".to_string())),
///     ],
/// }];
///
/// let agg = aggregate(&records, &map);
/// assert_eq!(agg.series(Category::Fuel(Fuel::Natgas))[&ts], 350.0);
/// ```
pub fn aggregate(records: &[NormalizedRecord], map: &CategoryMap) -> Aggregation {
    let mut aggregation = Aggregation::new();

    for record in records {
        for (field, value) in &record.fields {
            match lookup_target(map, field) {
                Some(target) => aggregation.add(
                    record.timestamp,
                    target.category,
                    value.as_number().map(|v| v * target.sign),
                ),
                None => debug!(field = %field, "ignoring unmapped field"),
            }
        }
    }

    aggregation
}

/// Residual series `total - known` on timestamps present in both inputs
///
/// Timestamps present in only one input are dropped, never defaulted to zero.
///
/// # Example
///
/// ```
/// # use gridnorm::aggregator::{residual, TimeSeries};
/// # use chrono::{TimeZone, Utc};
/// let t = |h| Utc.with_ymd_and_hms(2016, 5, 1, h, 0, 0).unwrap();
/// let total = TimeSeries::from([(t(1), 100.0), (t(2), 110.0)]);
/// let known = TimeSeries::from([(t(1), 30.0), (t(3), 5.0)]);
///
/// assert_eq!(residual(&total, &known), TimeSeries::from([(t(1), 70.0)]));
/// ```
pub fn residual(total: &TimeSeries, known: &TimeSeries) -> TimeSeries {
    total
        .iter()
        .filter_map(|(ts, t)| known.get(ts).map(|k| (*ts, t - k)))
        .collect()
}

fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(ts)
}

/// Average sub-hourly buckets into hour-start bins
///
/// Incomplete buckets are left out of the mean; an hour with no complete bucket
/// stays incomplete.
pub fn resample_hourly(aggregation: &Aggregation) -> Aggregation {
    let mut bins: BTreeMap<(DateTime<Utc>, Category), (f64, usize)> = BTreeMap::new();

    for (ts, category, value) in aggregation.buckets() {
        let bin = bins.entry((hour_start(ts), category)).or_insert((0.0, 0));
        if let Some(v) = value {
            bin.0 += v;
            bin.1 += 1;
        }
    }

    Aggregation {
        buckets: bins
            .into_iter()
            .map(|(key, (sum, count))| (key, (count > 0).then(|| sum / count as f64)))
            .collect(),
    }
}
