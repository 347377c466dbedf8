//! Data structures for gridnorm
//!
//! - Closed enumerations for market, frequency, mode, data kind, fuel and category
//! - `DataPoint`: the canonical output record, one per (timestamp, category)
//! - `RawRecord`: parser output, one per row/node, discarded after aggregation
//! - `RequestContext`: immutable result of mode resolution

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of quantity a request retrieves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Generation by fuel (`gen_MW`)
    Generation,
    /// System load (`load_MW`)
    Load,
    /// Net export across interfaces (`net_exp_MW`)
    Trade,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Generation => "generation",
            DataKind::Load => "load",
            DataKind::Trade => "trade",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval mode of a resolved request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Most recent published snapshot
    Latest,
    /// Past range
    Historical,
    /// Range ending in the future
    Forecast,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Latest => "latest",
            Mode::Historical => "historical",
            Mode::Forecast => "forecast",
        })
    }
}

/// Market a value was published for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Real-time, 5-minute dispatch
    #[serde(rename = "RT5M")]
    RealTime5Min,
    /// Real-time, hourly
    #[serde(rename = "RTHR")]
    RealTimeHourly,
    /// Day-ahead, hourly
    #[serde(rename = "DAHR")]
    DayAhead,
    /// Real-time, 10-minute
    #[serde(rename = "RT10M")]
    TenMin,
    /// Real-time pre-dispatch, 15-minute
    #[serde(rename = "RTPD")]
    FifteenMin,
    /// Not tied to a market
    #[serde(rename = "NA")]
    NotApplicable,
}

impl Market {
    pub fn code(&self) -> &'static str {
        match self {
            Market::RealTime5Min => "RT5M",
            Market::RealTimeHourly => "RTHR",
            Market::DayAhead => "DAHR",
            Market::TenMin => "RT10M",
            Market::FifteenMin => "RTPD",
            Market::NotApplicable => "NA",
        }
    }

    /// Sampling interval published for this market
    pub fn default_freq(&self) -> Freq {
        match self {
            Market::RealTime5Min => Freq::FiveMin,
            Market::RealTimeHourly | Market::DayAhead => Freq::Hourly,
            Market::TenMin => Freq::TenMin,
            Market::FifteenMin => Freq::FifteenMin,
            Market::NotApplicable => Freq::NotApplicable,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Sampling interval, parallel to `Market`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Freq {
    #[serde(rename = "5m")]
    FiveMin,
    #[serde(rename = "10m")]
    TenMin,
    #[serde(rename = "15m")]
    FifteenMin,
    #[serde(rename = "1hr")]
    Hourly,
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl Freq {
    pub fn code(&self) -> &'static str {
        match self {
            Freq::FiveMin => "5m",
            Freq::TenMin => "10m",
            Freq::FifteenMin => "15m",
            Freq::Hourly => "1hr",
            Freq::NotApplicable => "n/a",
        }
    }
}

/// Canonical fuel names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fuel {
    Coal,
    Hydro,
    Natgas,
    Nuclear,
    Oil,
    Wind,
    Solar,
    Biomass,
    Biogas,
    Refuse,
    Geo,
    SmHydro,
    Dual,
    Thermal,
    Renewable,
    Fossil,
    NonWind,
    Other,
}

impl Fuel {
    pub const ALL: [Fuel; 18] = [
        Fuel::Coal,
        Fuel::Hydro,
        Fuel::Natgas,
        Fuel::Nuclear,
        Fuel::Oil,
        Fuel::Wind,
        Fuel::Solar,
        Fuel::Biomass,
        Fuel::Biogas,
        Fuel::Refuse,
        Fuel::Geo,
        Fuel::SmHydro,
        Fuel::Dual,
        Fuel::Thermal,
        Fuel::Renewable,
        Fuel::Fossil,
        Fuel::NonWind,
        Fuel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Fuel::Coal => "coal",
            Fuel::Hydro => "hydro",
            Fuel::Natgas => "natgas",
            Fuel::Nuclear => "nuclear",
            Fuel::Oil => "oil",
            Fuel::Wind => "wind",
            Fuel::Solar => "solar",
            Fuel::Biomass => "biomass",
            Fuel::Biogas => "biogas",
            Fuel::Refuse => "refuse",
            Fuel::Geo => "geo",
            Fuel::SmHydro => "smhydro",
            Fuel::Dual => "dual",
            Fuel::Thermal => "thermal",
            Fuel::Renewable => "renewable",
            Fuel::Fossil => "fossil",
            Fuel::NonWind => "nonwind",
            Fuel::Other => "other",
        }
    }
}

impl FromStr for Fuel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Fuel::ALL
            .iter()
            .find(|fuel| fuel.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| format!("Unknown fuel: '{}'", s))
    }
}

impl fmt::Display for Fuel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical category a raw field aggregates into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Fuel(Fuel),
    Load,
    NetExport,
}

impl Category {
    /// Data kind whose records carry this category
    pub fn kind(&self) -> DataKind {
        match self {
            Category::Fuel(_) => DataKind::Generation,
            Category::Load => DataKind::Load,
            Category::NetExport => DataKind::Trade,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Fuel(fuel) => write!(f, "{}", fuel),
            Category::Load => f.write_str("load"),
            Category::NetExport => f.write_str("net_exp"),
        }
    }
}

// ============================================================================
// Canonical output
// ============================================================================

/// Quantity carried by a canonical record
///
/// The variant fixes the field set: generation records carry `fuel_name`,
/// load and trade records do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    Generation {
        fuel_name: Fuel,
        #[serde(rename = "gen_MW")]
        gen_mw: f64,
    },
    Load {
        #[serde(rename = "load_MW")]
        load_mw: f64,
    },
    Trade {
        #[serde(rename = "net_exp_MW")]
        net_exp_mw: f64,
    },
}

/// Canonical data point
///
/// Serializes to a flat mapping of primitive fields:
///
/// ```
/// # use gridnorm::{DataPoint, Freq, Fuel, Market, Measurement};
/// # use chrono::{TimeZone, Utc};
/// let point = DataPoint {
///     timestamp: Utc.with_ymd_and_hms(2016, 5, 1, 5, 0, 0).unwrap(),
///     ba_name: "NYISO".to_string(),
///     market: Market::RealTimeHourly,
///     freq: Freq::Hourly,
///     measurement: Measurement::Generation { fuel_name: Fuel::Wind, gen_mw: 10.0 },
/// };
/// let json = serde_json::to_value(&point).unwrap();
/// assert_eq!(json["fuel_name"], "wind");
/// assert_eq!(json["gen_MW"], 10.0);
/// assert_eq!(json["market"], "RTHR");
/// assert!(json.get("load_MW").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Interval timestamp, always UTC
    pub timestamp: DateTime<Utc>,
    /// Source identifier
    pub ba_name: String,
    pub market: Market,
    pub freq: Freq,
    #[serde(flatten)]
    pub measurement: Measurement,
}

impl DataPoint {
    pub fn kind(&self) -> DataKind {
        match self.measurement {
            Measurement::Generation { .. } => DataKind::Generation,
            Measurement::Load { .. } => DataKind::Load,
            Measurement::Trade { .. } => DataKind::Trade,
        }
    }

    /// Value in MW regardless of kind
    pub fn value(&self) -> f64 {
        match self.measurement {
            Measurement::Generation { gen_mw, .. } => gen_mw,
            Measurement::Load { load_mw } => load_mw,
            Measurement::Trade { net_exp_mw } => net_exp_mw,
        }
    }

    pub fn fuel(&self) -> Option<Fuel> {
        match self.measurement {
            Measurement::Generation { fuel_name, .. } => Some(fuel_name),
            _ => None,
        }
    }
}

// ============================================================================
// Request context
// ============================================================================

/// Validated UTC range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    closed_end: bool,
}

impl TimeRange {
    /// Inclusive range `[start, end]`; `None` if `start > end`
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self {
            start,
            end,
            closed_end: true,
        })
    }

    /// Half-open range `[start, end)`; `None` if `start > end`
    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self {
            start,
            end,
            closed_end: false,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `end` itself belongs to the range
    pub fn is_closed(&self) -> bool {
        self.closed_end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if self.closed_end {
            self.start <= instant && instant <= self.end
        } else {
            self.start <= instant && instant < self.end
        }
    }
}

/// Resolved, read-only request description
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub kind: DataKind,
    pub mode: Mode,
    /// Present for historical and forecast modes
    pub range: Option<TimeRange>,
    pub market: Market,
    pub freq: Freq,
    /// Instant the request was resolved against
    pub now: DateTime<Utc>,
}

// ============================================================================
// Raw (intermediate) records
// ============================================================================

/// Explicit daylight/standard marker carried by some formats ("EDT" / "EST")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstMarker {
    Daylight,
    Standard,
}

/// Local-time basis of a raw record, resolved by the temporal normalizer
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBasis {
    /// Local wall-clock timestamp in an IANA zone
    Local {
        naive: NaiveDateTime,
        zone: String,
        dst: Option<DstMarker>,
    },
    /// Hour-ending index on a local date: hour N is stamped at local N:00
    HourEnding {
        date: NaiveDate,
        hour: u32,
        zone: String,
        dst: Option<DstMarker>,
    },
    /// Timestamp text carrying its own offset
    Zoned(String),
    /// Milliseconds since the Unix epoch
    EpochMillis(i64),
}

/// Raw field value after numeric cleaning
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    /// Empty cell or explicit "not available" marker
    Missing,
    /// Non-numeric text
    Text(String),
}

impl RawValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// One parsed row/node: source field names and values plus its time basis
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub basis: TimeBasis,
    pub fields: Vec<(String, RawValue)>,
}

/// Raw record whose basis has been converted to UTC
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<(String, RawValue)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 5, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_fuel_from_str() {
        assert_eq!("natgas".parse::<Fuel>().unwrap(), Fuel::Natgas);
        assert_eq!("NUCLEAR".parse::<Fuel>().unwrap(), Fuel::Nuclear);
        assert_eq!("smhydro".parse::<Fuel>().unwrap(), Fuel::SmHydro);
        assert!("plutonium".parse::<Fuel>().is_err());
    }

    #[test]
    fn test_market_default_freq() {
        assert_eq!(Market::RealTime5Min.default_freq(), Freq::FiveMin);
        assert_eq!(Market::DayAhead.default_freq(), Freq::Hourly);
        assert_eq!(Market::NotApplicable.default_freq(), Freq::NotApplicable);
    }

    #[test]
    fn test_time_range_bounds() {
        assert!(TimeRange::closed(ts(2), ts(1)).is_none());

        let closed = TimeRange::closed(ts(1), ts(3)).unwrap();
        assert!(closed.contains(ts(1)));
        assert!(closed.contains(ts(3)));
        assert!(!closed.contains(ts(4)));

        let open = TimeRange::half_open(ts(1), ts(3)).unwrap();
        assert!(open.contains(ts(1)));
        assert!(!open.contains(ts(3)));
    }

    #[test]
    fn test_load_point_serializes_flat() {
        let point = DataPoint {
            timestamp: ts(5),
            ba_name: "ISONE".to_string(),
            market: Market::RealTime5Min,
            freq: Freq::FiveMin,
            measurement: Measurement::Load { load_mw: 12000.5 },
        };

        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["load_MW"], 12000.5);
        assert_eq!(json["freq"], "5m");
        assert_eq!(json["timestamp"], "2016-05-01T05:00:00Z");
        assert!(json.get("fuel_name").is_none());
        assert!(json.get("gen_MW").is_none());
        assert_eq!(point.kind(), DataKind::Load);
        assert_eq!(point.fuel(), None);
    }

    #[test]
    fn test_trade_point_round_trips_through_json() {
        let point = DataPoint {
            timestamp: ts(7),
            ba_name: "BPA".to_string(),
            market: Market::RealTime5Min,
            freq: Freq::FiveMin,
            measurement: Measurement::Trade { net_exp_mw: -250.0 },
        };

        let json = serde_json::to_string(&point).unwrap();
        let back: DataPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
        assert_eq!(back.value(), -250.0);
    }

    #[test]
    fn test_category_kind() {
        assert_eq!(Category::Fuel(Fuel::Coal).kind(), DataKind::Generation);
        assert_eq!(Category::Load.kind(), DataKind::Load);
        assert_eq!(Category::NetExport.to_string(), "net_exp");
    }
}
