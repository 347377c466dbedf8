//! Declarative source profiles
//!
//! A grid operator is described entirely by configuration: its zone and hour
//! convention, default market tags, a capability table, and one feed per data kind
//! with the URL template, parser settings and category map for that feed.
//!
//! # Example profile
//!
//! ```toml
//! ba_name = "NYISO"
//! timezone = "America/New_York"
//! hour_convention = "ending"
//!
//! [defaults]
//! market = "RT5M"
//!
//! [[capabilities]]
//! kind = "load"
//! mode = "forecast"
//! capability = "unsupported"
//!
//! [[capabilities]]
//! kind = "trade"
//! capability = { delayed_by = { days = 2 } }
//!
//! [feeds.generation]
//! url = "https://example.org/fuelmix/{date}.csv"
//! market = "RTHR"
//!
//! [feeds.generation.parser]
//! format = "delimited"
//! time = { style = "hour_ending", hour_field = "Hour" }
//!
//! [feeds.generation.categories]
//! NUCLEAR = "nuclear"
//! WIND = "wind"
//! ```

use std::path::Path;

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};

use crate::aggregator::{CategoryMap, Target};
use crate::error::ConfigError;
use crate::parser::ParserSpec;
use crate::query_router::is_valid_format;
use crate::temporal::HourConvention;
use crate::types::{DataKind, Freq, Market, Mode};

/// Complete description of one source
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceProfile {
    /// Source identifier stamped on every data point
    pub ba_name: String,
    /// IANA zone of the source's local times
    #[serde(deserialize_with = "deserialize_zone")]
    pub timezone: Tz,
    #[serde(default)]
    pub hour_convention: HourConvention,
    #[serde(default)]
    pub defaults: Defaults,
    /// Unsupported or delayed operations
    #[serde(default)]
    pub capabilities: Vec<CapabilityRule>,
    #[serde(default)]
    pub feeds: Feeds,
}

fn deserialize_zone<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse::<Tz>()
        .map_err(|_| serde::de::Error::custom(format!("unknown timezone '{}'", name)))
}

/// Market tags used when neither the request nor the feed sets them
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_market")]
    pub market: Market,
    /// Falls back to the market's own frequency
    #[serde(default)]
    pub freq: Option<Freq>,
}

fn default_market() -> Market {
    Market::RealTime5Min
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            market: default_market(),
            freq: None,
        }
    }
}

/// One entry of the capability table
///
/// Unset selectors match anything.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CapabilityRule {
    #[serde(default)]
    pub kind: Option<DataKind>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub market: Option<Market>,
    pub capability: Capability,
}

impl CapabilityRule {
    pub fn matches(&self, kind: DataKind, mode: Mode, market: Market) -> bool {
        self.kind.map_or(true, |k| k == kind)
            && self.mode.map_or(true, |m| m == mode)
            && self.market.map_or(true, |m| m == market)
    }
}

/// Restriction declared by a capability rule
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Operation is not offered at all
    Unsupported,
    /// Data is published only after the given delay
    DelayedBy(Delay),
}

/// Publication delay
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Delay {
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
}

impl Delay {
    /// Total delay, or `None` when it overflows a `Duration`
    pub fn duration(&self) -> Option<Duration> {
        Duration::try_days(self.days)?
            .checked_add(&Duration::try_hours(self.hours)?)?
            .checked_add(&Duration::try_minutes(self.minutes)?)
    }
}

/// Feeds by data kind
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Feeds {
    #[serde(default)]
    pub generation: Option<Feed>,
    #[serde(default)]
    pub load: Option<Feed>,
    #[serde(default)]
    pub trade: Option<Feed>,
}

impl Feeds {
    pub fn get(&self, kind: DataKind) -> Option<&Feed> {
        match kind {
            DataKind::Generation => self.generation.as_ref(),
            DataKind::Load => self.load.as_ref(),
            DataKind::Trade => self.trade.as_ref(),
        }
    }
}

/// How a feed splits its history into files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucketing {
    /// One file per report day (`{date}`)
    #[default]
    Daily,
    /// One file per calendar year (`{year}`)
    Yearly,
    /// One request for the whole range (`{start}`, `{end}`)
    Single,
}

/// Where and how to fetch one raw series
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedSource {
    /// Template with `{date}`, `{year}`, `{start}`, `{end}`, `{market}` placeholders
    pub url: String,
    /// Dedicated snapshot URL for latest mode
    #[serde(default)]
    pub latest_url: Option<String>,
    /// chrono format for `{date}`, `{start}` and `{end}`
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub bucketing: Bucketing,
    pub parser: ParserSpec,
}

fn default_date_format() -> String {
    "%Y%m%d".to_string()
}

/// Feed for one data kind
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Feed {
    #[serde(flatten)]
    pub source: FeedSource,
    /// Overrides the profile default market for this kind
    #[serde(default)]
    pub market: Option<Market>,
    #[serde(default)]
    pub freq: Option<Freq>,
    /// Average sub-hourly values into hourly bins
    #[serde(default)]
    pub resample_hourly: bool,
    pub categories: CategoryMap,
    #[serde(default)]
    pub residual: Option<ResidualFeed>,
}

/// Second feed supplying a total; the residual is `total - sum(categories)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResidualFeed {
    #[serde(flatten)]
    pub source: FeedSource,
    /// Fields summed into the total
    pub total_fields: Vec<String>,
    /// Category the residual is emitted under
    pub category: Target,
}

impl SourceProfile {
    /// Parse and validate a TOML profile
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let profile: SourceProfile = toml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Read, parse and validate a TOML profile file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ba_name.trim().is_empty() {
            return Err(ConfigError::Invalid("ba_name must not be empty".to_string()));
        }

        for rule in &self.capabilities {
            if let Capability::DelayedBy(delay) = rule.capability {
                match delay.duration() {
                    Some(d) if d >= Duration::zero() => {}
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "capability delay {:?} is out of range",
                            delay
                        )))
                    }
                }
            }
        }

        for kind in [DataKind::Generation, DataKind::Load, DataKind::Trade] {
            let Some(feed) = self.feeds.get(kind) else {
                continue;
            };

            let residual_source = feed.residual.as_ref().map(|r| &r.source);
            let sources = std::iter::once(&feed.source).chain(residual_source);
            for source in sources {
                if !is_valid_format(&source.date_format) {
                    return Err(ConfigError::Invalid(format!(
                        "{} feed has invalid date_format '{}'",
                        kind, source.date_format
                    )));
                }
            }

            if feed.categories.is_empty() {
                return Err(ConfigError::Invalid(format!("{} feed has no categories", kind)));
            }

            for (field, target) in &feed.categories {
                if target.category.kind() != kind {
                    return Err(ConfigError::Invalid(format!(
                        "{} feed maps '{}' to {}, which is not {} data",
                        kind, field, target, kind
                    )));
                }
            }

            if let Some(residual) = &feed.residual {
                if residual.total_fields.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{} residual has no total_fields",
                        kind
                    )));
                }
                if residual.category.category.kind() != kind {
                    return Err(ConfigError::Invalid(format!(
                        "{} residual category {} is not {} data",
                        kind, residual.category, kind
                    )));
                }
            }
        }

        Ok(())
    }

    /// Feed for a kind, if the source publishes it
    pub fn feed(&self, kind: DataKind) -> Option<&Feed> {
        self.feeds.get(kind)
    }
}
