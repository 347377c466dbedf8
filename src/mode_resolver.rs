//! Mode resolver
//!
//! Turns request flags plus an explicit `now` into an immutable `RequestContext`:
//! - `latest` wins over everything else
//! - `yesterday` is the previous local day of the source's zone, as a half-open UTC range
//! - an explicit range is historical, or forecast when it ends after `now`
//!
//! Market and frequency defaults are filled in, then the source's capability table is
//! checked. Resolution performs no I/O and depends only on its inputs.

use chrono::{DateTime, Utc};

use crate::config::{Capability, SourceProfile};
use crate::error::RequestError;
use crate::temporal::{start_of_local_day, to_local};
use crate::types::{DataKind, Freq, Market, Mode, RequestContext, TimeRange};

/// Flags of an incoming request
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RequestFlags {
    pub latest: bool,
    pub yesterday: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub market: Option<Market>,
    pub freq: Option<Freq>,
}

impl RequestFlags {
    pub fn latest() -> Self {
        Self {
            latest: true,
            ..Default::default()
        }
    }

    pub fn yesterday() -> Self {
        Self {
            yesterday: true,
            ..Default::default()
        }
    }

    pub fn range(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            start_at: Some(start_at),
            end_at: Some(end_at),
            ..Default::default()
        }
    }

    pub fn with_market(mut self, market: Market) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_freq(mut self, freq: Freq) -> Self {
        self.freq = Some(freq);
        self
    }
}

/// Resolve request flags into a request context
///
/// # Arguments
///
/// * `kind` - Requested data kind
/// * `flags` - Request flags
/// * `profile` - Source profile (zone, defaults, capability table)
/// * `now` - Instant the request is evaluated against
///
/// # Returns
///
/// * `Ok(RequestContext)` - Resolved, capability-checked context
/// * `Err(RequestError)` - Bad request shape or capability violation
///
/// # Examples
///
/// ```
/// # use gridnorm::mode_resolver::{resolve, RequestFlags};
/// # use gridnorm::{DataKind, RequestError, SourceProfile};
/// # use chrono::{TimeZone, Utc};
/// let profile = SourceProfile::from_toml_str(r#"
/// ba_name = "ERCOT"
/// timezone = "America/Chicago"
/// "#).unwrap();
/// let now = Utc.with_ymd_and_hms(2016, 5, 2, 15, 0, 0).unwrap();
///
/// let err = resolve(DataKind::Load, &RequestFlags::default(), &profile, now).unwrap_err();
/// assert_eq!(err, RequestError::MissingArguments);
/// ```
pub fn resolve(
    kind: DataKind,
    flags: &RequestFlags,
    profile: &SourceProfile,
    now: DateTime<Utc>,
) -> Result<RequestContext, RequestError> {
    let (mode, range) = resolve_mode(flags, profile, now)?;

    let feed = profile.feed(kind);
    let (market, default_freq) = match (flags.market, mode) {
        (Some(market), _) => (market, None),
        (None, Mode::Forecast) => (Market::DayAhead, Some(Freq::Hourly)),
        (None, _) => match feed.and_then(|f| f.market) {
            Some(market) => (market, feed.and_then(|f| f.freq)),
            None => (
                profile.defaults.market,
                feed.and_then(|f| f.freq).or(profile.defaults.freq),
            ),
        },
    };
    let freq = flags
        .freq
        .or(default_freq)
        .unwrap_or_else(|| market.default_freq());

    let ctx = RequestContext {
        kind,
        mode,
        range,
        market,
        freq,
        now,
    };

    if feed.is_none() {
        return Err(RequestError::UnsupportedOperation {
            ba: profile.ba_name.clone(),
            kind,
            mode,
            market,
        });
    }
    check_capabilities(&ctx, profile)?;

    Ok(ctx)
}

fn resolve_mode(
    flags: &RequestFlags,
    profile: &SourceProfile,
    now: DateTime<Utc>,
) -> Result<(Mode, Option<TimeRange>), RequestError> {
    if flags.latest {
        return Ok((Mode::Latest, None));
    }

    if flags.yesterday {
        let today = to_local(now, profile.timezone).date();
        let yesterday = today.pred_opt().unwrap_or(today);
        let start = start_of_local_day(yesterday, profile.timezone);
        let end = start_of_local_day(today, profile.timezone);
        let range = TimeRange::half_open(start, end)
            .ok_or(RequestError::InvalidRange { start, end })?;
        return Ok((Mode::Historical, Some(range)));
    }

    match (flags.start_at, flags.end_at) {
        (Some(start), Some(end)) => {
            let range =
                TimeRange::closed(start, end).ok_or(RequestError::InvalidRange { start, end })?;
            let mode = if end > now {
                Mode::Forecast
            } else {
                Mode::Historical
            };
            Ok((mode, Some(range)))
        }
        _ => Err(RequestError::MissingArguments),
    }
}

/// Check a resolved context against the source's capability table
///
/// Pure: depends only on the context and the static table.
pub fn check_capabilities(
    ctx: &RequestContext,
    profile: &SourceProfile,
) -> Result<(), RequestError> {
    for rule in &profile.capabilities {
        if !rule.matches(ctx.kind, ctx.mode, ctx.market) {
            continue;
        }

        match rule.capability {
            Capability::Unsupported => {
                return Err(RequestError::UnsupportedOperation {
                    ba: profile.ba_name.clone(),
                    kind: ctx.kind,
                    mode: ctx.mode,
                    market: ctx.market,
                })
            }
            Capability::DelayedBy(delay) => {
                let available_until = delay
                    .duration()
                    .and_then(|d| ctx.now.checked_sub_signed(d))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                let too_recent = match ctx.range {
                    Some(range) => range.end() > available_until,
                    None => true,
                };
                if too_recent {
                    return Err(RequestError::DataDelay {
                        ba: profile.ba_name.clone(),
                        kind: ctx.kind,
                        available_until,
                    });
                }
            }
        }
    }

    Ok(())
}
