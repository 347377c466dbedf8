//! Logging initialization
//!
//! The library only emits `tracing` events. Binaries and tests that want to see them
//! install a subscriber here; `RUST_LOG` overrides the configured level.

use tracing_subscriber::EnvFilter;

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// Single line per event
    #[default]
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to compact
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset or invalid
    pub default_level: String,
    pub format: LogFormat,
    /// Include the module path of each event
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            format: LogFormat::default(),
            include_target: true,
        }
    }
}

impl LogConfig {
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            default_level: level.into(),
            ..Default::default()
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed.
pub fn init_with(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.default_level))
        .with_target(config.include_target);

    match config.format {
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    }
}

/// Install a compact subscriber with the given default level
///
/// # Examples
///
/// ```
/// # use gridnorm::logging;
/// logging::init("gridnorm=debug");
/// assert!(!logging::init("info"));
/// ```
pub fn init(default_level: &str) -> bool {
    init_with(&LogConfig::with_level(default_level))
}
