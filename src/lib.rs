//! gridnorm - Temporal normalization and aggregation engine for grid operator data
//!
//! Converts heterogeneous raw reports published by electricity grid operators
//! (balancing authorities) into one canonical time-series shape: a UTC timestamp,
//! a source identifier, a market/frequency pair, and exactly one of generation by
//! fuel, load, or net export.
//!
//! # Features
//! - Declarative source profiles (TOML): zone, hour convention, capability table,
//!   per-kind feeds with parser settings and category maps
//! - Delimited, tagged XML and keyed JSON parsers with shared numeric cleaning
//!   (thousands separators, decimal comma, "N.A." markers, error sentinels)
//! - Hour-ending conventions, DST markers and transition days, `report_file_for`
//! - Signed category aggregation, residual categories, hourly resampling
//! - Mode resolution (latest / yesterday / historical / forecast) with capability
//!   checks before any fetch
//!
//! # Architecture
//!
//! ```text
//! mode_resolver → query_router → source (Fetcher)
//!     → parser (csv_parser | xml_parser | json_parser) → temporal
//!     → aggregator → assembler → Vec<DataPoint>
//! ```
//!
//! `engine::Engine` drives the pipeline for one `SourceProfile`. Network access is
//! the caller's: implement `Fetcher` for your HTTP client.

pub mod aggregator;
pub mod assembler;
pub mod config;
pub mod csv_parser;
pub mod csv_utils;
pub mod engine;
pub mod error;
pub mod json_parser;
pub mod logging;
pub mod mode_resolver;
pub mod parser;
pub mod query_router;
pub mod source;
pub mod temporal;
pub mod transformations;
pub mod types;
pub mod xml_parser;

// Re-export public types for easier access
pub use config::SourceProfile;
pub use engine::Engine;
pub use error::{
    ConfigError, FetchError, GridError, IncompleteRecordError, Recovery, RequestError,
    SourceFormatError, TemporalParseError,
};
pub use mode_resolver::RequestFlags;
pub use source::{FetchRequest, FetchResponse, Fetcher, MemoryFetcher};
pub use types::{
    Category, DataKind, DataPoint, DstMarker, Freq, Fuel, Market, Measurement, Mode,
    NormalizedRecord, RawRecord, RawValue, RequestContext, TimeBasis, TimeRange,
};
