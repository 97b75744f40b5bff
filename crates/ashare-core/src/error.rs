use thiserror::Error;
use time::Date;

use crate::data_source::{Operation, SourceError};
use crate::Symbol;

/// Validation and contract errors exposed by `ashare-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol '{value}' must contain a 5-6 digit numeric body")]
    SymbolNotNumeric { value: String },
    #[error("symbol '{value}' has unknown market tag '{tag}', expected SH or SZ")]
    UnknownMarketTag { value: String, tag: String },
    #[error("symbol '{value}': market tag disagrees with the code's leading digit")]
    MarketMismatch { value: String },
    #[error("code '{value}' does not map to a known market, expected leading 6, 0 or 3")]
    UnknownMarket { value: String },

    #[error("invalid period '{value}', expected one of daily, weekly, monthly")]
    InvalidPeriod { value: String },
    #[error("invalid source id '{value}', expected lowercase ascii letters, digits, '_' or '-'")]
    InvalidSourceId { value: String },
    #[error("history range start {start} is after end {end}")]
    InvertedRange { start: Date, end: Date },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("quote high must be >= low")]
    InvalidQuoteRange,
    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("history series cannot be empty")]
    EmptyHistory,
    #[error("bars must be in ascending date order at index {index}")]
    UnsortedBars { index: usize },
    #[error("duplicate bar date {date}")]
    DuplicateBarDate { date: Date },
}

/// Top-level error surfaced to callers of the unified source.
///
/// Transient per-provider failures stay inside the failover loop; callers
/// only ever observe invalid input, exhaustion of the whole priority list,
/// or an elapsed overall deadline.
#[derive(Debug, Error, Clone)]
pub enum DataError {
    #[error(transparent)]
    InvalidSymbol(#[from] ValidationError),

    #[error(
        "all sources failed for {operation} {symbol} after {providers_tried} provider(s): {last_error}"
    )]
    Exhausted {
        operation: Operation,
        symbol: Symbol,
        providers_tried: u32,
        last_error: SourceError,
    },

    #[error("request deadline of {deadline_ms}ms elapsed before any source answered")]
    DeadlineElapsed { deadline_ms: u64 },

    #[error("in-flight fetch ended without reporting an outcome")]
    Interrupted,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DataError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
