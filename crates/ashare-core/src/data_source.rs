//! Source adapter contract and request types.
//!
//! Every upstream provider is reachable only through the [`DataSource`]
//! trait. The unified source treats all adapters uniformly: it never
//! branches on a concrete provider beyond priority ordering and per-source
//! bookkeeping.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Bar, Period, ProviderId, Quote, Symbol, ValidationError};

/// Logical operation routed across sources, also part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Realtime,
    History,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::History => "history",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level failure classification.
///
/// Timeout, rate limiting and unavailability are transient and eligible for
/// retry; a missing instrument or malformed payload is terminal for the
/// provider and triggers immediate failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Timeout,
    RateLimited,
    NotFound,
    Malformed,
    Unavailable,
}

impl SourceErrorKind {
    pub const fn retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Unavailable)
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "source.timeout",
            Self::RateLimited => "source.rate_limited",
            Self::NotFound => "source.not_found",
            Self::Malformed => "source.malformed",
            Self::Unavailable => "source.unavailable",
        }
    }
}

/// Structured error returned by source adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.code())
    }
}

impl std::error::Error for SourceError {}

/// Validated request payload for history endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub start: Date,
    pub end: Date,
    pub period: Period,
}

impl HistoryRequest {
    /// Build a request; `end` defaults to today (UTC) when omitted.
    pub fn new(
        symbol: Symbol,
        start: Date,
        end: Option<Date>,
        period: Period,
    ) -> Result<Self, ValidationError> {
        let end = end.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        Ok(Self {
            symbol,
            start,
            end,
            period,
        })
    }

    /// Stable parameter fingerprint used in cache keys.
    pub fn fingerprint(&self) -> String {
        format!(
            "start={}|end={}|period={}",
            self.start, self.end, self.period
        )
    }
}

pub type SourceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations wrap one upstream provider (HTTP scraping, SDK calls,
/// local files, ...) and normalize its raw payloads into domain types. They
/// must be `Send + Sync`; the unified source shares them across tasks.
pub trait DataSource: Send + Sync {
    /// Unique identifier used in priority lists and bookkeeping.
    fn id(&self) -> ProviderId;

    /// Fetches the current quote for one canonical symbol.
    fn fetch_realtime<'a>(&'a self, symbol: Symbol) -> SourceFuture<'a, Quote>;

    /// Fetches history bars for the requested range and period.
    fn fetch_history<'a>(&'a self, request: HistoryRequest) -> SourceFuture<'a, Vec<Bar>>;
}
