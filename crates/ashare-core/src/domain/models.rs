use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Period, ProviderId, Symbol};

/// Normalized real-time quote as delivered by the unified source.
///
/// Providers populate these fields freely from their raw feeds; the quality
/// gate is the trust boundary that decides whether a quote is plausible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub volume: u64,
    /// Turnover in CNY.
    pub amount: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub as_of: OffsetDateTime,
    pub source: ProviderId,
}

/// Single OHLCV history bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub amount: f64,
}

/// Accepted history series: bars ascending by date, no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: Symbol,
    pub period: Period,
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: Symbol, period: Period, bars: Vec<Bar>) -> Self {
        Self {
            symbol,
            period,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
