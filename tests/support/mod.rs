//! Scripted source adapters shared by the behavior tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ashare_core::{
    Bar, DataSource, HistoryRequest, ProviderId, Quote, SourceError, SourceErrorKind,
    SourceFuture, Symbol,
};
use time::macros::datetime;
use time::Date;

/// Route `log` output to the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn id(name: &str) -> ProviderId {
    ProviderId::new(name).expect("valid provider id")
}

pub fn sample_quote(source: &str, symbol: &str, price: f64) -> Quote {
    Quote {
        symbol: Symbol::parse(symbol).expect("valid symbol"),
        price,
        change: 0.23,
        change_percent: 1.88,
        open: price - 0.15,
        high: price + 0.15,
        low: price - 0.24,
        pre_close: price - 0.23,
        volume: 1_000_000,
        amount: price * 1_000_000.0,
        as_of: datetime!(2024-01-15 15:00:00 +8),
        source: id(source),
    }
}

pub fn sample_bar(date: Date, close: f64) -> Bar {
    Bar {
        date,
        open: close - 0.1,
        high: close + 0.1,
        low: close - 0.2,
        close,
        volume: 500_000,
        amount: close * 500_000.0,
    }
}

fn error_of(kind: SourceErrorKind) -> SourceError {
    match kind {
        SourceErrorKind::Timeout => SourceError::timeout("scripted timeout"),
        SourceErrorKind::RateLimited => SourceError::rate_limited("scripted rate limit"),
        SourceErrorKind::NotFound => SourceError::not_found("scripted not found"),
        SourceErrorKind::Malformed => SourceError::malformed("scripted malformed payload"),
        SourceErrorKind::Unavailable => SourceError::unavailable("scripted outage"),
    }
}

/// Adapter with scripted replies and call counters.
pub struct MockSource {
    id: ProviderId,
    quote_reply: Result<Quote, SourceErrorKind>,
    bars_reply: Result<Vec<Bar>, SourceErrorKind>,
    delay: Duration,
    realtime_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl MockSource {
    pub fn serving(name: &str, quote: Quote) -> Self {
        Self {
            id: id(name),
            quote_reply: Ok(quote),
            bars_reply: Err(SourceErrorKind::NotFound),
            delay: Duration::ZERO,
            realtime_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, kind: SourceErrorKind) -> Self {
        Self {
            id: id(name),
            quote_reply: Err(kind),
            bars_reply: Err(kind),
            delay: Duration::ZERO,
            realtime_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, bars: Vec<Bar>) -> Self {
        self.bars_reply = Ok(bars);
        self
    }

    /// Delay applied inside every scripted reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of realtime fetches issued against this adapter.
    pub fn realtime_calls(&self) -> usize {
        self.realtime_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

impl DataSource for MockSource {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn fetch_realtime<'a>(&'a self, _symbol: Symbol) -> SourceFuture<'a, Quote> {
        self.realtime_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.quote_reply.clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.map_err(error_of)
        })
    }

    fn fetch_history<'a>(&'a self, _request: HistoryRequest) -> SourceFuture<'a, Vec<Bar>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.bars_reply.clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.map_err(error_of)
        })
    }
}
