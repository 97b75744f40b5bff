//! # ashare-core
//!
//! Unified A-share market data core. Aggregates multiple unreliable
//! upstream providers behind one stable interface, delivering real-time
//! quotes and history bars with sequential failover, per-provider retry,
//! TTL caching with single-flight deduplication, symbol normalization and
//! data-quality gating.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL payload cache and single-flight coalescing |
//! | [`data_source`] | Source adapter contract and request types |
//! | [`domain`] | Domain models (Symbol, Quote, Bar, Period) |
//! | [`error`] | Error taxonomy |
//! | [`quality`] | Post-fetch payload validation |
//! | [`retry`] | Backoff and per-provider retry policy |
//! | [`routing`] | The unified source and failover engine |
//! | [`source`] | Provider identifiers |
//! | [`stats`] | Usage counters and per-source bookkeeping |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ashare_core::{DataSource, UnifiedDataSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapters: Vec<Arc<dyn DataSource>> = vec![
//!         Arc::new(AbuAdapter::default()),
//!         Arc::new(AshareAdapter::default()),
//!     ];
//!     let source = UnifiedDataSource::new(adapters);
//!
//!     let quote = source.get_realtime("sz000001").await?;
//!     println!("{}: {:.2}", quote.symbol, quote.price);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Per-provider failures (timeouts, rate limits, bad payloads) stay inside
//! the failover loop. Callers observe only [`DataError::InvalidSymbol`],
//! [`DataError::Exhausted`] or [`DataError::DeadlineElapsed`].

pub mod cache;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod quality;
pub mod retry;
pub mod routing;
pub mod source;
pub mod stats;

// Re-export commonly used types at crate root for convenience

pub use cache::{CacheStore, SingleFlight};

pub use data_source::{
    DataSource, HistoryRequest, Operation, SourceError, SourceErrorKind, SourceFuture,
};

pub use domain::{Bar, BarSeries, Market, Period, Quote, Symbol};

pub use error::{DataError, ValidationError};

pub use retry::{Backoff, RetryPolicy};

pub use routing::{SourceConfig, SourceProbe, UnifiedDataSource};

pub use source::ProviderId;

pub use stats::{ProviderStatus, StatsSnapshot, UsageStats};
