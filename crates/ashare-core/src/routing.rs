//! The unified data source: failover routing over registered adapters.
//!
//! One [`UnifiedDataSource`] instance owns its cache, single-flight table,
//! configuration and usage counters; there is no process-wide state. Per
//! request the flow is: normalize the symbol, consult the cache, then walk
//! the configured priority list sequentially. Each provider call runs under
//! the retry policy and each successful payload must pass the quality gate
//! before it is cached and returned. Only exhaustion of the whole list (or
//! invalid input, or an elapsed deadline) is visible to the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use time::Date;

use crate::cache::{CacheStore, Flight, SingleFlight};
use crate::data_source::{DataSource, HistoryRequest, Operation, SourceError, SourceFuture};
use crate::quality;
use crate::retry::{Backoff, RetryPolicy};
use crate::stats::{StatsSnapshot, UsageStats};
use crate::{Bar, BarSeries, DataError, Period, ProviderId, Quote, Symbol, ValidationError};

/// Liquid instrument used to probe source availability (Ping An Bank).
const PROBE_SYMBOL: &str = "000001";

/// Runtime configuration of the unified source.
///
/// Replacing the configuration affects requests issued afterwards; a request
/// already in flight keeps the snapshot captured at its start.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Failover order. Empty means "registration order", resolved at
    /// construction time.
    pub source_priority: Vec<ProviderId>,
    /// When false the cache is bypassed entirely: no reads, no writes, no
    /// request coalescing.
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Upper bound on live cache entries; unbounded when `None`. Read once
    /// at construction.
    pub cache_capacity: Option<usize>,
    /// Per-attempt timeout applied inside the retry policy.
    pub attempt_timeout: Duration,
    /// Retry budget per provider; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_priority: Vec::new(),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: None,
            attempt_timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Result of probing one source via [`UnifiedDataSource::test_all_sources`].
#[derive(Debug, Clone, Serialize)]
pub struct SourceProbe {
    pub available: bool,
    pub latency_ms: u64,
    pub last_error: Option<String>,
}

/// Adapter registry and failover engine; the crate's primary entry point.
pub struct UnifiedDataSource {
    adapters: Arc<HashMap<ProviderId, Arc<dyn DataSource>>>,
    config: RwLock<Arc<SourceConfig>>,
    cache: CacheStore,
    flights: Arc<SingleFlight>,
    stats: Arc<UsageStats>,
}

impl UnifiedDataSource {
    /// Build with default configuration; failover order is the registration
    /// order of `adapters`.
    pub fn new(adapters: Vec<Arc<dyn DataSource>>) -> Self {
        Self::with_config(adapters, SourceConfig::default())
    }

    pub fn with_config(adapters: Vec<Arc<dyn DataSource>>, mut config: SourceConfig) -> Self {
        if config.source_priority.is_empty() {
            config.source_priority = adapters.iter().map(|adapter| adapter.id()).collect();
        }
        config.source_priority = dedupe_chain(&config.source_priority);

        let registry = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();

        Self {
            adapters: Arc::new(registry),
            cache: CacheStore::new(config.cache_capacity),
            flights: Arc::new(SingleFlight::new()),
            stats: Arc::new(UsageStats::new()),
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<SourceConfig> {
        Arc::clone(&self.config.read().expect("config lock is not poisoned"))
    }

    /// Replace the configuration for requests issued after this call.
    pub fn configure(&self, mut config: SourceConfig) {
        config.source_priority = dedupe_chain(&config.source_priority);
        let mut slot = self.config.write().expect("config lock is not poisoned");
        *slot = Arc::new(config);
    }

    /// Current quote for `symbol`, served from cache when fresh.
    pub async fn get_realtime(&self, symbol: &str) -> Result<Quote, DataError> {
        self.stats.record_request();

        let symbol = match Symbol::parse(symbol) {
            Ok(symbol) => symbol,
            Err(error) => {
                self.stats.record_failure();
                return Err(DataError::InvalidSymbol(error));
            }
        };

        let config = self.config();
        let key = cache_key(Operation::Realtime, &symbol, "");

        let fetch_symbol = symbol.clone();
        let chain = run_source_chain(
            Arc::clone(&self.adapters),
            Arc::clone(&self.stats),
            Arc::clone(&config),
            Operation::Realtime,
            symbol,
            move |source| source.fetch_realtime(fetch_symbol.clone()),
            quality::check_quote,
        );

        let result = self.resolve(key, &config, chain).await.and_then(|body| {
            serde_json::from_str::<Quote>(&body).map_err(DataError::from)
        });
        self.finish(result)
    }

    /// History bars for `symbol` over `[start, end]` (end defaults to
    /// today), served from cache when fresh.
    pub async fn get_history(
        &self,
        symbol: &str,
        start: Date,
        end: Option<Date>,
        period: Period,
    ) -> Result<BarSeries, DataError> {
        self.stats.record_request();

        let request = match Symbol::parse(symbol)
            .and_then(|symbol| HistoryRequest::new(symbol, start, end, period))
        {
            Ok(request) => request,
            Err(error) => {
                self.stats.record_failure();
                return Err(DataError::InvalidSymbol(error));
            }
        };

        let config = self.config();
        let key = cache_key(Operation::History, &request.symbol, &request.fingerprint());
        let symbol = request.symbol.clone();

        let fetch_request = request.clone();
        let chain = run_source_chain(
            Arc::clone(&self.adapters),
            Arc::clone(&self.stats),
            Arc::clone(&config),
            Operation::History,
            symbol.clone(),
            move |source| source.fetch_history(fetch_request.clone()),
            |bars: &Vec<Bar>| quality::check_bars(bars),
        );

        let result = self.resolve(key, &config, chain).await.and_then(|body| {
            let bars = serde_json::from_str::<Vec<Bar>>(&body)?;
            Ok(BarSeries::new(symbol, period, bars))
        });
        self.finish(result)
    }

    /// [`Self::get_realtime`] bounded by an overall deadline covering the
    /// whole failover chain. When the deadline elapses mid-chain the caller
    /// gets a timeout, but an in-flight fetch keeps running and may still
    /// warm the cache for later callers.
    pub async fn get_realtime_within(
        &self,
        symbol: &str,
        deadline: Duration,
    ) -> Result<Quote, DataError> {
        match tokio::time::timeout(deadline, self.get_realtime(symbol)).await {
            Ok(result) => result,
            Err(_) => {
                self.stats.record_failure();
                Err(DataError::DeadlineElapsed {
                    deadline_ms: deadline.as_millis().min(u128::from(u64::MAX)) as u64,
                })
            }
        }
    }

    /// [`Self::get_history`] bounded by an overall deadline.
    pub async fn get_history_within(
        &self,
        symbol: &str,
        start: Date,
        end: Option<Date>,
        period: Period,
        deadline: Duration,
    ) -> Result<BarSeries, DataError> {
        match tokio::time::timeout(deadline, self.get_history(symbol, start, end, period)).await {
            Ok(result) => result,
            Err(_) => {
                self.stats.record_failure();
                Err(DataError::DeadlineElapsed {
                    deadline_ms: deadline.as_millis().min(u128::from(u64::MAX)) as u64,
                })
            }
        }
    }

    /// Probe every source in the priority list with one uncached quote
    /// fetch against a liquid instrument. Updates per-source bookkeeping
    /// but not request counters.
    pub async fn test_all_sources(&self) -> HashMap<ProviderId, SourceProbe> {
        let config = self.config();
        let probe_symbol = Symbol::parse(PROBE_SYMBOL).expect("probe symbol is valid");

        let mut report = HashMap::with_capacity(config.source_priority.len());
        for provider in &config.source_priority {
            let Some(adapter) = self.adapters.get(provider) else {
                report.insert(
                    provider.clone(),
                    SourceProbe {
                        available: false,
                        latency_ms: 0,
                        last_error: Some(format!("source '{provider}' is not registered")),
                    },
                );
                continue;
            };

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                config.attempt_timeout,
                adapter.fetch_realtime(probe_symbol.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::timeout(format!(
                    "probe exceeded {}ms",
                    config.attempt_timeout.as_millis()
                ))),
            };
            let outcome = outcome.and_then(|quote| {
                quality::check_quote(&quote)
                    .map(|()| quote)
                    .map_err(gate_rejection)
            });
            let latency = started.elapsed();

            match outcome {
                Ok(_) => {
                    self.stats.record_provider_success(provider, latency);
                    report.insert(
                        provider.clone(),
                        SourceProbe {
                            available: true,
                            latency_ms: elapsed_ms(started),
                            last_error: None,
                        },
                    );
                }
                Err(error) => {
                    self.stats.record_provider_failure(provider, latency, &error);
                    report.insert(
                        provider.clone(),
                        SourceProbe {
                            available: false,
                            latency_ms: elapsed_ms(started),
                            last_error: Some(error.to_string()),
                        },
                    );
                }
            }
        }

        report
    }

    /// Read-only counter snapshot, including the current cache size.
    pub async fn usage_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.cache.len().await)
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        debug!("cache cleared");
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Cache lookup plus single-flight guarded execution of `chain`.
    ///
    /// The chain runs in a spawned task so an abandoned caller (overall
    /// deadline) still leaves best-effort cache warming behind.
    async fn resolve<F>(
        &self,
        key: String,
        config: &SourceConfig,
        chain: F,
    ) -> Result<String, DataError>
    where
        F: std::future::Future<Output = Result<String, DataError>> + Send + 'static,
    {
        if !config.cache_enabled {
            return chain.await;
        }

        if let Some(body) = self.cache.get(&key).await {
            self.stats.record_cache_hit();
            debug!("cache hit for '{key}'");
            return Ok(body);
        }
        self.stats.record_cache_miss();

        let rx = match self.flights.begin(&key) {
            Flight::Leader { tx, rx } => {
                let cache = self.cache.clone();
                let flights = Arc::clone(&self.flights);
                let ttl = config.cache_ttl;
                let flight_key = key;
                tokio::spawn(async move {
                    let outcome = chain.await;
                    if let Ok(body) = &outcome {
                        cache.put(flight_key.clone(), body.clone(), ttl).await;
                    }
                    flights.finish(&flight_key, &tx, outcome);
                });
                rx
            }
            Flight::Waiter(rx) => rx,
        };

        SingleFlight::wait(rx).await
    }

    fn finish<T>(&self, result: Result<T, DataError>) -> Result<T, DataError> {
        match &result {
            Ok(_) => self.stats.record_success(),
            Err(_) => self.stats.record_failure(),
        }
        result
    }
}

/// Walk the priority list sequentially, one provider at a time: retry
/// policy around each call, quality gate on each success. Returns the first
/// accepted payload, JSON-encoded for caching and fan-out.
#[allow(clippy::too_many_arguments)]
async fn run_source_chain<T, F, G>(
    adapters: Arc<HashMap<ProviderId, Arc<dyn DataSource>>>,
    stats: Arc<UsageStats>,
    config: Arc<SourceConfig>,
    operation: Operation,
    symbol: Symbol,
    mut invoke: F,
    gate: G,
) -> Result<String, DataError>
where
    T: Serialize,
    F: for<'a> FnMut(&'a dyn DataSource) -> SourceFuture<'a, T>,
    G: Fn(&T) -> Result<(), ValidationError>,
{
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        attempt_timeout: config.attempt_timeout,
        backoff: config.backoff,
    };

    let mut providers_tried = 0;
    let mut last_error = SourceError::unavailable("no sources configured");

    for provider in &config.source_priority {
        let Some(adapter) = adapters.get(provider) else {
            warn!("source '{provider}' is not registered, skipping");
            last_error = SourceError::unavailable(format!("source '{provider}' is not registered"));
            continue;
        };

        providers_tried += 1;
        let started = Instant::now();
        let outcome = policy
            .run_observed(
                || {
                    let attempt = invoke(adapter.as_ref());
                    let gate = &gate;
                    async move {
                        let value = attempt.await?;
                        gate(&value).map_err(gate_rejection)?;
                        Ok(value)
                    }
                },
                |latency, attempt_outcome| match attempt_outcome {
                    Ok(()) => stats.record_provider_success(provider, latency),
                    Err(error) => stats.record_provider_failure(provider, latency, error),
                },
            )
            .await;

        match outcome {
            Ok(value) => {
                debug!(
                    "{operation} {symbol} served by '{provider}' in {}ms",
                    elapsed_ms(started)
                );
                return serde_json::to_string(&value).map_err(DataError::from);
            }
            Err(error) => {
                warn!("source '{provider}' failed {operation} for {symbol}: {error}");
                last_error = error;
            }
        }
    }

    Err(DataError::Exhausted {
        operation,
        symbol,
        providers_tried,
        last_error,
    })
}

fn gate_rejection(issue: ValidationError) -> SourceError {
    SourceError::malformed(format!("quality gate rejected payload: {issue}"))
}

fn cache_key(operation: Operation, symbol: &Symbol, fingerprint: &str) -> String {
    if fingerprint.is_empty() {
        format!("{operation}|{symbol}")
    } else {
        format!("{operation}|{symbol}|{fingerprint}")
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(chain.len());

    for provider in chain {
        if seen.insert(provider.clone()) {
            output.push(provider.clone());
        }
    }

    output
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
