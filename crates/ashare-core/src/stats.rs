//! Usage counters and per-source health bookkeeping.
//!
//! The unified source is the only writer: it records every request outcome,
//! cache hit/miss, and provider attempt. Counters are monotonic until an
//! explicit [`UsageStats::reset`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::data_source::SourceError;
use crate::ProviderId;

/// Rolling per-provider attempt record.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_latency_ms: u64,
    pub avg_latency_ms: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_failure_at: Option<OffsetDateTime>,
    #[serde(skip)]
    total_latency_ms: u64,
}

impl ProviderStatus {
    fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_error: None,
            last_latency_ms: 0,
            avg_latency_ms: 0,
            last_success_at: None,
            last_failure_at: None,
            total_latency_ms: 0,
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        let latency_ms = latency.as_millis().min(u128::from(u64::MAX)) as u64;
        self.last_latency_ms = latency_ms;
        self.total_latency_ms = self.total_latency_ms.saturating_add(latency_ms);
        let attempts = self.success_count + self.failure_count;
        if attempts > 0 {
            self.avg_latency_ms = self.total_latency_ms / attempts;
        }
    }
}

/// Consistent point-in-time view of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
    /// Hits as a percentage of all cache lookups.
    pub cache_hit_rate: f64,
    pub source_usage: HashMap<ProviderId, ProviderStatus>,
}

/// Passive counter sink owned by one unified source instance.
#[derive(Debug, Default)]
pub struct UsageStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    providers: Mutex<HashMap<ProviderId, ProviderStatus>>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_success(&self, provider: &ProviderId, latency: Duration) {
        let mut providers = self.providers.lock().expect("stats table is not poisoned");
        let status = providers
            .entry(provider.clone())
            .or_insert_with(ProviderStatus::new);
        status.success_count += 1;
        status.consecutive_failures = 0;
        status.last_success_at = Some(OffsetDateTime::now_utc());
        status.record_latency(latency);
    }

    pub fn record_provider_failure(
        &self,
        provider: &ProviderId,
        latency: Duration,
        error: &SourceError,
    ) {
        let mut providers = self.providers.lock().expect("stats table is not poisoned");
        let status = providers
            .entry(provider.clone())
            .or_insert_with(ProviderStatus::new);
        status.failure_count += 1;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.last_error = Some(error.to_string());
        status.last_failure_at = Some(OffsetDateTime::now_utc());
        status.record_latency(latency);
    }

    /// Attempts (successes + failures) recorded against one provider.
    pub fn provider_attempts(&self, provider: &ProviderId) -> u64 {
        let providers = self.providers.lock().expect("stats table is not poisoned");
        providers
            .get(provider)
            .map(|status| status.success_count + status.failure_count)
            .unwrap_or(0)
    }

    pub fn snapshot(&self, cache_size: usize) -> StatsSnapshot {
        let source_usage = self
            .providers
            .lock()
            .expect("stats table is not poisoned")
            .clone();

        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            cache_hits as f64 / lookups as f64 * 100.0
        };

        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_size,
            cache_hit_rate,
            source_usage,
        }
    }

    /// Zeroes every counter and drops all per-provider records.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.providers
            .lock()
            .expect("stats table is not poisoned")
            .clear();
    }
}
