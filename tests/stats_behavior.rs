//! Usage counters observed through the public surface.

mod support;

use std::sync::Arc;
use std::time::Duration;

use ashare_core::{Backoff, DataError, SourceConfig, SourceErrorKind, UnifiedDataSource};
use support::{id, sample_quote, MockSource};

fn fast_config(priority: &[&str]) -> SourceConfig {
    SourceConfig {
        source_priority: priority.iter().map(|name| id(name)).collect(),
        attempt_timeout: Duration::from_millis(500),
        max_retries: 0,
        backoff: Backoff::Fixed {
            delay: Duration::ZERO,
        },
        ..SourceConfig::default()
    }
}

#[tokio::test]
async fn exhaustion_is_one_failed_request_and_one_miss() {
    let abu = Arc::new(MockSource::failing("abu", SourceErrorKind::Unavailable));
    let ashare = Arc::new(MockSource::failing("ashare", SourceErrorKind::Unavailable));
    let source = UnifiedDataSource::with_config(
        vec![abu.clone(), ashare.clone()],
        fast_config(&["abu", "ashare"]),
    );

    let error = source
        .get_realtime("000001")
        .await
        .expect_err("all sources down");
    assert!(matches!(error, DataError::Exhausted { .. }));

    let stats = source.usage_stats().await;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 0);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.cache_size, 0);

    for provider in ["abu", "ashare"] {
        let status = stats.source_usage.get(&id(provider)).expect("tracked");
        assert_eq!(status.success_count, 0);
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.is_some());
        assert!(status.last_failure_at.is_some());
        assert!(status.last_success_at.is_none());
    }
}

#[tokio::test]
async fn failure_streak_grows_across_requests() {
    let abu = Arc::new(MockSource::failing("abu", SourceErrorKind::Unavailable));
    let ashare = Arc::new(MockSource::serving(
        "ashare",
        sample_quote("ashare", "000001", 12.45),
    ));
    let mut config = fast_config(&["abu", "ashare"]);
    config.cache_enabled = false;
    let source = UnifiedDataSource::with_config(vec![abu.clone(), ashare.clone()], config);

    source.get_realtime("000001").await.expect("ashare serves");
    source.get_realtime("000001").await.expect("ashare serves");

    let stats = source.usage_stats().await;
    let abu_status = stats.source_usage.get(&id("abu")).expect("tracked");
    assert_eq!(abu_status.failure_count, 2);
    assert_eq!(abu_status.consecutive_failures, 2);

    let ashare_status = stats.source_usage.get(&id("ashare")).expect("tracked");
    assert_eq!(ashare_status.success_count, 2);
    assert_eq!(ashare_status.consecutive_failures, 0);
}

#[tokio::test]
async fn mixed_traffic_produces_consistent_counters() {
    let abu = Arc::new(MockSource::serving("abu", sample_quote("abu", "000001", 12.45)));
    let source = UnifiedDataSource::with_config(vec![abu.clone()], fast_config(&["abu"]));

    source.get_realtime("000001").await.expect("served");
    source.get_realtime("000001").await.expect("cached");
    source.get_realtime("bogus").await.expect_err("invalid");

    let stats = source.usage_stats().await;
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.successful_requests, 2);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert!((stats.cache_hit_rate - 50.0).abs() < f64::EPSILON);

    let status = stats.source_usage.get(&id("abu")).expect("tracked");
    assert_eq!(status.success_count, 1);
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_success_at.is_some());
}

#[tokio::test]
async fn reset_clears_counters_but_not_the_cache() {
    let abu = Arc::new(MockSource::serving("abu", sample_quote("abu", "000001", 12.45)));
    let source = UnifiedDataSource::with_config(vec![abu.clone()], fast_config(&["abu"]));

    source.get_realtime("000001").await.expect("served");
    assert_eq!(source.usage_stats().await.total_requests, 1);

    source.reset_stats();

    let stats = source.usage_stats().await;
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.successful_requests, 0);
    assert_eq!(stats.cache_hits, 0);
    assert!(stats.source_usage.is_empty());
    // The payload cache is untouched by a stats reset.
    assert_eq!(stats.cache_size, 1);

    source.get_realtime("000001").await.expect("cached");
    assert_eq!(abu.realtime_calls(), 1);
    assert_eq!(source.usage_stats().await.cache_hits, 1);
}

#[tokio::test]
async fn snapshot_serializes_for_reporting() {
    let abu = Arc::new(MockSource::serving("abu", sample_quote("abu", "000001", 12.45)));
    let source = UnifiedDataSource::with_config(vec![abu], fast_config(&["abu"]));

    source.get_realtime("000001").await.expect("served");

    let stats = source.usage_stats().await;
    let body = serde_json::to_string(&stats).expect("must serialize");
    assert!(body.contains("\"total_requests\":1"));
    assert!(body.contains("\"abu\""));
}
