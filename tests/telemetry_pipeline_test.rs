//! Delivery behaviour of the telemetry pipeline against a live collector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use checkout_telemetry::config::TelemetryConfig;
use checkout_telemetry::fields;
use checkout_telemetry::telemetry::{HttpTransport, Level, Telemetry};

mod common;

fn config() -> TelemetryConfig {
    let mut config = common::test_config(None).telemetry;
    config.batch_max_count = 16;
    config
}

fn start(config: &TelemetryConfig, collector: &common::MockCollector) -> (Telemetry, checkout_telemetry::telemetry::ShipperHandle) {
    let transport = HttpTransport::new(
        collector.url().parse().unwrap(),
        config.secret_token.clone(),
        Duration::from_secs(2),
    )
    .unwrap();
    Telemetry::start(config, Arc::new(transport))
}

#[tokio::test]
async fn test_enqueue_order_preserved_per_context() {
    let collector = common::start_accepting_collector().await;
    let (telemetry, shipper) = start(&config(), &collector);

    let first = telemetry.new_scope();
    let second = telemetry.new_scope();
    for i in 0..200_i64 {
        first.log(Level::Info, format!("first-{i}"), Some(fields! { "seq" => i }));
        if i % 3 == 0 {
            second.info(format!("second-{i}"));
        }
    }
    shipper.shutdown().await;

    let logs = collector.events_of("log");
    let sequence: Vec<i64> = logs
        .iter()
        .filter(|log| log["correlation"]["transaction_id"] == first.transaction_id().as_str())
        .map(|log| log["fields"]["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(sequence, (0..200).collect::<Vec<_>>());

    let second_count = logs
        .iter()
        .filter(|log| log["correlation"]["transaction_id"] == second.transaction_id().as_str())
        .count();
    assert_eq!(second_count, 67);

    // Batches never exceed the configured size.
    for payload in collector.payloads() {
        assert!(payload.lines().count() <= 1 + 16);
        let meta: serde_json::Value = serde_json::from_str(payload.lines().next().unwrap()).unwrap();
        assert_eq!(meta["metadata"]["service"]["name"], "checkout-test");
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let collector = common::start_collector(|call| if call < 2 { 503 } else { 200 }).await;
    let (telemetry, shipper) = start(&config(), &collector);

    telemetry.new_scope().warning("disk almost full");
    shipper.shutdown().await;

    assert_eq!(collector.calls(), 3);
    let logs = collector.events_of("log");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["level"], "WARNING");

    let stats = telemetry.stats();
    assert_eq!(stats.batches_sent, 1);
    assert_eq!(stats.delivery_retries, 2);
    assert_eq!(stats.batches_dropped, 0);
}

#[tokio::test]
async fn test_rejected_batch_is_dropped_without_retry() {
    let collector = common::start_collector(|_| 400).await;
    let (telemetry, shipper) = start(&config(), &collector);

    telemetry.new_scope().error("payment gateway timeout");
    shipper.shutdown().await;

    assert_eq!(collector.calls(), 1);
    let stats = telemetry.stats();
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(stats.events_in_dropped_batches, 1);
    assert_eq!(stats.delivery_retries, 0);
}

#[tokio::test]
async fn test_exhausted_retries_drop_batch() {
    let collector = common::start_collector(|_| 503).await;
    let mut config = config();
    config.retry.max_attempts = 4;
    let (telemetry, shipper) = start(&config, &collector);

    telemetry.new_scope().info("lost");
    shipper.shutdown().await;

    assert_eq!(collector.calls(), 4);
    assert_eq!(telemetry.stats().batches_dropped, 1);
    assert!(collector.events().is_empty());
}

#[tokio::test]
async fn test_shutdown_flushes_pending_batch() {
    let collector = common::start_accepting_collector().await;
    let mut config = config();
    config.batch_max_wait_ms = 60_000;
    config.batch_max_count = 1_000;
    let (telemetry, shipper) = start(&config, &collector);

    let scope = telemetry.new_scope();
    for i in 0..5 {
        scope.info(format!("pending-{i}"));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(collector.calls(), 0);

    let started = Instant::now();
    shipper.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(collector.events_of("log").len(), 5);
}

#[tokio::test]
async fn test_secret_token_and_level_filter() {
    let collector = common::start_accepting_collector().await;
    let mut config = config();
    config.secret_token = Some("s3cret".into());
    config.min_level = Level::Warning;
    let (telemetry, shipper) = start(&config, &collector);

    let scope = telemetry.new_scope();
    scope.debug("hidden");
    scope.info("hidden");
    scope.capture_message("hidden {}", &[1_i64.into()]);
    scope.warning("visible");
    scope.capture_error("ZeroDivisionError", "division by zero", "", None);
    shipper.shutdown().await;

    let logs = collector.events_of("log");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "visible");
    assert_eq!(collector.events_of("error").len(), 1);

    assert!(collector
        .auth_headers()
        .iter()
        .all(|h| h.as_deref() == Some("Bearer s3cret")));
}
