//! Configuration files driving a full manager

use herald_core::testing::wait_until;
use herald_core::{AlertEvent, AlertManager, AlertingConfig, ChannelFactory};
use serde_json::json;
use std::time::Duration;

fn write_config(dir: &std::path::Path, log: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("herald.json");
    let doc = json!({
        "enabled": true,
        "channels": [
            { "type": "file", "name": "audit", "filename": log.to_string_lossy() },
            { "type": "websocket", "name": "live", "buffer": 16 }
        ],
        "rules": [
            {
                "id": "btc-high",
                "name": "BTC above 100k",
                "type": "price_alert",
                "severity": "critical",
                "conditions": [
                    { "field": "symbol", "operator": "eq", "value": "BTC-USD" },
                    { "field": "price", "operator": "gt", "value": 100000 }
                ],
                "message": "{{symbol}} hit {{price}}",
                "cooldown": "1s",
                "channels": ["audit", "live"]
            }
        ],
        "defaults": { "cooldown": "5m", "maxAlerts": 100, "retentionDays": 7 },
        "engine": { "eventWorkers": 1, "alertWorkers": 1, "sendTimeout": "2s" }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    path
}

#[test]
fn test_load_or_create_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("herald.json");

    let created = AlertingConfig::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(created, AlertingConfig::default());

    let reloaded = AlertingConfig::load(&path).unwrap();
    assert_eq!(reloaded, created);
}

#[test]
fn test_config_sections_map_to_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &dir.path().join("alerts.log"));
    let config = AlertingConfig::load(&path).unwrap();

    let engine = config.engine_config();
    assert_eq!(engine.event_workers, 1);
    assert_eq!(engine.alert_workers, 1);
    assert_eq!(engine.send_timeout, Duration::from_secs(2));
    assert_eq!(engine.max_alerts, 100);
    assert_eq!(engine.retention, Duration::from_secs(7 * 86_400));
    // Unset keys keep their defaults
    assert_eq!(engine.event_queue_size, 10_000);
}

#[test]
fn test_invalid_channel_settings_rejected() {
    let mut config = AlertingConfig::default();
    let bad: herald_core::config::ChannelConfig =
        serde_json::from_value(json!({ "type": "slack", "name": "ops" })).unwrap();
    config.channels.push(bad);

    let err = AlertManager::from_config(config).unwrap_err();
    assert!(err.is_validation(), "unexpected error: {err}");
}

#[test]
fn test_factory_reports_supported_types() {
    let factory = ChannelFactory::new();
    for kind in ["console", "file", "email", "slack", "webhook", "discord", "teams", "sms", "websocket"] {
        assert!(factory.supports(kind), "{kind} should be supported");
    }
    assert!(factory
        .create("carrier-pigeon", "coo", &json!({}))
        .unwrap_err()
        .is_validation());
}

/// Test: config file → manager → event → file channel and websocket subscriber
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manager_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("alerts.log");
    let path = write_config(dir.path(), &log);

    let manager = AlertManager::load(&path).unwrap();
    let engine = manager.engine().clone();
    assert_eq!(engine.get_rules().len(), 1);
    assert_eq!(engine.get_channels().len(), 2);

    let live = manager.websocket("live").unwrap();
    let (_id, mut subscriber) = live.attach();

    manager.start().unwrap();

    let event = |price: f64| {
        AlertEvent::new("price_alert", "feed")
            .with_field("symbol", "BTC-USD")
            .with_field("price", price)
    };
    engine.process_event(event(101_000.0)).unwrap();
    engine.process_event(event(102_000.0)).unwrap();
    engine.process_event(event(99_000.0)).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(3), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(payload["type"], "alert");
    assert_eq!(payload["data"]["severity"], "critical");
    assert_eq!(payload["data"]["rule_id"], "btc-high");

    assert!(wait_until(Duration::from_secs(3), || engine.metrics().events_processed == 3).await);
    assert!(
        wait_until(Duration::from_secs(3), || {
            std::fs::read_to_string(&log)
                .map(|s| s.lines().count() == 1)
                .unwrap_or(false)
        })
        .await
    );

    // Cooldown (1s) suppressed the second match
    assert_eq!(engine.metrics().total_alerts, 1);
    let written = std::fs::read_to_string(&log).unwrap();
    assert!(written.contains("BTC-USD hit 101000"));

    manager.shutdown().await.unwrap();
    manager.shutdown().await.unwrap();
}
