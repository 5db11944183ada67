//! End-to-end tests for the alert engine pipeline
//!
//! These tests verify:
//! 1. Events flow through rule matching to every referenced channel
//! 2. A failing channel does not block delivery to the others
//! 3. Cooldown suppresses repeat alerts until it expires
//! 4. Messages are rendered from templates and event data
//! 5. Start/stop lifecycle and the errors around it

use herald_core::testing::{price_event, price_rule, wait_until, FailingChannel, RecordingChannel, SlowChannel};
use herald_core::{
    fields, AlertCondition, AlertEngine, AlertError, AlertEvent, AlertRule, AlertSeverity, EngineConfig,
    EngineState, TriggerOutcome, Value,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn engine() -> Arc<AlertEngine> {
    Arc::new(AlertEngine::new(EngineConfig::default().with_workers(2, 2)).unwrap())
}

mod delivery {
    use super::*;

    /// Test: one matching event produces one alert on each referenced channel
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_reaches_all_channels() {
        let engine = engine();
        let a = Arc::new(RecordingChannel::new("a"));
        let b = Arc::new(RecordingChannel::new("b"));
        engine.register_channel(a.clone());
        engine.register_channel(b.clone());
        engine.add_rule(price_rule(100.0).with_channels(["a", "b"])).unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("BTC-USD", 105.5)).unwrap();

        assert!(wait_until(WAIT, || a.count() == 1 && b.count() == 1).await);
        let alert = &a.alerts()[0];
        assert_eq!(alert.alert_type, "price_alert");
        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert_eq!(alert.message, "BTC-USD at 105.5");
        assert_eq!(b.alerts()[0].id, alert.id);

        engine.stop().await.unwrap();
    }

    /// Test: non-matching events never create alerts
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_non_matching_event_ignored() {
        let engine = engine();
        let a = Arc::new(RecordingChannel::new("a"));
        engine.register_channel(a.clone());
        engine.add_rule(price_rule(100.0).with_channel("a")).unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("BTC-USD", 95.0)).unwrap();
        engine.process_event(AlertEvent::new("volume_alert", "feed").with_field("price", 500.0)).unwrap();

        assert!(wait_until(WAIT, || engine.metrics().events_processed == 2).await);
        assert_eq!(a.count(), 0);
        assert_eq!(engine.metrics().total_alerts, 0);

        engine.stop().await.unwrap();
    }

    /// Test: a failing channel is isolated from a healthy one
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_channel_failure_isolated() {
        let engine = engine();
        let good = Arc::new(RecordingChannel::new("good"));
        let bad = Arc::new(FailingChannel::new("bad"));
        engine.register_channel(good.clone());
        engine.register_channel(bad.clone());
        engine.add_rule(price_rule(100.0).with_channels(["good", "bad"])).unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("ETH-USD", 150.0)).unwrap();

        assert!(wait_until(WAIT, || engine.metrics().processed_alerts == 1).await);
        assert_eq!(good.count(), 1);
        assert_eq!(bad.attempts(), 1);

        let metrics = engine.metrics();
        assert_eq!(metrics.failed_alerts, 1);
        assert_eq!(metrics.alerts_by_channel.get("good"), Some(&1));
        assert_eq!(metrics.channel_failures.get("bad"), Some(&1));

        engine.stop().await.unwrap();
    }

    /// Test: a channel slower than the send timeout counts as a failure
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_channel_times_out() {
        let config = EngineConfig::default().with_send_timeout(Duration::from_millis(50));
        let engine = AlertEngine::new(config).unwrap();
        let slow = Arc::new(SlowChannel::new("slow", Duration::from_secs(5)));
        let fast = Arc::new(RecordingChannel::new("fast"));
        engine.register_channel(slow.clone());
        engine.register_channel(fast.clone());
        engine.add_rule(price_rule(1.0).with_channels(["slow", "fast"])).unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("SOL-USD", 2.0)).unwrap();

        assert!(wait_until(WAIT, || engine.metrics().processed_alerts == 1).await);
        assert_eq!(fast.count(), 1);
        assert_eq!(slow.delivered(), 0);
        assert_eq!(engine.metrics().channel_failures.get("slow"), Some(&1));

        engine.stop().await.unwrap();
    }

    /// Test: unknown channel names are skipped at delivery time
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_channel_skipped() {
        let engine = engine();
        let a = Arc::new(RecordingChannel::new("a"));
        engine.register_channel(a.clone());
        engine.add_rule(price_rule(1.0).with_channels(["a", "nowhere"])).unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("BTC-USD", 2.0)).unwrap();

        assert!(wait_until(WAIT, || engine.metrics().processed_alerts == 1).await);
        assert_eq!(a.count(), 1);
        assert_eq!(engine.metrics().failed_alerts, 0);

        engine.stop().await.unwrap();
    }
}

mod cooldown {
    use super::*;

    /// Test: two events inside the cooldown yield one alert; after it expires, another
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cooldown_window() {
        let engine = engine();
        let rec = Arc::new(RecordingChannel::new("rec"));
        engine.register_channel(rec.clone());
        engine
            .add_rule(price_rule(100.0).with_cooldown(Duration::from_secs(1)).with_channel("rec"))
            .unwrap();
        engine.start().unwrap();

        engine.process_event(price_event("BTC-USD", 101.0)).unwrap();
        engine.process_event(price_event("BTC-USD", 102.0)).unwrap();
        assert!(wait_until(WAIT, || engine.metrics().events_processed == 2).await);
        assert!(wait_until(WAIT, || rec.count() == 1).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        engine.process_event(price_event("BTC-USD", 103.0)).unwrap();
        assert!(wait_until(WAIT, || rec.count() == 2).await);
        assert_eq!(engine.metrics().total_alerts, 2);

        engine.stop().await.unwrap();
    }

    /// Test: manual triggers share the cooldown with event-driven ones
    #[tokio::test]
    async fn test_manual_trigger_respects_cooldown() {
        let engine = engine();
        let rule = engine
            .add_rule(price_rule(100.0).with_cooldown(Duration::from_secs(60)))
            .unwrap();
        let data = fields! { "price" => 150.0, "symbol" => "BTC-USD" };

        let first = engine.trigger_alert(&rule.id, data.clone()).unwrap();
        assert!(matches!(first, TriggerOutcome::Fired(_)));
        let second = engine.trigger_alert(&rule.id, data).unwrap();
        assert_eq!(second, TriggerOutcome::CoolingDown);
    }
}

mod templating {
    use super::*;

    /// Test: named templates render event data, unknown placeholders stay verbatim
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_named_template_rendering() {
        let engine = engine();
        engine
            .formatter()
            .register("whale", "{{symbol}} whale trade {{size}} on {{venue}}")
            .unwrap();
        let rec = Arc::new(RecordingChannel::new("rec"));
        engine.register_channel(rec.clone());
        engine
            .add_rule(
                AlertRule::new("Whale", "trade", AlertSeverity::Info)
                    .with_condition(AlertCondition::gt("size", 1000))
                    .with_template("whale")
                    .with_cooldown(Duration::ZERO)
                    .with_channel("rec"),
            )
            .unwrap();
        engine.start().unwrap();

        engine
            .process_event(
                AlertEvent::new("trade", "tape")
                    .with_field("symbol", "ETH-USD")
                    .with_field("size", 2500),
            )
            .unwrap();

        assert!(wait_until(WAIT, || rec.count() == 1).await);
        assert_eq!(rec.alerts()[0].message, "ETH-USD whale trade 2500 on {{venue}}");

        engine.stop().await.unwrap();
    }

    /// Test: alert data carries the rule and event context
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_alert_data_enriched() {
        let engine = engine();
        let rec = Arc::new(RecordingChannel::new("rec"));
        engine.register_channel(rec.clone());
        let rule = engine.add_rule(price_rule(1.0).with_channel("rec")).unwrap();
        engine.start().unwrap();

        let event = price_event("BTC-USD", 2.0);
        let event_id = event.id.clone();
        engine.process_event(event).unwrap();

        assert!(wait_until(WAIT, || rec.count() == 1).await);
        let data = rec.alerts()[0].data.clone();
        assert_eq!(data["rule_id"], Value::from(rule.id.as_str()));
        assert_eq!(data["event_id"], Value::from(event_id));
        assert_eq!(data["source"], Value::from("test-feed"));

        engine.stop().await.unwrap();
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let engine = engine();
        engine.start().unwrap();
        assert!(engine.start().unwrap_err().is_lifecycle());
        engine.stop().await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_rejected() {
        let engine = engine();
        let err = engine.stop().await.unwrap_err();
        assert!(matches!(
            err,
            AlertError::Lifecycle {
                state: EngineState::Created,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stopped_engine_rejects_work() {
        let engine = engine();
        let rule = engine.add_rule(price_rule(1.0)).unwrap();
        engine.start().unwrap();
        engine.stop().await.unwrap();

        assert!(engine.process_event(price_event("BTC-USD", 2.0)).unwrap_err().is_lifecycle());
        assert!(engine
            .trigger_alert(&rule.id, fields! { "price" => 2.0 })
            .unwrap_err()
            .is_lifecycle());
        assert!(engine.start().unwrap_err().is_lifecycle());
    }

    /// Test: events queued before start are processed once workers run
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_events_queued_before_start() {
        let engine = engine();
        let rec = Arc::new(RecordingChannel::new("rec"));
        engine.register_channel(rec.clone());
        engine.add_rule(price_rule(1.0).with_channel("rec")).unwrap();

        engine.process_event(price_event("BTC-USD", 2.0)).unwrap();
        engine.start().unwrap();

        assert!(wait_until(WAIT, || rec.count() == 1).await);
        engine.stop().await.unwrap();
    }
}
