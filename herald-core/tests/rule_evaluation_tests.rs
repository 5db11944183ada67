//! Rule evaluation through the engine's manual trigger path
//!
//! Covers AND semantics across conditions, operator boundaries, disabled
//! rules and cooldown exclusivity under concurrent triggers.

use chrono::{Duration as ChronoDuration, Utc};
use herald_core::{
    fields, AlertCondition, AlertEngine, AlertRule, AlertSeverity, ConditionOperator, EngineConfig, TriggerOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn engine() -> AlertEngine {
    AlertEngine::new(EngineConfig::default().with_queue_sizes(100, 10_000)).unwrap()
}

fn rule(conditions: Vec<AlertCondition>) -> AlertRule {
    let mut rule = AlertRule::new("test", "test_event", AlertSeverity::Info)
        .with_message("fired")
        .with_cooldown(Duration::ZERO);
    rule.conditions = conditions;
    rule
}

mod conditions {
    use super::*;

    #[test]
    fn test_all_conditions_must_hold() {
        let engine = engine();
        let id = engine
            .add_rule(rule(vec![
                AlertCondition::gt("price", 100),
                AlertCondition::eq("symbol", "BTC-USD"),
            ]))
            .unwrap()
            .id;

        let hit = engine
            .trigger_alert(&id, fields! { "price" => 101, "symbol" => "BTC-USD" })
            .unwrap();
        assert!(matches!(hit, TriggerOutcome::Fired(_)));

        let wrong_symbol = engine
            .trigger_alert(&id, fields! { "price" => 101, "symbol" => "ETH-USD" })
            .unwrap();
        assert_eq!(wrong_symbol, TriggerOutcome::ConditionsNotMet);

        let missing_field = engine.trigger_alert(&id, fields! { "price" => 101 }).unwrap();
        assert_eq!(missing_field, TriggerOutcome::ConditionsNotMet);
    }

    /// Test: strict comparisons at the boundary
    #[test]
    fn test_operator_boundaries() {
        let engine = engine();
        let gt = engine.add_rule(rule(vec![AlertCondition::gt("v", 100)])).unwrap().id;
        let lt = engine.add_rule(rule(vec![AlertCondition::lt("v", 100)])).unwrap().id;

        let at = |id: &str, v: f64| engine.trigger_alert(id, fields! { "v" => v }).unwrap();

        assert_eq!(at(gt.as_str(), 100.0), TriggerOutcome::ConditionsNotMet);
        assert!(matches!(at(gt.as_str(), 100.0001), TriggerOutcome::Fired(_)));
        assert_eq!(at(lt.as_str(), 100.0), TriggerOutcome::ConditionsNotMet);
        assert!(matches!(at(lt.as_str(), 99.9999), TriggerOutcome::Fired(_)));
    }

    #[test]
    fn test_numeric_equality_across_int_and_float() {
        let engine = engine();
        let id = engine.add_rule(rule(vec![AlertCondition::eq("qty", 5)])).unwrap().id;
        assert!(matches!(
            engine.trigger_alert(&id, fields! { "qty" => 5.0 }).unwrap(),
            TriggerOutcome::Fired(_)
        ));
    }

    #[test]
    fn test_string_operators() {
        let engine = engine();
        let contains = engine
            .add_rule(rule(vec![AlertCondition::new("msg", ConditionOperator::Contains, "halt")]))
            .unwrap()
            .id;
        let regex = engine
            .add_rule(rule(vec![AlertCondition::new("code", ConditionOperator::Regex, "^E[0-9]{3}$")]))
            .unwrap()
            .id;
        let ne = engine
            .add_rule(rule(vec![AlertCondition::new("status", ConditionOperator::Ne, "ok")]))
            .unwrap()
            .id;

        assert!(matches!(
            engine.trigger_alert(&contains, fields! { "msg" => "trading halted" }).unwrap(),
            TriggerOutcome::Fired(_)
        ));
        assert!(matches!(
            engine.trigger_alert(&regex, fields! { "code" => "E503" }).unwrap(),
            TriggerOutcome::Fired(_)
        ));
        assert_eq!(
            engine.trigger_alert(&regex, fields! { "code" => "E5031" }).unwrap(),
            TriggerOutcome::ConditionsNotMet
        );
        // A missing field is "not equal"
        assert!(matches!(
            engine.trigger_alert(&ne, fields! {}).unwrap(),
            TriggerOutcome::Fired(_)
        ));
    }

    #[test]
    fn test_exists() {
        let engine = engine();
        let id = engine.add_rule(rule(vec![AlertCondition::exists("halt")])).unwrap().id;
        assert_eq!(
            engine.trigger_alert(&id, fields! { "other" => 1 }).unwrap(),
            TriggerOutcome::ConditionsNotMet
        );
        assert!(matches!(
            engine.trigger_alert(&id, fields! { "halt" => true }).unwrap(),
            TriggerOutcome::Fired(_)
        ));
    }

    #[test]
    fn test_disabled_rule_never_fires() {
        let engine = engine();
        let id = engine
            .add_rule(rule(vec![AlertCondition::exists("x")]).disabled())
            .unwrap()
            .id;
        assert_eq!(
            engine.trigger_alert(&id, fields! { "x" => 1 }).unwrap(),
            TriggerOutcome::Disabled
        );
    }

    #[test]
    fn test_unknown_rule() {
        let engine = engine();
        assert!(engine.trigger_alert("missing", fields! {}).unwrap_err().is_not_found());
    }
}

mod cooldown {
    use super::*;

    /// Test: cooldown measured against the explicit clock, inclusive at the boundary
    #[test]
    fn test_cooldown_boundary() {
        let engine = engine();
        let id = engine
            .add_rule(rule(vec![AlertCondition::exists("x")]).with_cooldown(Duration::from_secs(300)))
            .unwrap()
            .id;
        let t0 = Utc::now();
        let data = fields! { "x" => 1 };

        assert!(matches!(
            engine.trigger_alert_at(&id, data.clone(), t0).unwrap(),
            TriggerOutcome::Fired(_)
        ));
        assert_eq!(
            engine
                .trigger_alert_at(&id, data.clone(), t0 + ChronoDuration::seconds(299))
                .unwrap(),
            TriggerOutcome::CoolingDown
        );
        assert!(matches!(
            engine
                .trigger_alert_at(&id, data, t0 + ChronoDuration::seconds(300))
                .unwrap(),
            TriggerOutcome::Fired(_)
        ));
    }

    /// Test: a non-matching trigger does not start the cooldown
    #[test]
    fn test_non_matching_does_not_consume_cooldown() {
        let engine = engine();
        let id = engine
            .add_rule(rule(vec![AlertCondition::gt("v", 10)]).with_cooldown(Duration::from_secs(300)))
            .unwrap()
            .id;
        assert_eq!(
            engine.trigger_alert(&id, fields! { "v" => 1 }).unwrap(),
            TriggerOutcome::ConditionsNotMet
        );
        assert!(matches!(
            engine.trigger_alert(&id, fields! { "v" => 11 }).unwrap(),
            TriggerOutcome::Fired(_)
        ));
    }

    /// Test: many threads racing on one rule inside its cooldown produce exactly one alert
    #[test]
    fn test_concurrent_triggers_fire_once() {
        let engine = Arc::new(engine());
        let id = engine
            .add_rule(rule(vec![AlertCondition::exists("x")]).with_cooldown(Duration::from_secs(3600)))
            .unwrap()
            .id;
        let fired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let id = id.clone();
                let fired = Arc::clone(&fired);
                thread::spawn(move || {
                    for _ in 0..50 {
                        if let TriggerOutcome::Fired(_) = engine.trigger_alert(&id, fields! { "x" => 1 }).unwrap() {
                            fired.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.metrics().total_alerts, 1);
    }
}
