//! Rules: conditions, definitions, cooldown gate and the rule store

pub mod condition;
pub mod cooldown;
pub mod rule;
pub mod store;

pub use condition::{evaluate, matches_all, AlertCondition, ConditionOperator};
pub use cooldown::{CooldownGate, TriggerState};
pub use rule::{AlertRule, DEFAULT_COOLDOWN};
pub use store::RuleStore;
