//! Condition evaluation
//!
//! A condition tests one named field of a data mapping against one
//! operator/value pair. A rule matches when every one of its conditions holds
//! against the same data.
//!
//! Absent fields compare `false` for every operator except `ne` (an absent
//! field is "not equal" to anything).

use crate::core::{AlertError, Fields, Result, Value};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "gt", alias = "greater_than")]
    Gt,
    #[serde(rename = "lt", alias = "less_than")]
    Lt,
    #[serde(rename = "eq", alias = "equals")]
    Eq,
    #[serde(rename = "ne", alias = "not_equals")]
    Ne,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "regex")]
    Regex,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gt" | "greater_than" => Ok(Self::Gt),
            "lt" | "less_than" => Ok(Self::Lt),
            "eq" | "equals" => Ok(Self::Eq),
            "ne" | "not_equals" => Ok(Self::Ne),
            "contains" => Ok(Self::Contains),
            "exists" => Ok(Self::Exists),
            "regex" => Ok(Self::Regex),
            other => Err(AlertError::Validation(format!(
                "unknown condition operator '{}'",
                other
            ))),
        }
    }
}

/// One field/operator/value test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl AlertCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Lt, value)
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOperator::Eq, value)
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, ConditionOperator::Exists, Value::Null)
    }

    /// Check the condition is well-formed (field named, regex compiles)
    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(AlertError::missing_field("conditions.field"));
        }
        if self.operator == ConditionOperator::Regex {
            let pattern = self.value.as_str().ok_or_else(|| {
                AlertError::Validation(format!(
                    "regex condition on '{}' needs a string pattern, got {}",
                    self.field,
                    self.value.type_name()
                ))
            })?;
            Regex::new(pattern).map_err(|e| {
                AlertError::Validation(format!("invalid regex '{}' on field '{}': {}", pattern, self.field, e))
            })?;
        }
        Ok(())
    }

    /// Evaluate against a data mapping
    pub fn evaluate(&self, data: &Fields) -> bool {
        evaluate(self, data)
    }
}

/// Evaluate one condition against `data`
pub fn evaluate(condition: &AlertCondition, data: &Fields) -> bool {
    let Some(actual) = data.get(&condition.field) else {
        return condition.operator == ConditionOperator::Ne;
    };

    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Gt => actual.numeric_cmp(expected) == Some(Ordering::Greater),
        ConditionOperator::Lt => actual.numeric_cmp(expected) == Some(Ordering::Less),
        ConditionOperator::Eq => actual == expected,
        ConditionOperator::Ne => actual != expected,
        ConditionOperator::Contains => match (actual.as_str(), expected.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
        ConditionOperator::Exists => true,
        ConditionOperator::Regex => match expected.as_str() {
            Some(pattern) => regex_matches(pattern, &actual.to_string()),
            None => false,
        },
    }
}

/// AND over all conditions. An empty list matches.
pub fn matches_all(conditions: &[AlertCondition], data: &Fields) -> bool {
    conditions.iter().all(|c| evaluate(c, data))
}

fn regex_cache() -> &'static DashMap<String, Option<Regex>> {
    static CACHE: OnceLock<DashMap<String, Option<Regex>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

fn regex_matches(pattern: &str, input: &str) -> bool {
    if let Some(compiled) = regex_cache().get(pattern) {
        return compiled.as_ref().is_some_and(|re| re.is_match(input));
    }

    let compiled = match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "Invalid regex in condition, treating as non-matching");
            None
        }
    };
    let matched = compiled.as_ref().is_some_and(|re| re.is_match(input));
    regex_cache().insert(pattern.to_string(), compiled);
    matched
}
