//! Numeric range rules and their evaluation.
//!
//! A [`RuleSet`] maps a sensor type to an inclusive `[min, max]` range.
//! Types are matched exactly (case-sensitive) and a type without a rule is
//! always in range.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config_store::ConfigStore;
use crate::models::format_decimal;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Range {
    // ---
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Closed-interval membership.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", format_decimal(self.min), format_decimal(self.max))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(BTreeMap<String, Range>);

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sensor_type: &str) -> Option<&Range> {
        self.0.get(sensor_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn evaluate(&self, sensor_type: &str, value: f64) -> Verdict {
        // ---
        match self.get(sensor_type) {
            Some(range) if !range.contains(value) => Verdict::OutOfRange(*range),
            _ => Verdict::InRange,
        }
    }
}

impl FromIterator<(String, Range)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (String, Range)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    InRange,
    OutOfRange(Range),
}

/// Evaluates readings against the live rule set.
///
/// Nothing is cached: every call goes back to the [`ConfigStore`], so an
/// update is visible to the very next evaluation. Callers that evaluate many
/// readings in one pass take a [`RuleEngine::snapshot`] instead, which gives
/// the whole pass one consistent rule set.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: ConfigStore,
}

impl RuleEngine {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn evaluate(&self, sensor_type: &str, value: f64) -> Verdict {
        self.config.load().evaluate(sensor_type, value)
    }

    pub fn snapshot(&self) -> RuleSet {
        self.config.load()
    }
}
