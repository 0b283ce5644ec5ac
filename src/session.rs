use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EvaluationResults, FactSpace, Listener, NullListener, Rule, RuleBase, RuleEvent, SessionConfig};
use crate::errors::Result;
use crate::types::{Arity, EventCategory};

/// Fluent builder for a [`RuleSet`], the crate's top-level entry point.
///
/// Accumulate rules and session defaults, then call [`Self::build`] to get an immutable,
/// shareable [`RuleSet`].
#[derive(Default)]
pub struct RuleSetBuilder {
    rules: Vec<Arc<dyn Rule>>,
    namespaces: Option<Vec<String>>,
    max_evaluations: Option<usize>,
    max_duration: Option<Duration>,
    max_violations: Option<usize>,
    max_arity: Option<Arity>,
    fail_on_violations: bool,
    lookups: HashMap<String, serde_json::Value>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single rule.
    pub fn with_rule(mut self, rule: Arc<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add several rules at once.
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Restrict evaluation to the given namespaces. Unset means "all namespaces".
    pub fn with_namespaces(mut self, namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    /// Cap the number of tuple evaluations performed before returning `Exhausted`.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = Some(max_evaluations);
        self
    }

    /// Cap the wall-clock duration of one evaluation before returning `Exhausted`.
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Cap the number of `Violation`-category events before returning `Exhausted`.
    pub fn with_max_violations(mut self, max_violations: usize) -> Self {
        self.max_violations = Some(max_violations);
        self
    }

    /// Cap the arity the planner will enumerate, overriding the rule base's own maximum.
    pub fn with_max_arity(mut self, max_arity: Arity) -> Self {
        self.max_arity = Some(max_arity);
        self
    }

    /// Make `evaluate` return `ViolationsExist` when any `Violation` event was recorded.
    pub fn fail_on_violations(mut self, fail: bool) -> Self {
        self.fail_on_violations = fail;
        self
    }

    /// Register a lookup table rules can read via `EvaluationContext::lookup`.
    pub fn with_lookup(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.lookups.insert(key.into(), value);
        self
    }

    /// Finalize into an immutable, shareable [`RuleSet`]. Seals the underlying rule base.
    pub fn build(self) -> RuleSet {
        let rule_base = Arc::new(RuleBase::new());
        for rule in self.rules {
            // Rules were only ever added through this builder, so duplicate (namespace,
            // name) pairs are a caller bug worth surfacing up front rather than swallowing.
            rule_base
                .add_rule(rule)
                .expect("RuleSetBuilder collected a duplicate rule name/namespace");
        }

        RuleSet {
            engine: Engine::new(rule_base),
            config: SessionConfig {
                namespaces: self.namespaces,
                max_evaluations: self.max_evaluations,
                max_duration: self.max_duration,
                max_violations: self.max_violations,
                max_arity: self.max_arity,
                fail_on_violations: self.fail_on_violations,
                // An empty match is a normal outcome for the convenience surface this
                // builder produces; only a caller driving `Engine` directly opts into
                // treating it as an error.
                throw_on_no_rules: false,
            },
            lookups: self.lookups,
        }
    }
}

/// An immutable, thread-shareable set of rules plus its default session configuration.
///
/// Cheap to clone: internally an `Arc` handle around a sealed rule base.
#[derive(Clone)]
pub struct RuleSet {
    engine: Engine,
    config: SessionConfig,
    lookups: HashMap<String, serde_json::Value>,
}

impl RuleSet {
    /// Run one evaluation over `fact_space` using this set's default configuration.
    pub fn evaluate(&self, fact_space: FactSpace) -> Result<EvaluationResults> {
        self.evaluate_with(fact_space, Arc::new(NullListener))
    }

    /// Run one evaluation with an explicit listener.
    pub fn evaluate_with(
        &self,
        fact_space: FactSpace,
        listener: Arc<dyn Listener>,
    ) -> Result<EvaluationResults> {
        self.engine.evaluate_with_lookups(
            fact_space,
            self.config.clone(),
            listener,
            self.lookups.clone(),
        )
    }

    /// Run an evaluation and summarize any `Violation` events by group.
    ///
    /// Validation is evaluation with a different lens on the same results: this never
    /// itself returns `ViolationsExist`, regardless of the set's `fail_on_violations`
    /// setting, since the violations are the answer being asked for, not a failure of
    /// the call.
    pub fn validate(&self, fact_space: FactSpace) -> Result<ValidationResult> {
        let mut config = self.config.clone();
        config.fail_on_violations = false;
        let results = self.engine.evaluate_with_lookups(
            fact_space,
            config,
            Arc::new(NullListener),
            self.lookups.clone(),
        )?;

        let mut violations_by_group: HashMap<String, Vec<RuleEvent>> = HashMap::new();
        for event in results.events.iter().filter(|e| e.category == EventCategory::Violation) {
            let group = event.group.clone().unwrap_or_default();
            violations_by_group.entry(group).or_default().push(event.clone());
        }

        Ok(ValidationResult {
            is_valid: violations_by_group.is_empty(),
            violations_by_group,
        })
    }

    /// The lookup tables registered on this set, to seed a fresh [`EvaluationContext`]
    /// when driving evaluation manually.
    pub fn lookups(&self) -> &HashMap<String, serde_json::Value> {
        &self.lookups
    }
}

/// The outcome of [`RuleSet::validate`]: whether any violation was recorded, and the
/// violations themselves bucketed by the group their rule supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations_by_group: HashMap<String, Vec<RuleEvent>>,
}

impl ValidationResult {
    /// Total violation count across all groups.
    pub fn violation_count(&self) -> usize {
        self.violations_by_group.values().map(Vec::len).sum()
    }
}
