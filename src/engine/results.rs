use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EventCategory;

/// A single event recorded by a rule's consequence via `EvaluationContext::event`.
/// Validation rules are ordinary rules that happen to emit `Violation`-category events
/// instead of mutating facts.
///
/// Identity for deduplication is `(category, rule_name, group, template)` — the
/// *formatted* `message` is carried alongside but is not part of that key, so two events
/// from the same template with different formatted arguments collapse into one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvent {
    /// Name of the rule that raised this event.
    pub rule_name: String,
    /// Namespace of the rule that raised this event.
    pub namespace: String,
    /// Event severity/category.
    pub category: EventCategory,
    /// The unformatted template supplied by the rule, e.g. `"Order {0} exceeds"`.
    pub template: String,
    /// The template with its positional arguments substituted in. Falls back to the raw
    /// template if substitution produced a blank string.
    pub message: String,
    /// Optional grouping key, used by `RuleSet::validate` to bucket violations.
    pub group: Option<String>,
    /// Wall-clock time the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// The accumulated outcome of one `evaluate` call: which rules fired, on what, the
/// events they raised, and the affirm/veto score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResults {
    /// `(namespace, rule_name)` pairs that fired, in firing order, one entry per firing
    /// (a rule without `fires_once` may appear more than once). `total_fired` is this
    /// vector's length.
    pub fired_rules: Vec<(String, String)>,
    /// Mutex group names that were claimed during this evaluation, and by which rule
    /// claimed them first.
    pub mutex_winners: Vec<(String, String)>,
    /// Events recorded by rule consequences, deduplicated by `(category, rule_name,
    /// group, template)` at record time.
    pub events: Vec<RuleEvent>,
    /// Total amount added via `EvaluationContext::affirm`.
    pub affirmations: i64,
    /// Total amount added via `EvaluationContext::veto`.
    pub vetos: i64,
    /// Total number of tuples whose rules were evaluated (fired or not).
    pub total_evaluated: usize,
    /// When this evaluation began.
    pub started: DateTime<Utc>,
    /// When this evaluation finished. `None` until the session's finalization tail runs,
    /// which happens even when the evaluation ends in an error.
    pub completed: Option<DateTime<Utc>>,
    /// Free-form scratch values rule consequences wrote via `EvaluationContext::shared_set`.
    pub shared: HashMap<String, serde_json::Value>,
}

impl Default for EvaluationResults {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationResults {
    pub fn new() -> Self {
        Self {
            fired_rules: Vec::new(),
            mutex_winners: Vec::new(),
            events: Vec::new(),
            affirmations: 0,
            vetos: 0,
            total_evaluated: 0,
            started: Utc::now(),
            completed: None,
            shared: HashMap::new(),
        }
    }

    pub fn record_fired(&mut self, namespace: &str, rule_name: &str) {
        self.fired_rules
            .push((namespace.to_string(), rule_name.to_string()));
    }

    pub fn record_mutex_winner(&mut self, mutex: &str, rule_name: &str) {
        self.mutex_winners
            .push((mutex.to_string(), rule_name.to_string()));
    }

    pub fn record_event(&mut self, event: RuleEvent) {
        let duplicate = self.events.iter().any(|e| {
            e.category == event.category
                && e.rule_name == event.rule_name
                && e.group == event.group
                && e.template == event.template
        });
        if !duplicate {
            self.events.push(event);
        }
    }

    /// Total number of rule firings recorded (a rule without `fires_once` may contribute
    /// more than one).
    pub fn total_fired(&self) -> usize {
        self.fired_rules.len()
    }

    /// `affirmations − vetos`, per the engine's scoring contract.
    pub fn score(&self) -> i64 {
        self.affirmations - self.vetos
    }

    /// Wall-clock span between `started` and `completed`, if the evaluation has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed.map(|completed| completed - self.started)
    }

    /// Number of `Violation`-category events recorded so far.
    pub fn violation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.category == EventCategory::Violation)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_count_ignores_other_categories() {
        let mut results = EvaluationResults::new();
        results.record_event(RuleEvent {
            rule_name: "A".into(),
            namespace: "".into(),
            category: EventCategory::Info,
            template: "hi".into(),
            message: "hi".into(),
            group: None,
            recorded_at: Utc::now(),
        });
        results.record_event(RuleEvent {
            rule_name: "B".into(),
            namespace: "".into(),
            category: EventCategory::Violation,
            template: "bad".into(),
            message: "bad".into(),
            group: Some("g1".into()),
            recorded_at: Utc::now(),
        });
        assert_eq!(results.violation_count(), 1);
    }

    #[test]
    fn duplicate_template_events_collapse_into_one() {
        let mut results = EvaluationResults::new();
        for total in [1500, 2200] {
            results.record_event(RuleEvent {
                rule_name: "HighValue".into(),
                namespace: "".into(),
                category: EventCategory::Info,
                template: "Order {0} exceeds".into(),
                message: format!("Order {total} exceeds"),
                group: Some("Pricing".into()),
                recorded_at: Utc::now(),
            });
        }
        assert_eq!(
            results.events.len(),
            1,
            "same (category, rule_name, group, template) must dedupe regardless of the formatted message"
        );
    }
}
