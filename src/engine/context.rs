use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use crate::engine::fact_space::{FactRef, FactSpace, Identity, Selector};
use crate::engine::listener::{safe_notify, Listener, NullListener};
use crate::engine::results::{EvaluationResults, RuleEvent};
use crate::engine::rule::Rule;
use crate::engine::tuple::Tuple;
use crate::errors::{Result, RuleEngineError};
use crate::types::{Arity, EventCategory};

/// Per-evaluation tuning knobs, set once when a session is built.
///
/// Defaults (500,000 evaluations, 10 second wall-clock budget, unbounded violations)
/// match the engine's own stated defaults; `max_duration` is enforced on a monotonic
/// clock, never wall-clock `DateTime`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// If set, only rules whose namespace is in this list are considered.
    pub namespaces: Option<Vec<String>>,
    /// If set, evaluation stops (with [`RuleEngineError::Exhausted`]) after this many
    /// rule-condition evaluations (one per `Rule::evaluate` call that is actually
    /// reached, not per dequeued tuple). Defaults to 500,000.
    pub max_evaluations: Option<usize>,
    /// If set, evaluation stops (with [`RuleEngineError::Exhausted`]) after this much
    /// wall-clock time, measured on a monotonic clock. Defaults to 10 seconds.
    pub max_duration: Option<Duration>,
    /// If set, evaluation stops (with [`RuleEngineError::Exhausted`]) once more than this
    /// many `Violation`-category events have been recorded. Defaults to unbounded.
    pub max_violations: Option<usize>,
    /// Caps the arity the planner will enumerate, even if a rule with higher arity is
    /// registered. `None` means "use the rule base's own max arity".
    pub max_arity: Option<Arity>,
    /// Whether evaluation should return [`RuleEngineError::ViolationsExist`] when any
    /// `Violation`-category event was recorded. Defaults to `false`.
    pub fail_on_violations: bool,
    /// Whether evaluation should return [`RuleEngineError::NoRulesEvaluated`] when no
    /// tuple was ever evaluated. Defaults to `true`; `RuleSet::evaluate`/`validate`
    /// suppress it since an empty match is a normal outcome for those convenience calls.
    pub throw_on_no_rules: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespaces: None,
            max_evaluations: Some(500_000),
            max_duration: Some(Duration::from_millis(10_000)),
            max_violations: None,
            max_arity: None,
            fail_on_violations: false,
            throw_on_no_rules: true,
        }
    }
}

/// Everything a rule's `evaluate`/`fire` can reach: the fact space, accumulated results,
/// a listener, lookup tables, and a small cross-rule scratch space, all behind interior
/// mutability since rules only ever see a shared reference.
pub struct EvaluationContext {
    fact_space: RwLock<FactSpace>,
    results: Mutex<EvaluationResults>,
    listener: Arc<dyn Listener>,
    lookups: HashMap<String, serde_json::Value>,
    shared: Mutex<HashMap<String, serde_json::Value>>,
    config: SessionConfig,
    start: Instant,
    mutated: AtomicBool,
    claimed_mutexes: Mutex<HashSet<String>>,
    fired_once: Mutex<HashSet<(String, String, Vec<u32>)>>,
}

impl EvaluationContext {
    pub fn new(fact_space: FactSpace, config: SessionConfig) -> Self {
        Self::with_listener(fact_space, config, Arc::new(NullListener))
    }

    pub fn with_listener(
        fact_space: FactSpace,
        config: SessionConfig,
        listener: Arc<dyn Listener>,
    ) -> Self {
        Self::with_lookups(fact_space, config, listener, HashMap::new())
    }

    /// Full constructor, pre-seeding the lookup tables a [`crate::RuleSetBuilder`]
    /// collected via `with_lookup` so rule consequences can read them through
    /// [`Self::lookup`].
    pub fn with_lookups(
        fact_space: FactSpace,
        config: SessionConfig,
        listener: Arc<dyn Listener>,
        lookups: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            fact_space: RwLock::new(fact_space),
            results: Mutex::new(EvaluationResults::new()),
            listener,
            lookups,
            shared: Mutex::new(HashMap::new()),
            config,
            start: Instant::now(),
            mutated: AtomicBool::new(false),
            claimed_mutexes: Mutex::new(HashSet::new()),
            fired_once: Mutex::new(HashSet::new()),
        }
    }

    /// Register a lookup table a rule can later read via [`Self::lookup`].
    pub fn set_lookup(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.lookups.insert(key.into(), value);
    }

    /// Read-only access to the fact space, e.g. for the planner to enumerate active types.
    pub(crate) fn fact_space(&self) -> RwLockReadGuard<'_, FactSpace> {
        self.fact_space.read().unwrap()
    }

    /// Resolve a candidate tuple's selectors to live facts, or `None` if any of them
    /// were invalidated since the plan that produced this candidate was built.
    pub(crate) fn resolve(&self, selectors: &[Selector]) -> Option<Vec<FactRef>> {
        self.fact_space.read().unwrap().resolve(selectors)
    }

    pub(crate) fn listener(&self) -> &Arc<dyn Listener> {
        &self.listener
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Insert a new fact into working memory, making it visible to subsequent tuple
    /// candidates once the plan is rebuilt.
    pub fn insert<T: Any + Send + Sync>(&self, fact: T) -> Result<Identity> {
        let (identity, _selector) = self.fact_space.write().unwrap().add(fact)?;
        self.mutated.store(true, Ordering::SeqCst);
        Ok(identity)
    }

    /// Modify the fact in `tuple` that is reference-identical to `fact`, invalidating its
    /// current selector and issuing a fresh one for the same identity.
    ///
    /// A `fact` pointer not found among `tuple`'s bindings is a silent no-op: a rule
    /// author passing the wrong reference has nothing correct to fall back to, and this
    /// mirrors how the underlying production-rule model treats it.
    pub fn modify<T: Any>(&self, tuple: &Tuple, fact: &T) -> Result<()> {
        let Some(selector) = tuple
            .facts()
            .into_iter()
            .find(|f| f.points_to(fact))
            .map(|f| f.selector())
        else {
            return Ok(());
        };
        if self.fact_space.write().unwrap().modify(selector).is_some() {
            self.mutated.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Retract the fact in `tuple` that is reference-identical to `fact`.
    ///
    /// Like [`Self::modify`], a pointer that does not match any fact currently bound in
    /// `tuple` is a silent no-op.
    pub fn retract<T: Any>(&self, tuple: &Tuple, fact: &T) -> Result<()> {
        let Some(selector) = tuple
            .facts()
            .into_iter()
            .find(|f| f.points_to(fact))
            .map(|f| f.selector())
        else {
            return Ok(());
        };
        if self.fact_space.write().unwrap().retract(selector) {
            self.mutated.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Record an event raised by `rule`'s consequence: `template` is a positional-format
    /// string (`"Order {0} exceeds"`) substituted against `args` to produce the formatted
    /// message, falling back to the raw template if substitution yields a blank string.
    /// Deduplicated by `(category, rule_name, group, template)`; the formatted message is
    /// not part of that identity.
    pub fn event(
        &self,
        rule: &dyn Rule,
        category: EventCategory,
        group: Option<String>,
        template: impl Into<String>,
        args: &[String],
    ) {
        let template = template.into();
        let mut message = template.clone();
        for (i, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{i}}}"), arg);
        }
        if message.trim().is_empty() {
            message = template.clone();
        }

        let event = RuleEvent {
            rule_name: rule.name().to_string(),
            namespace: rule.namespace().to_string(),
            category,
            template,
            message,
            group,
            recorded_at: chrono::Utc::now(),
        };
        safe_notify("debug", || self.listener.debug(&event.message));
        self.results.lock().unwrap().record_event(event);
    }

    /// Add `n` to the running affirmations total (`score = affirmations − vetos`).
    pub fn affirm(&self, n: i64) {
        self.results.lock().unwrap().affirmations += n;
    }

    /// Add `n` to the running vetos total (`score = affirmations − vetos`).
    pub fn veto(&self, n: i64) {
        self.results.lock().unwrap().vetos += n;
    }

    /// Read a previously registered lookup table.
    pub fn lookup(&self, key: &str) -> Result<&serde_json::Value> {
        self.lookups
            .get(key)
            .ok_or_else(|| RuleEngineError::LookupMissing(key.to_string()))
    }

    /// Read a value from the cross-rule scratch space.
    pub fn shared_get(&self, key: &str) -> Option<serde_json::Value> {
        self.shared.lock().unwrap().get(key).cloned()
    }

    /// Write a value into the cross-rule scratch space.
    pub fn shared_set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.shared.lock().unwrap().insert(key.into(), value);
    }

    /// Try to claim a mutex group for this evaluation. An empty `mutex` name always
    /// succeeds (it means "no mutex"). Once claimed, no other rule sharing the same
    /// mutex name may fire for the remainder of this evaluation.
    pub(crate) fn try_claim_mutex(&self, mutex: &str) -> bool {
        if mutex.is_empty() {
            return true;
        }
        self.claimed_mutexes.lock().unwrap().insert(mutex.to_string())
    }

    /// Whether `(namespace, rule_name)` has already fired for this exact set of fact
    /// identities in this evaluation.
    pub(crate) fn has_fired_once(&self, namespace: &str, rule_name: &str, identities: &[u32]) -> bool {
        self.fired_once
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), rule_name.to_string(), identities.to_vec()))
    }

    pub(crate) fn mark_fired_once(&self, namespace: &str, rule_name: &str, identities: &[u32]) {
        self.fired_once
            .lock()
            .unwrap()
            .insert((namespace.to_string(), rule_name.to_string(), identities.to_vec()));
    }

    pub(crate) fn record_fired(&self, namespace: &str, rule_name: &str) {
        self.results.lock().unwrap().record_fired(namespace, rule_name);
    }

    pub(crate) fn record_mutex_winner(&self, mutex: &str, rule_name: &str) {
        self.results
            .lock()
            .unwrap()
            .record_mutex_winner(mutex, rule_name);
    }

    /// Number of `Violation`-category events recorded so far, for `max_violations`
    /// enforcement mid-tuple.
    pub(crate) fn violation_count(&self) -> usize {
        self.results.lock().unwrap().violation_count()
    }

    /// Whether `insert`/`modify`/`retract` has been called since the last
    /// [`Self::take_mutated`], signalling the evaluation plan must be rebuilt.
    pub(crate) fn take_mutated(&self) -> bool {
        self.mutated.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn record_evaluated(&self, count: usize) {
        self.results.lock().unwrap().total_evaluated += count;
    }

    pub(crate) fn total_evaluated(&self) -> usize {
        self.results.lock().unwrap().total_evaluated
    }

    /// Consume the context, stamping `completed` and folding the scratch space into the
    /// returned results. Called from the finalization tail, which always runs even when
    /// the evaluation is about to return an error.
    pub fn into_results(self) -> EvaluationResults {
        let mut results = self.results.into_inner().unwrap();
        results.shared = self.shared.into_inner().unwrap();
        results.completed = Some(chrono::Utc::now());
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rule::ClosureRule;
    use std::any::TypeId;

    #[derive(Debug)]
    struct Order {
        total: f64,
    }

    #[test]
    fn insert_marks_context_mutated() {
        let ctx = EvaluationContext::new(FactSpace::new(), SessionConfig::default());
        assert!(!ctx.take_mutated());
        ctx.insert(Order { total: 1.0 }).unwrap();
        assert!(ctx.take_mutated());
        assert!(!ctx.take_mutated(), "take_mutated should clear the flag");
    }

    #[test]
    fn modify_on_unbound_fact_is_a_no_op() {
        let mut fs = FactSpace::new();
        let (_id, selector) = fs.add(Order { total: 1.0 }).unwrap();
        let tuple = Tuple::from_refs(fs.resolve(&[selector]).unwrap()).unwrap();
        let ctx = EvaluationContext::new(fs, SessionConfig::default());

        let other = Order { total: 2.0 };
        ctx.modify(&tuple, &other).unwrap();
        assert!(!ctx.take_mutated(), "modifying an unbound reference must be a no-op");
    }

    #[test]
    fn lookup_missing_key_errors() {
        let ctx = EvaluationContext::new(FactSpace::new(), SessionConfig::default());
        assert!(matches!(
            ctx.lookup("rates"),
            Err(RuleEngineError::LookupMissing(_))
        ));
    }

    #[test]
    fn violation_event_carries_its_group() {
        let ctx = EvaluationContext::new(FactSpace::new(), SessionConfig::default());
        let rule = ClosureRule::new(
            "MinTotal",
            vec![TypeId::of::<Order>()],
            |_t, _c| true,
            |_r, _t, _c| Ok(()),
        );
        ctx.event(
            &rule,
            EventCategory::Violation,
            Some("orders".to_string()),
            "total too low",
            &[],
        );
        let results = ctx.into_results();
        assert_eq!(results.violation_count(), 1);
        assert_eq!(results.events[0].group.as_deref(), Some("orders"));
    }

    #[test]
    fn affirm_and_veto_combine_into_score() {
        let ctx = EvaluationContext::new(FactSpace::new(), SessionConfig::default());
        ctx.affirm(10);
        ctx.affirm(15);
        ctx.veto(0);
        let results = ctx.into_results();
        assert_eq!(results.affirmations, 25);
        assert_eq!(results.vetos, 0);
        assert_eq!(results.score(), 25);
    }

    #[test]
    fn into_results_stamps_completed_and_carries_shared() {
        let ctx = EvaluationContext::new(FactSpace::new(), SessionConfig::default());
        ctx.shared_set("winner", serde_json::json!("A"));
        let results = ctx.into_results();
        assert!(results.completed.is_some());
        assert_eq!(results.shared.get("winner"), Some(&serde_json::json!("A")));
    }
}
