use std::any::TypeId;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::context::EvaluationContext;
use crate::engine::tuple::Tuple;
use crate::errors::Result;
use crate::types::Arity;

/// The contract a rule must satisfy to be admitted into a [`crate::engine::rule_base::RuleBase`].
///
/// The engine never introspects a rule beyond this contract: `evaluate` and `fire` are
/// opaque to it. A fluent condition/consequence builder can lower to an implementation
/// of this trait; [`ClosureRule`] is the thin, generic implementation such a builder
/// would target.
pub trait Rule: Send + Sync {
    /// Unique name within this rule's namespace.
    fn name(&self) -> &str;

    /// Optional namespace, used for filtering which rules a session considers.
    fn namespace(&self) -> &str {
        ""
    }

    /// Priority used to order rules firing on the same tuple. Higher values run first.
    /// Defaults to 500.
    fn salience(&self) -> i32 {
        500
    }

    /// Mutual-exclusion group name. An empty string means "no mutex".
    fn mutex(&self) -> &str {
        ""
    }

    /// Whether this rule may fire at most once per `(rule, identity)` in a session.
    fn fires_once(&self) -> bool {
        false
    }

    /// The earliest timestamp at which this rule is eligible to fire. `None` means
    /// unbounded (always eligible from the start of time).
    fn inception(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// The timestamp after which this rule is no longer eligible to fire. `None` means
    /// unbounded.
    fn expiration(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// This rule's arity: how many facts its tuple binds.
    fn arity(&self) -> Arity;

    /// The concrete fact types this rule is declared over, in tuple position order.
    /// Must have exactly `self.arity().as_usize()` entries.
    fn fact_types(&self) -> Vec<TypeId>;

    /// Evaluate this rule's conditions against a candidate tuple. Pure: may read lookup
    /// tables and shared state via `ctx`, but must not mutate facts.
    fn evaluate(&self, tuple: &Tuple, ctx: &EvaluationContext) -> bool;

    /// Execute this rule's consequence. May emit events, adjust score, and call
    /// `insert`/`modify`/`retract` through `ctx`.
    fn fire(&self, tuple: &Tuple, ctx: &EvaluationContext) -> Result<()>;

    /// Whether this rule is active at `timestamp`, per its inception/expiration window.
    fn is_active_at(&self, timestamp: DateTime<Utc>) -> bool {
        if let Some(inception) = self.inception() {
            if timestamp < inception {
                return false;
            }
        }
        if let Some(expiration) = self.expiration() {
            if timestamp > expiration {
                return false;
            }
        }
        true
    }
}

type EvaluateFn = dyn Fn(&Tuple, &EvaluationContext) -> bool + Send + Sync;
type FireFn = dyn Fn(&dyn Rule, &Tuple, &EvaluationContext) -> Result<()> + Send + Sync;

/// A generic [`Rule`] implementation that wraps two closures plus metadata — the "thin,
/// opaque" rule shape that a fluent builder would eventually lower to.
pub struct ClosureRule {
    name: String,
    namespace: String,
    salience: i32,
    mutex: String,
    fires_once: bool,
    inception: Option<DateTime<Utc>>,
    expiration: Option<DateTime<Utc>>,
    arity: Arity,
    fact_types: Vec<TypeId>,
    evaluate: Arc<EvaluateFn>,
    fire: Arc<FireFn>,
}

impl ClosureRule {
    /// Start building a rule named `name` over the given concrete fact types (1..=4 of
    /// them), with `evaluate` and `fire` closures.
    pub fn new(
        name: impl Into<String>,
        fact_types: Vec<TypeId>,
        evaluate: impl Fn(&Tuple, &EvaluationContext) -> bool + Send + Sync + 'static,
        fire: impl Fn(&dyn Rule, &Tuple, &EvaluationContext) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let arity = Arity::from_usize(fact_types.len())
            .expect("ClosureRule fact_types length must be 1..=4");
        Self {
            name: name.into(),
            namespace: String::new(),
            salience: 500,
            mutex: String::new(),
            fires_once: false,
            inception: None,
            expiration: None,
            arity,
            fact_types,
            evaluate: Arc::new(evaluate),
            fire: Arc::new(fire),
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the salience (higher fires first).
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Set the mutex group name.
    pub fn with_mutex(mut self, mutex: impl Into<String>) -> Self {
        self.mutex = mutex.into();
        self
    }

    /// Mark this rule as fire-once per identity.
    pub fn with_fires_once(mut self, fires_once: bool) -> Self {
        self.fires_once = fires_once;
        self
    }

    /// Set the inception timestamp.
    pub fn with_inception(mut self, inception: DateTime<Utc>) -> Self {
        self.inception = Some(inception);
        self
    }

    /// Set the expiration timestamp.
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

impl Rule for ClosureRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn salience(&self) -> i32 {
        self.salience
    }

    fn mutex(&self) -> &str {
        &self.mutex
    }

    fn fires_once(&self) -> bool {
        self.fires_once
    }

    fn inception(&self) -> Option<DateTime<Utc>> {
        self.inception
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn fact_types(&self) -> Vec<TypeId> {
        self.fact_types.clone()
    }

    fn evaluate(&self, tuple: &Tuple, ctx: &EvaluationContext) -> bool {
        (self.evaluate)(tuple, ctx)
    }

    fn fire(&self, tuple: &Tuple, ctx: &EvaluationContext) -> Result<()> {
        (self.fire)(self, tuple, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order {
        total: f64,
    }

    #[test]
    fn closure_rule_reports_metadata() {
        let rule = ClosureRule::new(
            "HighValue",
            vec![TypeId::of::<Order>()],
            |_tuple, _ctx| true,
            |_rule, _tuple, _ctx| Ok(()),
        )
        .with_salience(900)
        .with_mutex("shipping")
        .with_fires_once(true);

        assert_eq!(rule.name(), "HighValue");
        assert_eq!(rule.salience(), 900);
        assert_eq!(rule.mutex(), "shipping");
        assert!(rule.fires_once());
        assert_eq!(rule.arity(), Arity::One);
    }
}
