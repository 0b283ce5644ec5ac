use std::sync::Arc;

use crate::engine::context::{EvaluationContext, SessionConfig};
use crate::engine::fact_space::FactSpace;
use crate::engine::listener::{safe_notify, Listener, NullListener};
use crate::engine::plan::EvaluationPlan;
use crate::engine::rule::Rule;
use crate::engine::rule_base::RuleBase;
use crate::engine::tuple::Tuple;
use crate::engine::tuple_eval::TupleEvaluator;
use crate::errors::{Result, RuleEngineError};
use crate::types::Arity;

/// Drives one evaluation: builds an [`EvaluationPlan`], resolves and fires each candidate
/// tuple through a [`TupleEvaluator`], and rebuilds the plan whenever a consequence
/// mutates the fact space, until the plan drains or a budget is exceeded.
///
/// An `Engine` wraps a sealed [`RuleBase`] and is cheap to clone (it's an `Arc` handle),
/// so the same rule set can back many independent evaluations concurrently.
#[derive(Clone)]
pub struct Engine {
    rule_base: Arc<RuleBase>,
}

impl Engine {
    /// Wrap a rule base. The rule base is sealed lazily, on the first call to
    /// [`Self::evaluate`]/[`Self::evaluate_with`], so rules may still be added up to
    /// that point via [`Self::add_rule`].
    pub fn new(rule_base: Arc<RuleBase>) -> Self {
        Self { rule_base }
    }

    /// Add a rule before the first evaluation. Fails once the underlying rule base is
    /// sealed (i.e. after the first call to [`Self::evaluate`]).
    pub fn add_rule(&self, rule: Arc<dyn Rule>) -> Result<()> {
        self.rule_base.add_rule(rule)
    }

    /// Run one evaluation pass over `fact_space` with default session settings and no
    /// listener.
    pub fn evaluate(&self, fact_space: FactSpace) -> Result<crate::engine::results::EvaluationResults> {
        self.evaluate_with(fact_space, SessionConfig::default(), Arc::new(NullListener))
    }

    /// Run one evaluation pass with explicit session configuration and listener.
    pub fn evaluate_with(
        &self,
        fact_space: FactSpace,
        config: SessionConfig,
        listener: Arc<dyn Listener>,
    ) -> Result<crate::engine::results::EvaluationResults> {
        self.evaluate_with_lookups(fact_space, config, listener, std::collections::HashMap::new())
    }

    /// Run one evaluation pass, pre-seeding the context's lookup tables. The crate's
    /// top-level [`crate::RuleSet`] uses this to hand down the tables its builder
    /// collected via `with_lookup`; [`Self::evaluate_with`] is the common case with none.
    pub fn evaluate_with_lookups(
        &self,
        fact_space: FactSpace,
        config: SessionConfig,
        listener: Arc<dyn Listener>,
        lookups: std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<crate::engine::results::EvaluationResults> {
        self.rule_base.seal();

        let max_arity = config
            .max_arity
            .or_else(|| Arity::from_usize(self.rule_base.max_arity()))
            .unwrap_or(Arity::One);

        let ctx = EvaluationContext::with_lookups(fact_space, config.clone(), listener.clone(), lookups);
        safe_notify("begin_evaluation", || listener.begin_evaluation());

        let mut plan = EvaluationPlan::build(
            &ctx,
            &self.rule_base,
            config.namespaces.as_deref(),
            max_arity,
        );
        let evaluator = TupleEvaluator::new(&self.rule_base);

        let mut exhausted = false;
        let mut propagated_err = None;

        loop {
            if let Some(max_evaluations) = config.max_evaluations {
                if ctx.total_evaluated() >= max_evaluations {
                    exhausted = true;
                    break;
                }
            }
            if let Some(max_duration) = config.max_duration {
                if ctx.elapsed() >= max_duration {
                    exhausted = true;
                    break;
                }
            }

            let Some(selectors) = plan.next() else {
                break;
            };

            let Some(refs) = ctx.resolve(&selectors) else {
                // One of the facts in this candidate was invalidated after the plan was
                // built; skip it rather than treating it as an error.
                continue;
            };
            let tuple = Tuple::from_refs(refs).expect("selectors slice has a valid 1..=4 arity");

            let outcome = match evaluator.process(&tuple, &ctx) {
                Ok(outcome) => outcome,
                Err(err) => {
                    propagated_err = Some(err);
                    break;
                }
            };

            if outcome.exhausted {
                exhausted = true;
                break;
            }

            if outcome.mutated {
                log::debug!("engine: fact space mutated, refreshing evaluation plan");
                plan.refresh(
                    &ctx,
                    &self.rule_base,
                    config.namespaces.as_deref(),
                    max_arity,
                );
            }
        }

        safe_notify("end_evaluation", || listener.end_evaluation());

        let total_evaluated = ctx.total_evaluated();
        let elapsed_ms = ctx.elapsed().as_millis();
        let throw_on_no_rules = config.throw_on_no_rules;
        let fail_on_violations = config.fail_on_violations;
        let results = ctx.into_results();

        if let Some(err) = propagated_err {
            return Err(err);
        }
        if exhausted {
            return Err(RuleEngineError::Exhausted {
                total_evaluated,
                elapsed_ms,
                results: Box::new(results),
            });
        }
        if throw_on_no_rules && total_evaluated == 0 {
            return Err(RuleEngineError::NoRulesEvaluated);
        }
        if fail_on_violations && results.violation_count() > 0 {
            return Err(RuleEngineError::ViolationsExist {
                violation_count: results.violation_count(),
            });
        }

        Ok(results)
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
    fn evaluates_a_single_matching_fact() {
        let rule_base = Arc::new(RuleBase::new());
        rule_base
            .add_rule(Arc::new(ClosureRule::new(
                "HighValue",
                vec![TypeId::of::<Order>()],
                |tuple, _ctx| {
                    tuple
                        .facts()
                        .first()
                        .and_then(|f| f.downcast_ref::<Order>())
                        .map(|o| o.total > 100.0)
                        .unwrap_or(false)
                },
                |_rule, tuple, ctx| {
                    if let Some(order) = tuple.facts().first().and_then(|f| f.downcast_ref::<Order>()) {
                        ctx.affirm(order.total as i64);
                    }
                    Ok(())
                },
            )))
            .unwrap();

        let engine = Engine::new(rule_base);
        let mut fact_space = FactSpace::new();
        fact_space.add(Order { total: 500.0 }).unwrap();

        let results = engine.evaluate(fact_space).unwrap();
        assert_eq!(results.fired_rules.len(), 1);
        assert_eq!(results.score(), 500);
    }

    #[test]
    fn errors_when_no_rule_ever_evaluates() {
        let rule_base = Arc::new(RuleBase::new());
        let engine = Engine::new(rule_base);
        let fact_space = FactSpace::new();

        let err = engine.evaluate(fact_space).unwrap_err();
        assert!(matches!(err, RuleEngineError::NoRulesEvaluated));
    }

    #[test]
    fn insert_during_fire_rebuilds_plan_and_is_seen() {
        let rule_base = Arc::new(RuleBase::new());
        rule_base
            .add_rule(Arc::new(
                ClosureRule::new(
                    "SpawnFollowUp",
                    vec![TypeId::of::<Order>()],
                    |_tuple, _ctx| true,
                    |_rule, _tuple, ctx| {
                        ctx.insert(Order { total: 1.0 })?;
                        Ok(())
                    },
                )
                .with_fires_once(true),
            ))
            .unwrap();

        let engine = Engine::new(rule_base);
        let mut fact_space = FactSpace::new();
        fact_space.add(Order { total: 10.0 }).unwrap();

        let results = engine.evaluate(fact_space).unwrap();
        // The original fact fires once; the inserted follow-up fact also matches and
        // fires once, since the rule itself has no bound on how many distinct Orders
        // it may fire against, only on firing twice against the *same* one.
        assert_eq!(results.fired_rules.len(), 2);
    }

    #[test]
    fn exhausted_error_carries_partial_results() {
        let rule_base = Arc::new(RuleBase::new());
        rule_base
            .add_rule(Arc::new(ClosureRule::new(
                "AlwaysFires",
                vec![TypeId::of::<Order>()],
                |_tuple, _ctx| true,
                |_rule, _tuple, ctx| {
                    ctx.affirm(1);
                    Ok(())
                },
            )))
            .unwrap();

        let engine = Engine::new(rule_base);
        let mut fact_space = FactSpace::new();
        fact_space.add(Order { total: 1.0 }).unwrap();

        let config = SessionConfig {
            max_evaluations: Some(0),
            ..SessionConfig::default()
        };
        let err = engine
            .evaluate_with(fact_space, config, Arc::new(NullListener))
            .unwrap_err();
        match err {
            RuleEngineError::Exhausted { total_evaluated, results, .. } => {
                assert_eq!(total_evaluated, 0);
                assert_eq!(results.fired_rules.len(), 0);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
