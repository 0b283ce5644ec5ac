use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

use chrono::Utc;

use crate::engine::context::EvaluationContext;
use crate::engine::listener::safe_notify;
use crate::engine::rule::Rule;
use crate::engine::rule_base::RuleBase;
use crate::engine::tuple::Tuple;
use crate::errors::Result;

/// What happened while firing one tuple's eligible rules, reported back to the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleOutcome {
    /// Whether a consequence called `insert`/`modify`/`retract`, meaning the plan must
    /// be rebuilt before any further tuple is processed.
    pub mutated: bool,
    /// Whether a budget (`max_violations`, `max_evaluations`, or `max_duration`) was
    /// exceeded while firing this tuple's rules, meaning the driver must stop the whole
    /// evaluation rather than merely rebuild the plan. Checked between rules, not just
    /// between tuples, so a single tuple with many eligible rules can't itself blow an
    /// evaluation or time budget unnoticed.
    pub exhausted: bool,
}

/// Resolves one candidate tuple against the rule base and fires whichever of its rules
/// are eligible, highest salience first.
///
/// Caches the rule set for the last-seen tuple signature: the evaluation plan enqueues
/// work arity-by-arity and signature-by-signature, so contiguous runs of same-shape
/// tuples are the common case, and re-querying `RuleBase::find_rules` for each one would
/// be wasted work.
pub struct TupleEvaluator<'a> {
    rule_base: &'a RuleBase,
    cached: RefCell<Option<(Vec<TypeId>, Vec<Arc<dyn Rule>>)>>,
}

impl<'a> TupleEvaluator<'a> {
    pub fn new(rule_base: &'a RuleBase) -> Self {
        Self {
            rule_base,
            cached: RefCell::new(None),
        }
    }

    /// Evaluate and fire rules for `tuple`. Returns what the driver needs to know to
    /// decide whether to rebuild the plan or stop the evaluation entirely.
    pub fn process(&self, tuple: &Tuple, ctx: &EvaluationContext) -> Result<TupleOutcome> {
        let listener = ctx.listener().clone();
        safe_notify("begin_tuple", || listener.begin_tuple(tuple));

        let type_ids: Vec<_> = tuple.facts().iter().map(|f| f.type_id()).collect();
        let rules = {
            let mut cached = self.cached.borrow_mut();
            let hit = matches!(cached.as_ref(), Some((cached_types, _)) if *cached_types == type_ids);
            if !hit {
                let rules = self
                    .rule_base
                    .find_rules(&type_ids, ctx.config().namespaces.as_deref());
                *cached = Some((type_ids.clone(), rules));
            }
            cached.as_ref().expect("just populated above if it was missing").1.clone()
        };

        let now = Utc::now();
        let identities: Vec<u32> = tuple.facts().iter().map(|f| f.identity().as_u32()).collect();

        let mut fireable: Vec<_> = rules
            .into_iter()
            .filter(|rule| rule.is_active_at(now))
            .filter(|rule| !(rule.fires_once() && ctx.has_fired_once(rule.namespace(), rule.name(), &identities)))
            .filter(|rule| {
                // `total_evaluated` counts condition checks, not dequeued tuples: a rule
                // rejected earlier (inactive, already fired-once) never reaches this point
                // and is not counted, matching the filtering order in the engine's contract.
                ctx.record_evaluated(1);
                rule.evaluate(tuple, ctx)
            })
            .collect();

        // Higher salience fires first; a stable sort preserves enumeration order among ties.
        fireable.sort_by(|a, b| b.salience().cmp(&a.salience()));

        let mut outcome = TupleOutcome::default();

        for rule in &fireable {
            if !ctx.try_claim_mutex(rule.mutex()) {
                safe_notify("debug", || {
                    listener.debug(&format!(
                        "rule '{}' lost mutex '{}' to an earlier firing",
                        rule.name(),
                        rule.mutex()
                    ))
                });
                continue;
            }

            safe_notify("firing", || listener.firing(rule.as_ref(), tuple));
            rule.fire(tuple, ctx)?;

            ctx.record_fired(rule.namespace(), rule.name());
            if !rule.mutex().is_empty() {
                ctx.record_mutex_winner(rule.mutex(), rule.name());
            }
            if rule.fires_once() {
                ctx.mark_fired_once(rule.namespace(), rule.name(), &identities);
            }

            let modifications_occurred = ctx.take_mutated();
            if modifications_occurred {
                outcome.mutated = true;
            }
            safe_notify("fired", || {
                listener.fired(rule.as_ref(), tuple, modifications_occurred)
            });

            if let Some(max_violations) = ctx.config().max_violations {
                if ctx.violation_count() > max_violations {
                    outcome.exhausted = true;
                }
            }
            if let Some(max_evaluations) = ctx.config().max_evaluations {
                if ctx.total_evaluated() >= max_evaluations {
                    outcome.exhausted = true;
                }
            }
            if let Some(max_duration) = ctx.config().max_duration {
                if ctx.elapsed() >= max_duration {
                    outcome.exhausted = true;
                }
            }

            if outcome.mutated || outcome.exhausted {
                // Either the tuple's own facts may no longer be valid, or a budget has
                // been blown; either way, stop this tuple's loop and let the driver
                // decide whether to rebuild the plan or stop the evaluation entirely.
                break;
            }
        }

        safe_notify("end_tuple", || listener.end_tuple(tuple));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::SessionConfig;
    use crate::engine::fact_space::FactSpace;
    use crate::engine::rule::ClosureRule;
    use std::any::TypeId;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Order {
        total: f64,
    }

    fn build_tuple(fs: &mut FactSpace) -> Tuple {
        let (_id, selector) = fs.add(Order { total: 500.0 }).unwrap();
        Tuple::from_refs(fs.resolve(&[selector]).unwrap()).unwrap()
    }

    #[test]
    fn higher_salience_rule_fires_before_lower() {
        let mut fs = FactSpace::new();
        let tuple = build_tuple(&mut fs);
        let ctx = EvaluationContext::new(fs, SessionConfig::default());

        let rule_base = RuleBase::new();
        rule_base
            .add_rule(Arc::new(
                ClosureRule::new(
                    "Low",
                    vec![TypeId::of::<Order>()],
                    |_t, _c| true,
                    |_r, _t, c| {
                        c.shared_set("winner", serde_json::json!("Low"));
                        Ok(())
                    },
                )
                .with_salience(100),
            ))
            .unwrap();
        rule_base
            .add_rule(Arc::new(
                ClosureRule::new(
                    "High",
                    vec![TypeId::of::<Order>()],
                    |_t, _c| true,
                    |_r, _t, c| {
                        c.shared_set("winner", serde_json::json!("High"));
                        Ok(())
                    },
                )
                .with_salience(900),
            ))
            .unwrap();
        rule_base.seal();

        let evaluator = TupleEvaluator::new(&rule_base);
        evaluator.process(&tuple, &ctx).unwrap();

        assert_eq!(
            ctx.shared_get("winner"),
            Some(serde_json::json!("Low")),
            "both rules fire, but the later write (Low, lower salience) should win since it fires second"
        );
    }

    #[test]
    fn mutex_group_allows_only_one_winner() {
        let mut fs = FactSpace::new();
        let tuple = build_tuple(&mut fs);
        let ctx = EvaluationContext::new(fs, SessionConfig::default());

        let rule_base = RuleBase::new();
        rule_base
            .add_rule(Arc::new(
                ClosureRule::new(
                    "A",
                    vec![TypeId::of::<Order>()],
                    |_t, _c| true,
                    |_r, _t, _c| Ok(()),
                )
                .with_salience(900)
                .with_mutex("shipping"),
            ))
            .unwrap();
        rule_base
            .add_rule(Arc::new(
                ClosureRule::new(
                    "B",
                    vec![TypeId::of::<Order>()],
                    |_t, _c| true,
                    |_r, _t, _c| Ok(()),
                )
                .with_salience(100)
                .with_mutex("shipping"),
            ))
            .unwrap();
        rule_base.seal();

        let evaluator = TupleEvaluator::new(&rule_base);
        evaluator.process(&tuple, &ctx).unwrap();

        let results = ctx.into_results();
        assert_eq!(results.fired_rules.len(), 1);
        assert_eq!(results.fired_rules[0].1, "A");
    }

    #[test]
    fn signature_cache_is_refreshed_when_the_tuple_shape_changes() {
        #[derive(Debug)]
        struct Customer {
            is_premium: bool,
        }

        let mut fs = FactSpace::new();
        let order_tuple = build_tuple(&mut fs);
        let (_id, customer_selector) = fs.add(Customer { is_premium: true }).unwrap();
        let customer_tuple = Tuple::from_refs(fs.resolve(&[customer_selector]).unwrap()).unwrap();

        let ctx = EvaluationContext::new(fs, SessionConfig::default());

        let rule_base = RuleBase::new();
        rule_base
            .add_rule(Arc::new(ClosureRule::new(
                "OnOrder",
                vec![TypeId::of::<Order>()],
                |_t, _c| true,
                |_r, _t, c| {
                    c.affirm(1);
                    Ok(())
                },
            )))
            .unwrap();
        rule_base
            .add_rule(Arc::new(ClosureRule::new(
                "OnCustomer",
                vec![TypeId::of::<Customer>()],
                |_t, _c| true,
                |_r, _t, c| {
                    c.affirm(10);
                    Ok(())
                },
            )))
            .unwrap();
        rule_base.seal();

        let evaluator = TupleEvaluator::new(&rule_base);
        evaluator.process(&order_tuple, &ctx).unwrap();
        evaluator.process(&customer_tuple, &ctx).unwrap();

        let results = ctx.into_results();
        assert_eq!(results.fired_rules.len(), 2);
        assert_eq!(
            results.score(),
            11,
            "the cached rule set from the first (Order) call must not leak into the second (Customer) call"
        );
    }

    #[test]
    fn max_violations_budget_stops_the_tuple_loop() {
        let mut fs = FactSpace::new();
        let tuple = build_tuple(&mut fs);
        let mut config = SessionConfig::default();
        config.max_violations = Some(1);
        let ctx = EvaluationContext::new(fs, config);

        let rule_base = RuleBase::new();
        for name in ["A", "B", "C"] {
            rule_base
                .add_rule(Arc::new(ClosureRule::new(
                    name,
                    vec![TypeId::of::<Order>()],
                    |_t, _c| true,
                    |rule, _tuple, c| {
                        c.event(rule, crate::types::EventCategory::Violation, None, "bad", &[]);
                        Ok(())
                    },
                )))
                .unwrap();
        }
        rule_base.seal();

        let evaluator = TupleEvaluator::new(&rule_base);
        let outcome = evaluator.process(&tuple, &ctx).unwrap();

        assert!(outcome.exhausted);
        let results = ctx.into_results();
        assert_eq!(
            results.fired_rules.len(),
            2,
            "firing must stop as soon as the violation count exceeds the budget, not before"
        );
    }
}
