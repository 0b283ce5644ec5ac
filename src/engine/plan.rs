use std::collections::{HashSet, VecDeque};

use crate::engine::context::EvaluationContext;
use crate::engine::fact_space::Selector;
use crate::engine::rule_base::RuleBase;
use crate::types::{Arity, SelectorEncoding, TypeSlot};

/// Enumerates candidate tuples over the active facts in a [`crate::engine::fact_space::FactSpace`],
/// pruned to signatures with at least one matching rule and queued arity-ascending.
///
/// Refreshed whenever a rule consequence inserts, modifies, or retracts a fact, since any
/// of those can change which type-slots are active or which selectors they hold. The
/// issued-selector set is a field of the plan itself, not local to one refresh, so it
/// persists for the life of the session: a refresh only enqueues `(signature,
/// selector-encoding)` pairs that have never been issued before, per the "work uniqueness"
/// invariant — a fact whose selector survives a rebuild unchanged is not re-enqueued.
pub struct EvaluationPlan {
    queue: VecDeque<Vec<Selector>>,
    issued: HashSet<SelectorEncoding>,
}

impl EvaluationPlan {
    /// An empty plan with no candidates issued yet. Call [`Self::refresh`] to populate it.
    pub fn new() -> Self {
        EvaluationPlan {
            queue: VecDeque::new(),
            issued: HashSet::new(),
        }
    }

    /// Build a plan already populated from the current state of `ctx`'s fact space.
    pub fn build(
        ctx: &EvaluationContext,
        rule_base: &RuleBase,
        namespaces: Option<&[String]>,
        max_arity: Arity,
    ) -> Self {
        let mut plan = Self::new();
        plan.refresh(ctx, rule_base, namespaces, max_arity);
        plan
    }

    /// Re-scan `ctx`'s fact space and enqueue any candidate tuple not already issued by an
    /// earlier call, restricted to rule signatures the sealed `rule_base` actually has
    /// rules for. Leaves previously queued-but-not-yet-dequeued candidates in place.
    pub fn refresh(
        &mut self,
        ctx: &EvaluationContext,
        rule_base: &RuleBase,
        namespaces: Option<&[String]>,
        max_arity: Arity,
    ) {
        let fact_space = ctx.fact_space();
        let active_slots: Vec<TypeSlot> = fact_space.active_type_slots().collect();

        let mut newly_queued = 0usize;

        for arity in Arity::up_to(max_arity) {
            for slot_seq in variations_with_repetition(&active_slots, arity.as_usize()) {
                let type_ids: Vec<_> = slot_seq
                    .iter()
                    .map(|slot| {
                        fact_space
                            .type_id_for_slot(*slot)
                            .expect("active slot always has a registered type")
                    })
                    .collect();

                if !rule_base.has_rules(&type_ids, namespaces) {
                    continue;
                }

                let selector_lists: Vec<&[Selector]> = slot_seq
                    .iter()
                    .map(|slot| fact_space.selectors_for_slot(*slot))
                    .collect();

                for candidate in cartesian_product(&selector_lists) {
                    let lanes: Vec<u32> = candidate.iter().map(|s| s.as_u32()).collect();
                    let encoding = SelectorEncoding::pack(&lanes);
                    if self.issued.insert(encoding) {
                        self.queue.push_back(candidate);
                        newly_queued += 1;
                    }
                }
            }
        }

        log::debug!(
            "plan: refreshed with {} new candidate tuple(s) across {} active type-slot(s), {} total issued",
            newly_queued,
            active_slots.len(),
            self.issued.len()
        );
    }

    /// Pop the next candidate tuple's selector sequence, arity-ascending.
    pub fn next(&mut self) -> Option<Vec<Selector>> {
        self.queue.pop_front()
    }

    /// Number of candidate tuples remaining.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for EvaluationPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// All ordered sequences of length `len` drawn (with repetition) from `items`, i.e. the
/// cross-product `items^len`. Order-sensitive: `[A, B]` and `[B, A]` are distinct.
fn variations_with_repetition(items: &[TypeSlot], len: usize) -> Vec<Vec<TypeSlot>> {
    if len == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    let smaller = variations_with_repetition(items, len - 1);
    for item in items {
        for prefix in &smaller {
            let mut seq = prefix.clone();
            seq.push(*item);
            out.push(seq);
        }
    }
    out
}

/// The cartesian product of a sequence of selector slices, e.g. `[[a,b],[c]] -> [[a,c],[b,c]]`.
fn cartesian_product(lists: &[&[Selector]]) -> Vec<Vec<Selector>> {
    let mut out: Vec<Vec<Selector>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(out.len() * list.len());
        for prefix in &out {
            for selector in *list {
                let mut seq = prefix.clone();
                seq.push(*selector);
                next.push(seq);
            }
        }
        out = next;
    }
    if lists.is_empty() {
        Vec::new()
    } else {
        out
    }
}
