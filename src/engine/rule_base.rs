use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::engine::rule::Rule;
use crate::errors::{Result, RuleEngineError};
use crate::types::Arity;

type RuleKey = Vec<TypeId>;

struct SealedIndex {
    by_fact_types: HashMap<RuleKey, Vec<Arc<dyn Rule>>>,
    max_arity: Option<Arity>,
}

impl SealedIndex {
    fn build(rules: &[Arc<dyn Rule>]) -> Self {
        let mut by_fact_types: HashMap<RuleKey, Vec<Arc<dyn Rule>>> = HashMap::new();
        let mut max_arity: Option<Arity> = None;

        for rule in rules {
            let key = rule.fact_types();
            by_fact_types.entry(key).or_default().push(Arc::clone(rule));
            max_arity = Some(match max_arity {
                Some(current) if current >= rule.arity() => current,
                _ => rule.arity(),
            });
        }

        SealedIndex {
            by_fact_types,
            max_arity,
        }
    }
}

/// The indexed rule catalogue: maps fact-type signatures to rules and reports the
/// maximum arity in use. Has a two-phase lifecycle — mutable while rules are added,
/// sealed once evaluation begins, with an explicit, idempotent `seal` building the
/// acceleration structures exactly once.
pub struct RuleBase {
    rules: RwLock<Vec<Arc<dyn Rule>>>,
    names: RwLock<HashSet<(String, String)>>,
    sealed: OnceCell<SealedIndex>,
}

impl Default for RuleBase {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBase {
    /// Create an empty, mutable rule base.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            names: RwLock::new(HashSet::new()),
            sealed: OnceCell::new(),
        }
    }

    /// Ingest a rule under its own `(namespace, name)` key. Fails if the base has already
    /// been sealed, or if a rule with the same namespace and name was already added.
    pub fn add_rule(&self, rule: Arc<dyn Rule>) -> Result<()> {
        if self.sealed.get().is_some() {
            return Err(RuleEngineError::InvalidArgument(
                "cannot add rules to a sealed RuleBase".to_string(),
            ));
        }

        let key = (rule.namespace().to_string(), rule.name().to_string());
        let mut names = self.names.write().unwrap();
        if !names.insert(key) {
            return Err(RuleEngineError::InvalidArgument(format!(
                "rule '{}' already exists in namespace '{}'",
                rule.name(),
                rule.namespace()
            )));
        }

        self.rules.write().unwrap().push(rule);
        Ok(())
    }

    /// Seal the catalogue, building its acceleration structures. Idempotent and safe to
    /// call concurrently: the first caller builds the index, and every caller (including
    /// concurrent ones) observes the same published result.
    pub fn seal(&self) {
        self.sealed.get_or_init(|| {
            let rules = self.rules.read().unwrap();
            log::info!("rule_base: sealing with {} rule(s)", rules.len());
            SealedIndex::build(&rules)
        });
    }

    /// Whether this catalogue has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn sealed_index(&self) -> &SealedIndex {
        self.sealed
            .get()
            .expect("RuleBase must be sealed before it is queried")
    }

    /// The maximum arity among all rules in this catalogue (0 if there are none).
    pub fn max_arity(&self) -> usize {
        self.sealed_index()
            .max_arity
            .map(|a| a.as_usize())
            .unwrap_or(0)
    }

    /// Rules declared over exactly `types`, filtered to those whose namespace is in
    /// `namespaces` (or all rules, if `namespaces` is `None`).
    pub fn find_rules(
        &self,
        types: &[TypeId],
        namespaces: Option<&[String]>,
    ) -> Vec<Arc<dyn Rule>> {
        let Some(bucket) = self.sealed_index().by_fact_types.get(types) else {
            return Vec::new();
        };
        match namespaces {
            None => bucket.clone(),
            Some(allowed) => bucket
                .iter()
                .filter(|r| allowed.iter().any(|ns| ns == r.namespace()))
                .cloned()
                .collect(),
        }
    }

    /// Fast path used by the planner to prune signatures with no matching rules, without
    /// materializing the full rule vector.
    pub fn has_rules(&self, types: &[TypeId], namespaces: Option<&[String]>) -> bool {
        let Some(bucket) = self.sealed_index().by_fact_types.get(types) else {
            return false;
        };
        match namespaces {
            None => !bucket.is_empty(),
            Some(allowed) => bucket.iter().any(|r| allowed.iter().any(|ns| ns == r.namespace())),
        }
    }

    /// Total number of rules in the catalogue.
    pub fn rule_count(&self) -> usize {
        self.rules.read().unwrap().len()
    }
}
