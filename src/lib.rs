//! A forward-chaining production rule engine over typed, heterogeneous fact tuples.
//!
//! Facts of any `Send + Sync + 'static` type are inserted into a session's working
//! memory. Rules declare the concrete fact types they bind (1 to 4 of them), and the
//! engine enumerates every matching combination of active facts, evaluates each rule's
//! condition against it, and fires the highest-salience matches first. A rule's
//! consequence can insert, modify, or retract facts, which triggers re-planning so that
//! later rules see the updated working memory — the forward-chaining step that gives the
//! engine its name.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::any::TypeId;
//! use std::sync::Arc;
//! use rule_forge::{ClosureRule, RuleSetBuilder};
//! use rule_forge::engine::FactSpace;
//!
//! struct Order { total: f64 }
//! struct Customer { is_premium: bool }
//!
//! let rule = ClosureRule::new(
//!     "PremiumDiscount",
//!     vec![TypeId::of::<Order>(), TypeId::of::<Customer>()],
//!     |tuple, _ctx| {
//!         let order = tuple.facts()[0].downcast_ref::<Order>().unwrap();
//!         let customer = tuple.facts()[1].downcast_ref::<Customer>().unwrap();
//!         customer.is_premium && order.total > 100.0
//!     },
//!     |_rule, _tuple, ctx| {
//!         ctx.affirm(15);
//!         Ok(())
//!     },
//! )
//! .with_salience(800);
//!
//! let rule_set = RuleSetBuilder::new().with_rule(Arc::new(rule)).build();
//!
//! let mut facts = FactSpace::new();
//! facts.add(Order { total: 150.0 })?;
//! facts.add(Customer { is_premium: true })?;
//!
//! let results = rule_set.evaluate(facts)?;
//! println!("rules fired: {}", results.fired_rules.len());
//! # Ok::<(), rule_forge::errors::RuleEngineError>(())
//! ```
//!
//! ## Validation
//!
//! A validation rule is an ordinary rule whose consequence records a `Violation`-category
//! event via [`EvaluationContext::event`](engine::EvaluationContext::event) instead of
//! mutating facts. [`RuleSet::validate`] runs the same evaluation and buckets the
//! resulting `Violation` events by the group each rule supplied.
//!
//! ## Core components
//!
//! - [`session::RuleSet`] / [`session::RuleSetBuilder`]: the crate's top-level entry
//!   point, an immutable, shareable set of rules plus default session settings.
//! - [`engine::FactSpace`]: a session's working memory — insert, modify, retract.
//! - [`engine::Rule`] / [`engine::ClosureRule`]: the rule contract and its generic,
//!   closure-backed implementation.
//! - [`engine::Engine`]: the evaluation driver that plans, fires, and re-plans.
//! - [`engine::Listener`]: observer hooks into one evaluation, for tracing and metrics.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Rule execution engine: working memory, rule catalogue, planner, and driver.
pub mod engine;
/// Error types and result handling.
pub mod errors;
/// Top-level rule-set builder and validation support.
pub mod session;
/// Core shared types: arity, type-slots, signatures, and selector encoding.
pub mod types;

pub use engine::{ClosureRule, Engine, EvaluationContext, EvaluationResults, Listener, Rule, RuleBase, RuleEvent, SessionConfig};
pub use errors::{Result, RuleEngineError};
pub use session::{RuleSet, RuleSetBuilder, ValidationResult};
pub use types::{Arity, EventCategory};
