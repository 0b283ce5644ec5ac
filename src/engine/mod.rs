/// The evaluation context handed to every rule's `evaluate`/`fire`.
pub mod context;
/// The main evaluation driver.
#[allow(clippy::module_inception)]
pub mod engine;
/// Working memory: facts, identities, selectors, and the type index.
pub mod fact_space;
/// Observer hooks into an evaluation.
pub mod listener;
/// Candidate-tuple enumeration over the active fact space.
pub mod plan;
/// Accumulated outcome of an evaluation: fired rules, events, score.
pub mod results;
/// Rule definition: the `Rule` trait and the `ClosureRule` convenience implementation.
pub mod rule;
/// The indexed, sealable rule catalogue.
pub mod rule_base;
/// Ordered bindings of facts matching a rule's arity.
pub mod tuple;
/// Per-tuple rule filtering, salience ordering, and firing.
pub mod tuple_eval;

pub use context::{EvaluationContext, SessionConfig};
pub use engine::Engine;
pub use fact_space::{FactRef, FactSpace, Identity, Selector, MAX_ACTIVE_SELECTORS};
pub use listener::{Listener, NullListener};
pub use results::{EvaluationResults, RuleEvent};
pub use rule::{ClosureRule, Rule};
pub use rule_base::RuleBase;
pub use tuple::Tuple;
