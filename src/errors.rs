use thiserror::Error;

use crate::engine::results::EvaluationResults;

/// Error types that can occur while building or running a session.
#[derive(Error, Debug)]
pub enum RuleEngineError {
    /// More than 65,535 facts are simultaneously active in one session.
    #[error("capacity exceeded: more than {limit} facts are active in this session")]
    CapacityExceeded {
        /// The active-selector limit that was hit.
        limit: usize,
    },

    /// The evaluation, wall-clock, or violation budget was exceeded before the plan
    /// drained. Carries whatever was accumulated before the budget tripped, since a
    /// caller who asked for `max_violations` almost always still wants to see them.
    #[error("evaluation exhausted after {total_evaluated} evaluations ({elapsed_ms}ms)")]
    Exhausted {
        /// Number of rule evaluations performed before the budget was hit.
        total_evaluated: usize,
        /// Elapsed milliseconds at the point of exhaustion.
        elapsed_ms: u128,
        /// Partial results accumulated before exhaustion.
        results: Box<EvaluationResults>,
    },

    /// No rule was evaluated for the supplied fact types and namespaces.
    #[error("no rules were evaluated for the facts in this session")]
    NoRulesEvaluated,

    /// At least one `Violation` event was recorded and the session requested an error for it.
    #[error("{violation_count} validation violation(s) were recorded")]
    ViolationsExist {
        /// Number of distinct violation events recorded.
        violation_count: usize,
    },

    /// A rule consequence looked up a key or table name that was never registered.
    #[error("lookup missing: {0}")]
    LookupMissing(String),

    /// A caller or rule consequence passed a malformed argument (null fact, empty template, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Catch-all for failures raised from inside a rule's own `evaluate`/`fire` callbacks.
    #[error("evaluation error: {0}")]
    EvaluationError(String),
}

/// Convenient Result type alias for rule engine operations.
pub type Result<T> = std::result::Result<T, RuleEngineError>;
