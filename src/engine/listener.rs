use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::engine::rule::Rule;
use crate::engine::tuple::Tuple;

/// Observer hooks into one `evaluate` call.
///
/// Every method has a no-op default so implementors only override what they care about.
/// The engine never lets a listener's panic abort evaluation — see [`safe_notify`].
pub trait Listener: Send + Sync {
    /// Called once, before the evaluation plan starts draining.
    fn begin_evaluation(&self) {}

    /// Called once, after the plan has drained or the evaluation otherwise stopped.
    fn end_evaluation(&self) {}

    /// Called before a candidate tuple's fireable rules are computed.
    fn begin_tuple(&self, _tuple: &Tuple) {}

    /// Called after a candidate tuple has been fully processed.
    fn end_tuple(&self, _tuple: &Tuple) {}

    /// Called immediately before a rule's consequence runs.
    fn firing(&self, _rule: &dyn Rule, _tuple: &Tuple) {}

    /// Called immediately after a rule's consequence has run successfully.
    /// `modifications_occurred` reports whether the fact space has been mutated by any
    /// rule (including earlier ones) since the last plan build, the same flag the driver
    /// itself checks to decide whether to rebuild the plan.
    fn fired(&self, _rule: &dyn Rule, _tuple: &Tuple, _modifications_occurred: bool) {}

    /// Called with a free-form diagnostic message, e.g. plan rebuilds or mutex losses.
    fn debug(&self, _message: &str) {}
}

/// A listener that discards every notification. The default when a session is built
/// without an explicit listener.
pub struct NullListener;

impl Listener for NullListener {}

/// Invoke a listener method, swallowing any panic it raises so that telemetry never
/// aborts an evaluation in progress.
pub fn safe_notify<F: FnOnce() + std::panic::UnwindSafe>(what: &str, f: F) {
    if let Err(_payload) = catch_unwind(AssertUnwindSafe(f)) {
        log::warn!("listener panicked during {what}; ignoring");
        let _ = what;
    }
}
