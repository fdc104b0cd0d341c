//! The trigger predicate: a gate evaluated once per round, after the
//! readiness pass, deciding whether the round proceeds to take+execute.

use crate::handle::HandleTable;

/// Built-in gates, plus an escape hatch for arbitrary user logic.
///
/// `Custom` stores its callback and opaque object the same way handle
/// callbacks are stored: a boxed closure capturing whatever context the
/// caller needs, since this crate has no raw-pointer FFI boundary for a
/// separate `trigger_object` argument to cross.
pub enum TriggerPredicate {
    /// True iff at least one initialized handle has data available.
    /// The default.
    Any,
    /// True iff every initialized handle has data available.
    All,
    /// Always true.
    Always,
    /// True iff the initialized handle whose endpoint id equals `target`
    /// has data available; false if no such handle is registered.
    One(usize),
    /// Arbitrary user-supplied gate.
    Custom(Box<dyn FnMut(&HandleTable) -> bool + Send>),
}

impl Default for TriggerPredicate {
    fn default() -> Self {
        TriggerPredicate::Any
    }
}

impl TriggerPredicate {
    /// Evaluates the gate against the handle table's current
    /// `data_available` flags (set by the readiness pass, just before
    /// this call).
    pub fn evaluate(&mut self, table: &HandleTable) -> bool {
        match self {
            TriggerPredicate::Any => table.iter().any(|h| h.data_available),
            TriggerPredicate::All => table.iter().all(|h| h.data_available),
            TriggerPredicate::Always => true,
            TriggerPredicate::One(target) => table
                .iter()
                .find(|h| h.endpoint_id() == *target)
                .is_some_and(|h| h.data_available),
            TriggerPredicate::Custom(f) => f(table),
        }
    }
}
