//! Deferred on-commit trigger bookkeeping.
//!
//! Triggers queued during execution fire only after the transaction is
//! durably committed. The context records them in registration order;
//! firing walks that order. A failing trigger is logged and skipped: it
//! can never retroactively invalidate a committed transaction.

use std::fmt;

use thiserror::Error;

/// Row event a deferred trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    AfterInsert,
    AfterUpdate,
    AfterDelete,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AfterInsert => f.write_str("after_insert"),
            Self::AfterUpdate => f.write_str("after_update"),
            Self::AfterDelete => f.write_str("after_delete"),
        }
    }
}

/// Failure raised by a trigger action.
///
/// Never escapes [`TriggerSet::exec`]; commit outcome is already decided
/// by the time triggers run.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger action failed: {0}")]
    ActionFailed(String),
}

/// One queued trigger invocation: a label for diagnostics, the row event
/// that armed it, and the deferred action itself.
pub struct TriggerData {
    name: String,
    event: TriggerEvent,
    action: Box<dyn FnOnce() -> Result<(), TriggerError> + Send + Sync>,
}

impl TriggerData {
    pub fn new(
        name: impl Into<String>,
        event: TriggerEvent,
        action: impl FnOnce() -> Result<(), TriggerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            event,
            action: Box::new(action),
        }
    }

    /// Trigger label, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row event that armed this trigger.
    #[must_use]
    pub fn event(&self) -> TriggerEvent {
        self.event
    }

    fn fire(self) -> Result<(), TriggerError> {
        (self.action)()
    }
}

impl fmt::Debug for TriggerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerData")
            .field("name", &self.name)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Registration-ordered list of deferred triggers.
#[derive(Debug, Default)]
pub struct TriggerSet {
    triggers: Vec<TriggerData>,
}

impl TriggerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trigger. Registration order is execution order.
    pub fn push(&mut self, trigger: TriggerData) {
        self.triggers.push(trigger);
    }

    /// Number of queued triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Whether no trigger is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Fire every trigger in registration order, consuming the set.
    ///
    /// Failures are logged and do not stop the remaining triggers.
    pub fn exec(self) {
        for trigger in self.triggers {
            let name = trigger.name.clone();
            let event = trigger.event;
            if let Err(err) = trigger.fire() {
                tracing::warn!(trigger = %name, %event, %err, "on-commit trigger failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_exec_preserves_registration_order() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut set = TriggerSet::new();
        for label in ["t1", "t2", "t3"] {
            let fired = Arc::clone(&fired);
            set.push(TriggerData::new(label, TriggerEvent::AfterInsert, move || {
                fired.lock().push(label);
                Ok(())
            }));
        }
        set.exec();
        assert_eq!(*fired.lock(), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_failing_trigger_does_not_stop_later_ones() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut set = TriggerSet::new();

        let sink = Arc::clone(&fired);
        set.push(TriggerData::new("boom", TriggerEvent::AfterDelete, move || {
            sink.lock().push("boom");
            Err(TriggerError::ActionFailed("sink unavailable".into()))
        }));
        let sink = Arc::clone(&fired);
        set.push(TriggerData::new("after", TriggerEvent::AfterUpdate, move || {
            sink.lock().push("after");
            Ok(())
        }));

        set.exec();
        assert_eq!(*fired.lock(), vec!["boom", "after"]);
    }

    #[test]
    fn test_trigger_data_reports_label_and_event() {
        let trigger = TriggerData::new("audit", TriggerEvent::AfterUpdate, || Ok(()));
        assert_eq!(trigger.name(), "audit");
        assert_eq!(trigger.event(), TriggerEvent::AfterUpdate);
    }
}
