//! In-memory event log for block resolution.
//!
//! Every observable step of a resolution emits an event. The log is the
//! engine's audit trail and what the completion tests assert against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::util::timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BlockStarted {
        model: Option<String>,
        object_id: Option<String>,
    },
    BlockCompleted {
        passes: usize,
        loads: usize,
    },
    MarkerResolved {
        directive: String,
        value: String,
    },
    ConditionRemoved {
        name: String,
    },
    TriggerFired {
        name: String,
    },
    AuthDenied,
    LoadIssued {
        model: String,
        property: String,
        dummy: bool,
    },
    LoadCompleted {
        property: String,
    },
    LoadFailed {
        property: String,
        error: String,
    },
    LinkBound {
        kind: String,
        href: String,
    },
    FieldAdded {
        property: String,
    },
    EditTriggered,
    SaveComplete {
        model: String,
        id: String,
    },
    RefreshRequested,
    DeferredQueued {
        property: String,
    },
}

/// Append-only, thread-safe event log. Cloning shares the underlying log.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: timestamp(),
            kind,
        };
        self.events.write().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events matching a predicate on the kind.
    pub fn filter<F>(&self, pred: F) -> Vec<Event>
    where
        F: Fn(&EventKind) -> bool,
    {
        self.events
            .read()
            .iter()
            .filter(|e| pred(&e.kind))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_assigns_sequential_ids() {
        let log = EventLog::new();
        log.emit(EventKind::AuthDenied);
        log.emit(EventKind::RefreshRequested);
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 0);
        assert_eq!(events[1].id, 1);
    }

    #[test]
    fn clone_shares_log() {
        let log = EventLog::new();
        let other = log.clone();
        other.emit(EventKind::EditTriggered);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn filter_by_kind() {
        let log = EventLog::new();
        log.emit(EventKind::BlockCompleted { passes: 1, loads: 0 });
        log.emit(EventKind::AuthDenied);
        let completed = log.filter(|k| matches!(k, EventKind::BlockCompleted { .. }));
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn serializes_with_type_tag() {
        let log = EventLog::new();
        log.emit(EventKind::LoadIssued {
            model: "Widget".into(),
            property: "owner".into(),
            dummy: false,
        });
        let json = serde_json::to_string(&log.events()[0]).unwrap();
        assert!(json.contains(r#""type":"load_issued""#));
        assert!(json.contains(r#""property":"owner""#));
    }
}
