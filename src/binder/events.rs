//! Bind event log
//!
//! Audit trail of what the binder did, in order:
//! - BindEvent: envelope with id + elapsed time + kind
//! - BindEventKind: root lifecycle, listeners, digest passes
//! - EventLog: append-only, bounded (oldest events are dropped first)

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::NodeId;

/// Single entry in the bind log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindEvent {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub elapsed_ms: u64,
    pub kind: BindEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindEventKind {
    // ═══════════════════════════════════════════
    // ROOT LEVEL
    // ═══════════════════════════════════════════
    SnapshotTaken {
        root: NodeId,
    },
    RootReset {
        root: NodeId,
    },
    RootBound {
        root: NodeId,
        writes: usize,
        clones: usize,
        /// False when the mapper returned nothing
        mapped: bool,
    },
    RootEvicted {
        root: NodeId,
    },

    // ═══════════════════════════════════════════
    // FINE-GRAINED
    // ═══════════════════════════════════════════
    ListenerRegistered {
        node: NodeId,
        event: String,
    },

    // ═══════════════════════════════════════════
    // DIGEST
    // ═══════════════════════════════════════════
    DigestStarted {
        entries: usize,
    },
    DigestCompleted {
        scanned: usize,
        rebound: usize,
        pruned: usize,
        duration_ms: u64,
    },
}

impl BindEventKind {
    /// Root the event is about, if any
    pub fn root(&self) -> Option<NodeId> {
        match self {
            Self::SnapshotTaken { root }
            | Self::RootReset { root }
            | Self::RootBound { root, .. }
            | Self::RootEvicted { root } => Some(*root),
            Self::ListenerRegistered { .. }
            | Self::DigestStarted { .. }
            | Self::DigestCompleted { .. } => None,
        }
    }

    pub fn is_digest_event(&self) -> bool {
        matches!(
            self,
            Self::DigestStarted { .. } | Self::DigestCompleted { .. }
        )
    }
}

struct LogState {
    events: VecDeque<BindEvent>,
    capacity: usize,
}

/// Append-only, bounded event log
///
/// Clones share the same log.
#[derive(Clone)]
pub struct EventLog {
    state: Rc<RefCell<LogState>>,
    start_time: Instant,
    next_id: Rc<Cell<u64>>,
}

impl EventLog {
    /// Log keeping at most `capacity` events (0 disables recording)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(LogState {
                events: VecDeque::new(),
                capacity,
            })),
            start_time: Instant::now(),
            next_id: Rc::new(Cell::new(0)),
        }
    }

    /// Append an event, returns its ID
    pub fn emit(&self, kind: BindEventKind) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let mut state = self.state.borrow_mut();
        if state.capacity == 0 {
            return id;
        }
        if state.events.len() == state.capacity {
            state.events.pop_front();
        }
        state.events.push_back(BindEvent {
            id,
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Retained events, oldest first
    pub fn events(&self) -> Vec<BindEvent> {
        self.state.borrow().events.iter().cloned().collect()
    }

    /// Events about one root
    pub fn for_root(&self, root: NodeId) -> Vec<BindEvent> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.kind.root() == Some(root))
            .cloned()
            .collect()
    }

    pub fn digest_events(&self) -> Vec<BindEvent> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.kind.is_digest_event())
            .cloned()
            .collect()
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn clear(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn len(&self) -> usize {
        self.state.borrow().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
