//! Request journal.
//!
//! Every request the engine sees is appended as a [`ServeEvent`], matched
//! or not. The journal has its own lock, independent of the registry, so
//! appends and verification queries never contend with selection.

use crate::metrics;
use crate::pattern::CompiledRequestPattern;
use crate::request::LoggedRequest;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Retention policy of the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Records nothing; every query reports empty
    Disabled,
    /// Ring buffer; the oldest event is dropped once full
    Bounded(usize),
    Unbounded,
}

impl JournalMode {
    /// A bounded journal of capacity zero behaves as disabled.
    pub fn bounded(capacity: usize) -> Self {
        if capacity == 0 {
            Self::Disabled
        } else {
            Self::Bounded(capacity)
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled | Self::Bounded(0))
    }
}

/// Immutable record of one received request and its match outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeEvent {
    pub id: Uuid,
    pub request: LoggedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub_mapping_id: Option<Uuid>,
    pub was_matched: bool,
}

impl ServeEvent {
    pub fn matched(request: LoggedRequest, stub_mapping_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            stub_mapping_id: Some(stub_mapping_id),
            was_matched: true,
        }
    }

    pub fn unmatched(request: LoggedRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            stub_mapping_id: None,
            was_matched: false,
        }
    }
}

#[derive(Debug)]
pub struct RequestJournal {
    mode: JournalMode,
    events: RwLock<VecDeque<Arc<ServeEvent>>>,
}

impl RequestJournal {
    pub fn new(mode: JournalMode) -> Self {
        let mode = match mode {
            JournalMode::Bounded(capacity) => JournalMode::bounded(capacity),
            other => other,
        };
        let events = match mode {
            JournalMode::Bounded(capacity) => VecDeque::with_capacity(capacity),
            _ => VecDeque::new(),
        };
        Self {
            mode,
            events: RwLock::new(events),
        }
    }

    pub fn mode(&self) -> JournalMode {
        self.mode
    }

    /// Append an event, evicting the oldest when a bounded journal is full.
    pub fn record(&self, event: ServeEvent) -> Arc<ServeEvent> {
        let event = Arc::new(event);
        let evicted = match self.mode {
            JournalMode::Disabled | JournalMode::Bounded(0) => return event,
            JournalMode::Unbounded => {
                self.events.write().push_back(Arc::clone(&event));
                0
            }
            JournalMode::Bounded(capacity) => {
                let mut events = self.events.write();
                let mut evicted = 0;
                while events.len() >= capacity {
                    events.pop_front();
                    evicted += 1;
                }
                events.push_back(Arc::clone(&event));
                evicted
            }
        };
        if evicted > 0 {
            debug!("Journal full, evicted {evicted} oldest event(s)");
            metrics::record_journal_evictions(evicted);
        }
        event
    }

    /// All events, oldest first.
    pub fn all(&self) -> Vec<Arc<ServeEvent>> {
        self.events.read().iter().cloned().collect()
    }

    /// Events no mapping served, oldest first.
    pub fn unmatched(&self) -> Vec<Arc<ServeEvent>> {
        self.events
            .read()
            .iter()
            .filter(|event| !event.was_matched)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ServeEvent>> {
        self.events.read().iter().find(|event| event.id == id).cloned()
    }

    pub fn count_matching(&self, pattern: &CompiledRequestPattern) -> usize {
        self.events
            .read()
            .iter()
            .filter(|event| pattern.is_match(&event.request.request))
            .count()
    }

    pub fn find_matching(&self, pattern: &CompiledRequestPattern) -> Vec<Arc<ServeEvent>> {
        self.events
            .read()
            .iter()
            .filter(|event| pattern.is_match(&event.request.request))
            .cloned()
            .collect()
    }

    /// Drop events whose request matches `pattern`, returning them.
    pub fn remove_matching(&self, pattern: &CompiledRequestPattern) -> Vec<Arc<ServeEvent>> {
        let mut events = self.events.write();
        let (removed, kept): (VecDeque<_>, VecDeque<_>) = events
            .drain(..)
            .partition(|event| pattern.is_match(&event.request.request));
        *events = kept;
        info!("Removed {} event(s) from the request journal", removed.len());
        removed.into_iter().collect()
    }

    pub fn reset(&self) {
        self.events.write().clear();
        info!("Request journal reset");
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestJournal {
    fn default() -> Self {
        Self::new(JournalMode::Unbounded)
    }
}
