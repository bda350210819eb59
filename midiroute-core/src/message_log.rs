// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Bounded ring buffer of operator-visible log entries
//!
//! The log keeps the most recent `capacity` entries and notifies
//! observers on every append and clear. Capacity can be reconfigured at
//! runtime; shrinking evicts the oldest entries immediately so the size
//! bound holds at all times, even across concurrent `add`/`configure`.

use crate::taxonomy::MessageType;
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::events::EventHub;

pub const DEFAULT_CAPACITY: usize = 5_000;
pub const MIN_CAPACITY: usize = 1;
pub const MAX_CAPACITY: usize = 200_000;

/// One immutable log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub endpoint_name: String,
    pub channel: u8,
    pub message_type: MessageType,
    pub detail: String,
}

/// Log change notification.
#[derive(Debug, Clone)]
pub enum LogEvent {
    EntryAdded(Arc<LogEntry>),
    Cleared,
}

struct LogState {
    entries: VecDeque<Arc<LogEntry>>,
    capacity: usize,
}

/// Observable bounded message log.
pub struct MessageLog {
    state: Mutex<LogState>,
    events: EventHub<LogEvent>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        Self {
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            }),
            events: EventHub::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Change the capacity, clamped to 1..=200_000, evicting the oldest
    /// entries when shrinking below the current size.
    pub fn configure(&self, capacity: usize) {
        let capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        let mut state = self.state.lock();
        state.capacity = capacity;
        while state.entries.len() > capacity {
            state.entries.pop_front();
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn add(&self, entry: LogEntry) {
        let entry = Arc::new(entry);
        {
            let mut state = self.state.lock();
            if state.entries.len() >= state.capacity {
                state.entries.pop_front();
            }
            state.entries.push_back(entry.clone());
        }
        self.events.emit(LogEvent::EntryAdded(entry));
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
        self.events.emit(LogEvent::Cleared);
    }

    /// Snapshot copy in insertion order.
    pub fn list(&self) -> Vec<Arc<LogEntry>> {
        self.state.lock().entries.iter().cloned().collect()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(detail: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            endpoint_name: "Input".to_string(),
            channel: 1,
            message_type: MessageType::NoteOn,
            detail: detail.to_string(),
        }
    }

    #[test]
    fn add_appends_in_order() {
        let log = MessageLog::new();
        log.add(entry("1"));
        log.add(entry("2"));
        let entries = log.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detail, "1");
        assert_eq!(entries[1].detail, "2");
    }

    #[test]
    fn eviction_keeps_most_recent() {
        let log = MessageLog::with_capacity(2);
        log.add(entry("1"));
        log.add(entry("2"));
        log.add(entry("3"));

        let entries = log.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detail, "2");
        assert_eq!(entries[1].detail, "3");
    }

    #[test]
    fn configure_clamps_and_evicts_on_shrink() {
        let log = MessageLog::with_capacity(10);
        for i in 0..10 {
            log.add(entry(&i.to_string()));
        }

        log.configure(3);
        assert_eq!(log.capacity(), 3);
        let entries = log.list();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].detail, "7");

        log.configure(0);
        assert_eq!(log.capacity(), MIN_CAPACITY);
        log.configure(usize::MAX);
        assert_eq!(log.capacity(), MAX_CAPACITY);
    }

    #[test]
    fn observers_see_adds_and_clear() {
        let log = MessageLog::new();
        let rx = log.subscribe();

        log.add(entry("x"));
        match rx.try_recv().unwrap() {
            LogEvent::EntryAdded(e) => assert_eq!(e.detail, "x"),
            other => panic!("unexpected event: {other:?}"),
        }

        log.clear();
        assert!(log.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), LogEvent::Cleared));
    }
}
