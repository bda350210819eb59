// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Per-endpoint traffic counters
//!
//! Each endpoint accumulates message/byte counts and the set of observed
//! channels since its window started. `snapshot` reads and resets the
//! window atomically; `peek` reads without resetting. Counters for
//! different endpoints are independent.

use crate::endpoint::EndpointId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Counter {
    messages: u64,
    bytes: u64,
    /// Bit n-1 set means channel n was observed this window.
    channel_mask: u16,
    window_start: Instant,
}

impl Counter {
    fn fresh(now: Instant) -> Self {
        Self {
            messages: 0,
            bytes: 0,
            channel_mask: 0,
            window_start: now,
        }
    }
}

/// Point-in-time rates for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSnapshot {
    pub endpoint_id: EndpointId,
    pub messages_per_second: f64,
    pub bytes_per_second: f64,
    /// Observed channels, ascending.
    pub active_channels: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Sliding traffic counters keyed by endpoint.
pub struct TrafficAnalyzer {
    counters: Mutex<HashMap<EndpointId, Counter>>,
}

impl TrafficAnalyzer {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Record one message. Channels outside 1..=16 are counted but not
    /// recorded as active (0 marks non-channel messages).
    pub fn register(&self, endpoint_id: &EndpointId, byte_count: usize, channel: u8) {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(endpoint_id.clone())
            .or_insert_with(|| Counter::fresh(now));
        counter.messages += 1;
        counter.bytes += byte_count as u64;
        if (1..=16).contains(&channel) {
            counter.channel_mask |= 1 << (channel - 1);
        }
    }

    /// Rates since the window started; resets the window.
    pub fn snapshot(&self, endpoint_id: &EndpointId) -> TrafficSnapshot {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(endpoint_id.clone())
            .or_insert_with(|| Counter::fresh(now));
        let snapshot = compute(endpoint_id, counter, now);
        *counter = Counter::fresh(now);
        snapshot
    }

    /// Rates since the window started, without resetting.
    pub fn peek(&self, endpoint_id: &EndpointId) -> TrafficSnapshot {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(endpoint_id.clone())
            .or_insert_with(|| Counter::fresh(now));
        compute(endpoint_id, counter, now)
    }
}

impl Default for TrafficAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn compute(endpoint_id: &EndpointId, counter: &Counter, now: Instant) -> TrafficSnapshot {
    // Floor at 1 ms so a snapshot taken immediately after the first
    // message cannot divide by zero.
    let elapsed = now
        .saturating_duration_since(counter.window_start)
        .max(Duration::from_millis(1));
    let secs = elapsed.as_secs_f64();
    let active_channels = (1..=16u8)
        .filter(|ch| counter.channel_mask & (1 << (ch - 1)) != 0)
        .collect();
    TrafficSnapshot {
        endpoint_id: endpoint_id.clone(),
        messages_per_second: counter.messages as f64 / secs,
        bytes_per_second: counter.bytes as f64 / secs,
        active_channels,
        captured_at: Utc::now(),
    }
}
