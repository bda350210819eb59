// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Decoded inbound MIDI message

use crate::endpoint::EndpointId;
use crate::taxonomy::{self, MessageType};
use chrono::{DateTime, Utc};

/// One whole MIDI message with its classification and arrival time.
///
/// Packets are immutable once emitted; the dispatch path clones them as
/// needed but never rewrites payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPacket {
    pub source_endpoint_id: EndpointId,
    pub data: Vec<u8>,
    /// 0 for non-channel messages, 1..=16 otherwise. Derived from `data[0]`.
    pub channel: u8,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl MidiPacket {
    /// Classify raw bytes into a packet. Returns `None` for an empty
    /// payload: the port backend is contracted to deliver whole messages,
    /// and an empty one carries nothing to route.
    pub fn from_bytes(
        source_endpoint_id: EndpointId,
        data: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let classified = taxonomy::classify(&data);
        Some(Self {
            source_endpoint_id,
            data,
            channel: classified.channel,
            message_type: classified.message_type,
            timestamp,
        })
    }

    /// Formatted payload summary for the operator log.
    pub fn detail(&self) -> String {
        taxonomy::format_detail(self.message_type, &self.data)
    }
}
