// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Per-route message filter
//!
//! A filter is a predicate over `(channel, message type)`. An empty
//! channel set matches every channel and an empty type set matches every
//! type, so the default filter passes everything. Filters are immutable
//! once constructed; replacing a route's filter means replacing the route
//! version.

use crate::error::RouteError;
use crate::taxonomy::MessageType;
use std::collections::BTreeSet;

/// Immutable predicate over `(channel, message type)`.
///
/// ```
/// use midiroute_core::filter::RouteFilter;
/// use midiroute_core::taxonomy::MessageType;
///
/// let f = RouteFilter::new([2, 3], [MessageType::NoteOn]).unwrap();
/// assert!(f.allows(2, MessageType::NoteOn));
/// assert!(!f.allows(1, MessageType::NoteOn));
/// assert!(!f.allows(2, MessageType::ControlChange));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFilter {
    channels: BTreeSet<u8>,
    message_types: BTreeSet<MessageType>,
}

impl RouteFilter {
    /// Build a filter, de-duplicating the inputs.
    ///
    /// Fails with [`RouteError::InvalidFilter`] if any channel falls
    /// outside 1..=16.
    pub fn new(
        channels: impl IntoIterator<Item = u8>,
        message_types: impl IntoIterator<Item = MessageType>,
    ) -> Result<Self, RouteError> {
        let channels: BTreeSet<u8> = channels.into_iter().collect();
        if let Some(&bad) = channels.iter().find(|c| !(1..=16).contains(*c)) {
            return Err(RouteError::InvalidFilter(format!(
                "channel {bad} outside 1..=16"
            )));
        }
        Ok(Self {
            channels,
            message_types: message_types.into_iter().collect(),
        })
    }

    /// The filter that passes every message.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self.channels.is_empty() && self.message_types.is_empty()
    }

    /// Whether a `(channel, message type)` pair passes this filter.
    pub fn allows(&self, channel: u8, message_type: MessageType) -> bool {
        (self.channels.is_empty() || self.channels.contains(&channel))
            && (self.message_types.is_empty() || self.message_types.contains(&message_type))
    }

    /// Selected channels in ascending order; empty means all.
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.channels.iter().copied()
    }

    /// Selected message types; empty means all.
    pub fn message_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.message_types.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_passes_everything() {
        let f = RouteFilter::allow_all();
        assert!(f.is_allow_all());
        for ch in 0..=16 {
            assert!(f.allows(ch, MessageType::NoteOn));
            assert!(f.allows(ch, MessageType::Clock));
        }
    }

    #[test]
    fn channel_set_restricts_channels_only() {
        let f = RouteFilter::new([2], []).unwrap();
        assert!(f.allows(2, MessageType::NoteOn));
        assert!(f.allows(2, MessageType::SysEx));
        assert!(!f.allows(1, MessageType::NoteOn));
        // Channel 0 (system messages) never matches a non-empty channel set.
        assert!(!f.allows(0, MessageType::Clock));
    }

    #[test]
    fn type_set_restricts_types_only() {
        let f = RouteFilter::new([], [MessageType::Clock]).unwrap();
        assert!(f.allows(0, MessageType::Clock));
        assert!(f.allows(9, MessageType::Clock));
        assert!(!f.allows(9, MessageType::NoteOn));
    }

    #[test]
    fn constructor_rejects_out_of_range_channels() {
        assert!(matches!(
            RouteFilter::new([0], []),
            Err(RouteError::InvalidFilter(_))
        ));
        assert!(matches!(
            RouteFilter::new([17], []),
            Err(RouteError::InvalidFilter(_))
        ));
    }

    #[test]
    fn constructor_deduplicates() {
        let f = RouteFilter::new([3, 3, 3], [MessageType::NoteOn, MessageType::NoteOn]).unwrap();
        assert_eq!(f.channels().collect::<Vec<_>>(), vec![3]);
        assert_eq!(
            f.message_types().collect::<Vec<_>>(),
            vec![MessageType::NoteOn]
        );
    }
}
