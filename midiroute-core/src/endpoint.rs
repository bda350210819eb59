// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Endpoint identity and descriptors
//!
//! Endpoint ids are opaque strings with case-insensitive identity: the
//! original casing is preserved for display, but equality, hashing, and
//! ordering all operate on the ASCII-lowercased form so that every map
//! keyed by [`EndpointId`] is case-insensitive by construction.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix of ids assigned to user-managed loopback endpoints.
pub const LOOPBACK_ID_PREFIX: &str = "loop:";

/// Opaque endpoint identifier with case-insensitive identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids in the `loop:` namespace (user-managed loopbacks).
    pub fn is_loopback(&self) -> bool {
        match self.0.as_bytes().get(..LOOPBACK_ID_PREFIX.len()) {
            Some(head) => head.eq_ignore_ascii_case(LOOPBACK_ID_PREFIX.as_bytes()),
            None => false,
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl PartialEq for EndpointId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for EndpointId {}

impl Hash for EndpointId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for EndpointId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EndpointId {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let rhs = other.0.bytes().map(|b| b.to_ascii_lowercase());
        lhs.cmp(rhs)
    }
}

/// Whether an endpoint is a discovered OS device or a user-managed loopback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    Hardware,
    Loopback,
}

/// Snapshot of a single endpoint as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: EndpointId,
    pub name: String,
    pub kind: EndpointKind,
    pub supports_input: bool,
    pub supports_output: bool,
    pub is_online: bool,
    pub is_user_managed: bool,
}

impl EndpointDescriptor {
    /// Catalog ordering: kind first, then name case-insensitively.
    pub(crate) fn sort_key(&self) -> (EndpointKind, String) {
        (self.kind, self.name.to_ascii_lowercase())
    }
}
