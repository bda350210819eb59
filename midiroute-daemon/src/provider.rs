// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Port provider abstraction
//!
//! A [`PortProvider`] owns the OS-level mechanics of one MIDI backend:
//! enumerating endpoints, opening input and output ports, and delivering
//! inbound bytes. The session layers the reconciliation state machine on
//! top and never touches a backend API directly.
//!
//! Inbound callbacks run on backend-chosen threads and must deliver
//! whole MIDI messages. The [`InboundSink`] a caller hands to
//! [`PortProvider::open_input`] must not block; the session's sink
//! pushes into an unbounded queue and returns.
//!
//! Two endpoint-id namespaces can coexist: the native backend's opaque
//! ids and a legacy layer using `winmm-in:<n>` / `winmm-out:<n>`. A
//! [`ProviderSet`] dispatches opens to the legacy provider by prefix
//! when one is configured.

use chrono::{DateTime, Utc};
use midiroute_core::endpoint::{EndpointDescriptor, EndpointId};
use midiroute_core::error::CatalogError;
use midiroute_core::catalog::HardwareScanner;
use std::sync::Arc;
use thiserror::Error;

/// Id prefix of the legacy input namespace.
pub const LEGACY_INPUT_PREFIX: &str = "winmm-in:";
/// Id prefix of the legacy output namespace.
pub const LEGACY_OUTPUT_PREFIX: &str = "winmm-out:";

/// Port-level failures.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// The endpoint exists but its port could not be opened right now.
    /// Non-fatal: the session retries on the next reconciliation pass.
    #[error("port unavailable: {0}")]
    Unavailable(String),

    /// The port went away under an open handle. Sends hitting this are
    /// dropped silently by the session.
    #[error("port closed")]
    Closed,

    /// Catastrophic backend failure; the session faults.
    #[error("backend fault: {0}")]
    Backend(String),
}

/// Callback invoked with each whole inbound MIDI message.
pub type InboundSink = Arc<dyn Fn(EndpointId, Vec<u8>, DateTime<Utc>) + Send + Sync>;

/// Open input port handle. Closing is idempotent and implied by drop.
pub trait InputPort: Send {
    fn close(&mut self);
}

/// Open output port handle. Closing is idempotent and implied by drop.
pub trait OutputPort: Send {
    /// Fire-and-forget send of one whole MIDI message.
    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError>;
    fn close(&mut self);
}

/// One MIDI backend.
pub trait PortProvider: Send + Sync {
    /// Enumerate the endpoints this backend currently exposes.
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, PortError>;

    fn open_input(
        &self,
        id: &EndpointId,
        sink: InboundSink,
    ) -> Result<Box<dyn InputPort>, PortError>;

    fn open_output(&self, id: &EndpointId) -> Result<Box<dyn OutputPort>, PortError>;
}

/// The configured providers: a native backend plus an optional legacy
/// layer addressed through the `winmm-*:` id prefixes.
#[derive(Clone)]
pub struct ProviderSet {
    native: Arc<dyn PortProvider>,
    legacy: Option<Arc<dyn PortProvider>>,
}

impl ProviderSet {
    pub fn native(provider: Arc<dyn PortProvider>) -> Self {
        Self {
            native: provider,
            legacy: None,
        }
    }

    pub fn with_legacy(mut self, provider: Arc<dyn PortProvider>) -> Self {
        self.legacy = Some(provider);
        self
    }

    /// The provider responsible for `id`. Legacy-prefixed ids fall back
    /// to the native provider when no legacy layer is configured (it
    /// will report them unavailable).
    pub fn opener_for(&self, id: &EndpointId) -> &Arc<dyn PortProvider> {
        if let Some(legacy) = &self.legacy
            && is_legacy_id(id)
        {
            return legacy;
        }
        &self.native
    }

    /// Union of all providers' endpoints.
    pub fn scan_all(&self) -> Result<Vec<EndpointDescriptor>, PortError> {
        let mut endpoints = self.native.scan()?;
        if let Some(legacy) = &self.legacy {
            endpoints.extend(legacy.scan()?);
        }
        Ok(endpoints)
    }
}

/// True for ids in either legacy namespace.
pub fn is_legacy_id(id: &EndpointId) -> bool {
    let raw = id.as_str();
    let lower = raw.to_ascii_lowercase();
    lower.starts_with(LEGACY_INPUT_PREFIX) || lower.starts_with(LEGACY_OUTPUT_PREFIX)
}

impl HardwareScanner for ProviderSet {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, CatalogError> {
        self.scan_all()
            .map_err(|e| CatalogError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_id_detection() {
        assert!(is_legacy_id(&"winmm-in:0".into()));
        assert!(is_legacy_id(&"WinMM-Out:3".into()));
        assert!(!is_legacy_id(&"hw:Keystation".into()));
        assert!(!is_legacy_id(&"loop:ab".into()));
    }
}
