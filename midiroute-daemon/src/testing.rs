// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! In-memory port provider for integration tests
//!
//! Tracks open ports, records outbound sends, and lets tests inject
//! inbound bytes through the sinks registered by `open_input`. Failure
//! modes (unavailable, closed, backend fault) are switchable per
//! endpoint.

use crate::provider::{InboundSink, InputPort, OutputPort, PortError, PortProvider};
use chrono::Utc;
use midiroute_core::catalog::HardwareScanner;
use midiroute_core::endpoint::{EndpointDescriptor, EndpointId, EndpointKind};
use midiroute_core::error::CatalogError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    endpoints: Vec<EndpointDescriptor>,
    unavailable: HashSet<EndpointId>,
    backend_fault: HashSet<EndpointId>,
    closed_outputs: HashSet<EndpointId>,
    faulted_outputs: HashSet<EndpointId>,
    sinks: HashMap<EndpointId, InboundSink>,
    open_inputs: HashSet<EndpointId>,
    open_outputs: HashSet<EndpointId>,
    open_counts: HashMap<EndpointId, usize>,
    sent: Vec<(EndpointId, Vec<u8>)>,
}

/// Scriptable in-memory backend.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        let provider = Self::default();
        provider.set_endpoints(endpoints);
        provider
    }

    /// Replace the endpoint inventory the next scan reports.
    pub fn set_endpoints(&self, endpoints: Vec<EndpointDescriptor>) {
        self.state.lock().endpoints = endpoints;
    }

    /// Make opens of `id` fail with `PortUnavailable`.
    pub fn set_unavailable(&self, id: &EndpointId, unavailable: bool) {
        let mut state = self.state.lock();
        if unavailable {
            state.unavailable.insert(id.clone());
        } else {
            state.unavailable.remove(id);
        }
    }

    /// Make opens of `id` fail with a backend fault.
    pub fn set_backend_fault(&self, id: &EndpointId, fault: bool) {
        let mut state = self.state.lock();
        if fault {
            state.backend_fault.insert(id.clone());
        } else {
            state.backend_fault.remove(id);
        }
    }

    /// Make sends through `id`'s open output fail with `PortClosed`.
    pub fn set_output_closed(&self, id: &EndpointId, closed: bool) {
        let mut state = self.state.lock();
        if closed {
            state.closed_outputs.insert(id.clone());
        } else {
            state.closed_outputs.remove(id);
        }
    }

    /// Make sends through `id`'s open output fail with a backend fault.
    pub fn set_output_faulted(&self, id: &EndpointId, faulted: bool) {
        let mut state = self.state.lock();
        if faulted {
            state.faulted_outputs.insert(id.clone());
        } else {
            state.faulted_outputs.remove(id);
        }
    }

    /// Deliver inbound bytes through the sink registered for `id`.
    /// Returns false when no input port is open there.
    pub fn inject(&self, id: &EndpointId, bytes: &[u8]) -> bool {
        let sink = self.state.lock().sinks.get(id).cloned();
        match sink {
            Some(sink) => {
                sink(id.clone(), bytes.to_vec(), Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn open_inputs(&self) -> Vec<EndpointId> {
        self.state.lock().open_inputs.iter().cloned().collect()
    }

    pub fn open_outputs(&self) -> Vec<EndpointId> {
        self.state.lock().open_outputs.iter().cloned().collect()
    }

    /// How many times `id` has been opened (either direction); S6-style
    /// tests use this to prove an untouched port saw no churn.
    pub fn open_count(&self, id: &EndpointId) -> usize {
        self.state.lock().open_counts.get(id).copied().unwrap_or(0)
    }

    /// All outbound sends in order: `(target, bytes)`.
    pub fn sent(&self) -> Vec<(EndpointId, Vec<u8>)> {
        self.state.lock().sent.clone()
    }
}

impl PortProvider for MockProvider {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, PortError> {
        Ok(self.state.lock().endpoints.clone())
    }

    fn open_input(
        &self,
        id: &EndpointId,
        sink: InboundSink,
    ) -> Result<Box<dyn InputPort>, PortError> {
        let mut state = self.state.lock();
        if state.unavailable.contains(id) {
            return Err(PortError::Unavailable("marked unavailable".to_string()));
        }
        if state.backend_fault.contains(id) {
            return Err(PortError::Backend("simulated backend fault".to_string()));
        }
        state.sinks.insert(id.clone(), sink);
        state.open_inputs.insert(id.clone());
        *state.open_counts.entry(id.clone()).or_default() += 1;
        Ok(Box::new(MockInput {
            id: id.clone(),
            state: self.state.clone(),
            open: true,
        }))
    }

    fn open_output(&self, id: &EndpointId) -> Result<Box<dyn OutputPort>, PortError> {
        let mut state = self.state.lock();
        if state.unavailable.contains(id) {
            return Err(PortError::Unavailable("marked unavailable".to_string()));
        }
        if state.backend_fault.contains(id) {
            return Err(PortError::Backend("simulated backend fault".to_string()));
        }
        state.open_outputs.insert(id.clone());
        *state.open_counts.entry(id.clone()).or_default() += 1;
        Ok(Box::new(MockOutput {
            id: id.clone(),
            state: self.state.clone(),
            open: true,
        }))
    }
}

impl HardwareScanner for MockProvider {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, CatalogError> {
        PortProvider::scan(self).map_err(|e| CatalogError::Backend(e.to_string()))
    }
}

struct MockInput {
    id: EndpointId,
    state: Arc<Mutex<MockState>>,
    open: bool,
}

impl InputPort for MockInput {
    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut state = self.state.lock();
        state.open_inputs.remove(&self.id);
        state.sinks.remove(&self.id);
    }
}

impl Drop for MockInput {
    fn drop(&mut self) {
        self.close();
    }
}

struct MockOutput {
    id: EndpointId,
    state: Arc<Mutex<MockState>>,
    open: bool,
}

impl OutputPort for MockOutput {
    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        if !self.open {
            return Err(PortError::Closed);
        }
        let mut state = self.state.lock();
        if state.closed_outputs.contains(&self.id) {
            return Err(PortError::Closed);
        }
        if state.faulted_outputs.contains(&self.id) {
            return Err(PortError::Backend("simulated send fault".to_string()));
        }
        state.sent.push((self.id.clone(), bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.state.lock().open_outputs.remove(&self.id);
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Hardware endpoint descriptor shorthand for tests.
pub fn hardware_endpoint(id: &str, input: bool, output: bool) -> EndpointDescriptor {
    EndpointDescriptor {
        id: id.into(),
        name: id.to_string(),
        kind: EndpointKind::Hardware,
        supports_input: input,
        supports_output: output,
        is_online: true,
        is_user_managed: false,
    }
}
