// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Route definitions, the authoritative route matrix, and the derived
//! source-keyed route index
//!
//! The matrix is the single writer-facing store: every mutation is
//! observable-atomic and announced through [`MatrixEvent::RoutesChanged`].
//! Readers never iterate the live store; they either take a snapshot or
//! consume a [`RouteIndex`] built from one. The dispatch worker rebuilds
//! the index on change and publishes it with a single pointer swap, so a
//! reader observes an entire old or entire new version, never a mix.

use crate::endpoint::EndpointId;
use crate::error::RouteError;
use crate::events::EventHub;
use crate::filter::RouteFilter;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Opaque route identifier, assigned on creation and stable for the
/// route's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(Uuid);

impl RouteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id from raw bits; mainly useful in tests and tools.
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A directed forwarding rule from one endpoint to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub id: RouteId,
    pub source: EndpointId,
    pub target: EndpointId,
    pub enabled: bool,
    pub filter: RouteFilter,
}

impl RouteDefinition {
    pub fn new(source: EndpointId, target: EndpointId, filter: RouteFilter) -> Self {
        Self {
            id: RouteId::new(),
            source,
            target,
            enabled: true,
            filter,
        }
    }

    fn validate(&self) -> Result<(), RouteError> {
        if self.source.as_str().trim().is_empty() || self.target.as_str().trim().is_empty() {
            return Err(RouteError::InvalidRoute(
                "source and target endpoints are required".to_string(),
            ));
        }
        if self.source == self.target {
            return Err(RouteError::InvalidRoute(format!(
                "source and target are the same endpoint ({})",
                self.source
            )));
        }
        Ok(())
    }
}

/// Matrix change notification. Consumers re-derive whatever they need
/// from a fresh snapshot; the event carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixEvent {
    RoutesChanged,
}

/// The authoritative, observable set of routes.
pub struct RouteMatrix {
    routes: Mutex<Vec<RouteDefinition>>,
    events: EventHub<MatrixEvent>,
}

impl RouteMatrix {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            events: EventHub::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<MatrixEvent> {
        self.events.subscribe()
    }

    /// Snapshot ordered by (source, target), case-insensitively.
    pub fn list(&self) -> Vec<RouteDefinition> {
        let mut routes = self.routes.lock().clone();
        routes.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        routes
    }

    /// Snapshot in insertion order, as the index builder consumes it.
    pub fn snapshot(&self) -> Vec<RouteDefinition> {
        self.routes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }

    /// Insert a route, or replace the existing route with the same id.
    pub fn upsert(&self, route: RouteDefinition) -> Result<(), RouteError> {
        route.validate()?;
        {
            let mut routes = self.routes.lock();
            match routes.iter_mut().find(|r| r.id == route.id) {
                Some(slot) => *slot = route,
                None => routes.push(route),
            }
        }
        self.events.emit(MatrixEvent::RoutesChanged);
        Ok(())
    }

    /// Remove a route by id. Emits only when something was removed.
    pub fn remove(&self, id: RouteId) -> bool {
        let removed = {
            let mut routes = self.routes.lock();
            let before = routes.len();
            routes.retain(|r| r.id != id);
            routes.len() != before
        };
        if removed {
            self.events.emit(MatrixEvent::RoutesChanged);
        }
        removed
    }

    /// Replace the whole set atomically. Exactly one notification is
    /// emitted, and nothing is applied if any route fails validation.
    pub fn replace_all(
        &self,
        routes: impl IntoIterator<Item = RouteDefinition>,
    ) -> Result<(), RouteError> {
        let routes: Vec<RouteDefinition> = routes.into_iter().collect();
        for route in &routes {
            route.validate()?;
        }
        *self.routes.lock() = routes;
        self.events.emit(MatrixEvent::RoutesChanged);
        Ok(())
    }
}

impl Default for RouteMatrix {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only mapping from source endpoint to the routes originating there.
///
/// Built from a matrix snapshot and published by atomic pointer swap;
/// iteration holds no lock.
#[derive(Debug, Default)]
pub struct RouteIndex {
    by_source: HashMap<EndpointId, Vec<RouteDefinition>>,
    route_count: usize,
}

impl RouteIndex {
    pub fn build(routes: &[RouteDefinition]) -> Self {
        let mut by_source: HashMap<EndpointId, Vec<RouteDefinition>> = HashMap::new();
        for route in routes {
            by_source
                .entry(route.source.clone())
                .or_default()
                .push(route.clone());
        }
        Self {
            by_source,
            route_count: routes.len(),
        }
    }

    /// Routes originating at `source`, in matrix insertion order.
    pub fn get(&self, source: &EndpointId) -> &[RouteDefinition] {
        self.by_source.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn route_count(&self) -> usize {
        self.route_count
    }

    pub fn source_count(&self) -> usize {
        self.by_source.len()
    }
}
