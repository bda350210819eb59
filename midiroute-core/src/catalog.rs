// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Endpoint catalog
//!
//! The catalog is the inventory of everything packets can flow through:
//! hardware endpoints discovered through a [`HardwareScanner`], and
//! user-managed loopback endpoints persisted through a [`LoopbackStore`].
//! Hardware entries are only ever discovered or removed; loopbacks are
//! created, renamed, and deleted by operator actions, and every loopback
//! mutation persists before it commits, so a [`CatalogError::PersistenceFailed`]
//! leaves memory exactly as it was.
//!
//! A platform watcher feeds hot-plug deltas in through
//! [`EndpointCatalog::apply_signal`]; the merge rules treat each port
//! direction independently, and an endpoint left with neither direction
//! is dropped from the inventory.

use crate::endpoint::{EndpointDescriptor, EndpointId, EndpointKind, LOOPBACK_ID_PREFIX};
use crate::error::CatalogError;
use crate::events::EventHub;
use chrono::Utc;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Enumerates the hardware endpoints currently visible to the OS.
pub trait HardwareScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, CatalogError>;
}

/// Persists the user-managed loopback definitions.
///
/// Implementations write atomically (tmp-then-rename) and recover from a
/// malformed document by backing it up and returning the empty set.
pub trait LoopbackStore: Send + Sync {
    fn load(&self) -> Result<Vec<LoopbackRecord>, CatalogError>;
    fn save(&self, records: &[LoopbackRecord]) -> Result<(), CatalogError>;
}

/// Persisted form of one loopback endpoint.
///
/// `client_name` is the backend-specific field of the current schema; a
/// legacy `{ id, name }` document still loads and is upgraded the next
/// time the set is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackRecord {
    pub id: EndpointId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl LoopbackRecord {
    fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: EndpointKind::Loopback,
            supports_input: true,
            supports_output: true,
            is_online: true,
            is_user_managed: true,
        }
    }
}

/// Direction of one half of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Hot-plug delta from the platform watcher.
#[derive(Debug, Clone)]
pub enum HardwareSignal {
    Attached {
        id: EndpointId,
        name: String,
        direction: PortDirection,
    },
    Detached {
        id: EndpointId,
        direction: PortDirection,
    },
    Renamed {
        id: EndpointId,
        name: String,
    },
}

/// Catalog change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    EndpointsChanged,
}

struct CatalogState {
    hardware: Vec<EndpointDescriptor>,
    loopbacks: Vec<LoopbackRecord>,
}

/// Observable inventory of hardware and loopback endpoints.
pub struct EndpointCatalog {
    scanner: Arc<dyn HardwareScanner>,
    store: Arc<dyn LoopbackStore>,
    state: Mutex<CatalogState>,
    events: EventHub<CatalogEvent>,
}

impl EndpointCatalog {
    pub fn new(scanner: Arc<dyn HardwareScanner>, store: Arc<dyn LoopbackStore>) -> Self {
        Self {
            scanner,
            store,
            state: Mutex::new(CatalogState {
                hardware: Vec::new(),
                loopbacks: Vec::new(),
            }),
            events: EventHub::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// Ordered snapshot: hardware before loopbacks, names compared
    /// case-insensitively within each kind.
    pub fn list(&self) -> Vec<EndpointDescriptor> {
        let state = self.state.lock();
        let mut endpoints: Vec<EndpointDescriptor> = state.hardware.clone();
        endpoints.extend(state.loopbacks.iter().map(LoopbackRecord::descriptor));
        drop(state);
        endpoints.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        endpoints
    }

    /// Look up a single endpoint by id.
    pub fn get(&self, id: &EndpointId) -> Option<EndpointDescriptor> {
        let state = self.state.lock();
        state
            .hardware
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .or_else(|| {
                state
                    .loopbacks
                    .iter()
                    .find(|r| &r.id == id)
                    .map(LoopbackRecord::descriptor)
            })
    }

    /// Re-enumerate hardware and reload persisted loopbacks.
    ///
    /// Emits [`CatalogEvent::EndpointsChanged`] exactly once per
    /// successful refresh, even when nothing changed: downstream
    /// consumers are idempotent and some (the session reconciler) rely
    /// on the wake-up to retry previously unavailable ports.
    pub fn refresh(&self) -> Result<(), CatalogError> {
        let hardware = self.scanner.scan()?;
        let loopbacks = self.store.load()?;
        debug!(
            hardware = hardware.len(),
            loopbacks = loopbacks.len(),
            "catalog refreshed"
        );
        {
            let mut state = self.state.lock();
            state.hardware = hardware;
            state.loopbacks = loopbacks;
        }
        self.events.emit(CatalogEvent::EndpointsChanged);
        Ok(())
    }

    /// Merge one hot-plug delta into the hardware section.
    pub fn apply_signal(&self, signal: HardwareSignal) {
        let changed = {
            let mut state = self.state.lock();
            match signal {
                HardwareSignal::Attached {
                    id,
                    name,
                    direction,
                } => {
                    match state.hardware.iter_mut().find(|e| e.id == id) {
                        Some(existing) => {
                            match direction {
                                PortDirection::Input => existing.supports_input = true,
                                PortDirection::Output => existing.supports_output = true,
                            }
                            existing.name = name;
                            existing.is_online = true;
                        }
                        None => state.hardware.push(EndpointDescriptor {
                            id,
                            name,
                            kind: EndpointKind::Hardware,
                            supports_input: direction == PortDirection::Input,
                            supports_output: direction == PortDirection::Output,
                            is_online: true,
                            is_user_managed: false,
                        }),
                    }
                    true
                }
                HardwareSignal::Detached { id, direction } => {
                    match state.hardware.iter().position(|e| e.id == id) {
                        Some(pos) => {
                            let endpoint = &mut state.hardware[pos];
                            match direction {
                                PortDirection::Input => endpoint.supports_input = false,
                                PortDirection::Output => endpoint.supports_output = false,
                            }
                            if !endpoint.supports_input && !endpoint.supports_output {
                                state.hardware.remove(pos);
                            }
                            true
                        }
                        None => false,
                    }
                }
                HardwareSignal::Renamed { id, name } => {
                    match state.hardware.iter_mut().find(|e| e.id == id) {
                        Some(existing) => {
                            existing.name = name;
                            true
                        }
                        None => false,
                    }
                }
            }
        };
        if changed {
            self.events.emit(CatalogEvent::EndpointsChanged);
        }
    }

    /// Create a user-managed loopback endpoint.
    ///
    /// The name is trimmed; a blank name falls back to `Loopback HHmmss`.
    /// Persistence happens before the in-memory commit, so a failed save
    /// leaves the catalog untouched.
    pub fn create_loopback(&self, name: &str) -> Result<EndpointDescriptor, CatalogError> {
        let name = normalize_loopback_name(name);
        let record = LoopbackRecord {
            id: EndpointId::from(format!("{}{}", LOOPBACK_ID_PREFIX, Uuid::new_v4().simple())),
            name,
            client_name: None,
        };

        let mut state = self.state.lock();
        let mut next = state.loopbacks.clone();
        next.push(record.clone());
        self.store.save(&next)?;
        state.loopbacks = next;
        drop(state);

        info!(id = %record.id, name = %record.name, "loopback endpoint created");
        self.events.emit(CatalogEvent::EndpointsChanged);
        Ok(record.descriptor())
    }

    /// Rename a user-managed loopback. Returns `false` when `id` does
    /// not name one (hardware endpoints are never renamed here).
    pub fn rename_loopback(&self, id: &EndpointId, new_name: &str) -> Result<bool, CatalogError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(false);
        }

        let mut state = self.state.lock();
        let Some(pos) = state.loopbacks.iter().position(|r| &r.id == id) else {
            return Ok(false);
        };
        let mut next = state.loopbacks.clone();
        next[pos].name = new_name.to_string();
        self.store.save(&next)?;
        state.loopbacks = next;
        drop(state);

        self.events.emit(CatalogEvent::EndpointsChanged);
        Ok(true)
    }

    /// Delete a user-managed loopback. Returns `false` when `id` does
    /// not name one.
    pub fn delete_loopback(&self, id: &EndpointId) -> Result<bool, CatalogError> {
        let mut state = self.state.lock();
        if !state.loopbacks.iter().any(|r| &r.id == id) {
            return Ok(false);
        }
        let next: Vec<LoopbackRecord> = state
            .loopbacks
            .iter()
            .filter(|r| &r.id != id)
            .cloned()
            .collect();
        self.store.save(&next)?;
        state.loopbacks = next;
        drop(state);

        info!(%id, "loopback endpoint deleted");
        self.events.emit(CatalogEvent::EndpointsChanged);
        Ok(true)
    }
}

fn normalize_loopback_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let fallback = format!("Loopback {}", Utc::now().format("%H%M%S"));
        warn!(%fallback, "blank loopback name, using fallback");
        fallback
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLoopbackStore, StaticScanner};

    fn hw(id: &str, input: bool, output: bool) -> EndpointDescriptor {
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

    fn catalog_with(
        endpoints: Vec<EndpointDescriptor>,
    ) -> (EndpointCatalog, Arc<MemoryLoopbackStore>) {
        let scanner = Arc::new(StaticScanner::new(endpoints));
        let store = Arc::new(MemoryLoopbackStore::default());
        (EndpointCatalog::new(scanner, store.clone()), store)
    }

    #[test]
    fn refresh_populates_and_emits_once() {
        let (catalog, _) = catalog_with(vec![hw("hw:b", true, false), hw("hw:a", false, true)]);
        let rx = catalog.subscribe();

        catalog.refresh().unwrap();

        assert_eq!(rx.try_recv(), Ok(CatalogEvent::EndpointsChanged));
        assert!(rx.try_recv().is_err());

        let listed = catalog.list();
        assert_eq!(listed.len(), 2);
        // Sorted by name within the hardware section.
        assert_eq!(listed[0].id.as_str(), "hw:a");
        assert_eq!(listed[1].id.as_str(), "hw:b");
    }

    #[test]
    fn refresh_is_idempotent() {
        let (catalog, _) = catalog_with(vec![hw("hw:a", true, true)]);
        catalog.refresh().unwrap();
        let first = catalog.list();
        catalog.refresh().unwrap();
        assert_eq!(catalog.list(), first);
    }

    #[test]
    fn attach_ors_directions_into_one_endpoint() {
        let (catalog, _) = catalog_with(vec![]);
        catalog.apply_signal(HardwareSignal::Attached {
            id: "hw:x".into(),
            name: "X".into(),
            direction: PortDirection::Input,
        });
        catalog.apply_signal(HardwareSignal::Attached {
            id: "HW:X".into(),
            name: "X".into(),
            direction: PortDirection::Output,
        });

        let listed = catalog.list();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].supports_input);
        assert!(listed[0].supports_output);
    }

    #[test]
    fn detach_clears_one_direction_then_drops() {
        let (catalog, _) = catalog_with(vec![hw("hw:x", true, true)]);
        catalog.refresh().unwrap();

        catalog.apply_signal(HardwareSignal::Detached {
            id: "hw:x".into(),
            direction: PortDirection::Input,
        });
        let listed = catalog.list();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].supports_input);
        assert!(listed[0].supports_output);

        catalog.apply_signal(HardwareSignal::Detached {
            id: "hw:x".into(),
            direction: PortDirection::Output,
        });
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn detach_of_unknown_endpoint_is_silent() {
        let (catalog, _) = catalog_with(vec![]);
        let rx = catalog.subscribe();
        catalog.apply_signal(HardwareSignal::Detached {
            id: "hw:ghost".into(),
            direction: PortDirection::Input,
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn create_loopback_assigns_prefixed_id_and_persists() {
        let (catalog, store) = catalog_with(vec![]);
        let desc = catalog.create_loopback("  My Loop  ").unwrap();

        assert!(desc.id.is_loopback());
        assert_eq!(desc.name, "My Loop");
        assert_eq!(desc.kind, EndpointKind::Loopback);
        assert!(desc.supports_input && desc.supports_output);
        assert!(desc.is_user_managed);

        let saved = store.records();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "My Loop");
    }

    #[test]
    fn blank_loopback_name_gets_fallback() {
        let (catalog, _) = catalog_with(vec![]);
        let desc = catalog.create_loopback("   ").unwrap();
        assert!(desc.name.starts_with("Loopback "));
    }

    #[test]
    fn failed_persistence_rolls_back() {
        let (catalog, store) = catalog_with(vec![]);
        store.fail_next_save();

        let err = catalog.create_loopback("doomed").unwrap_err();
        assert!(matches!(err, CatalogError::PersistenceFailed(_)));
        assert!(catalog.list().is_empty());
        assert!(store.records().is_empty());
    }

    #[test]
    fn rename_and_delete_apply_to_loopbacks_only() {
        let (catalog, _) = catalog_with(vec![hw("hw:a", true, false)]);
        catalog.refresh().unwrap();
        let desc = catalog.create_loopback("loop").unwrap();

        assert!(catalog.rename_loopback(&desc.id, "renamed").unwrap());
        assert_eq!(catalog.get(&desc.id).unwrap().name, "renamed");

        // Hardware ids are not user-managed.
        assert!(!catalog.rename_loopback(&"hw:a".into(), "nope").unwrap());
        assert!(!catalog.delete_loopback(&"hw:a".into()).unwrap());

        assert!(catalog.delete_loopback(&desc.id).unwrap());
        assert!(catalog.get(&desc.id).is_none());
        assert!(!catalog.delete_loopback(&desc.id).unwrap());
    }

    #[test]
    fn loopbacks_sort_after_hardware() {
        let (catalog, _) = catalog_with(vec![hw("hw:z", true, false)]);
        catalog.refresh().unwrap();
        catalog.create_loopback("aaa").unwrap();

        let listed = catalog.list();
        assert_eq!(listed[0].kind, EndpointKind::Hardware);
        assert_eq!(listed[1].kind, EndpointKind::Loopback);
    }
}
