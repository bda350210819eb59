// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Routing worker: drains the inbound queue and dispatches to outputs
//!
//! A single reader task consumes the session's unbounded packet queue,
//! which preserves per-source FIFO order end to end: provider callbacks
//! append in arrival order, and one consumer dispatches in queue order.
//!
//! Route lookups go through a [`RouteIndex`] published via `ArcSwap`:
//! on `RoutesChanged` the worker builds a fresh index from a matrix
//! snapshot and swaps the pointer, so a packet being dispatched sees
//! either the entire old or the entire new route set. The endpoint
//! display-name cache works the same way off `EndpointsChanged`.

use crate::bridge::{BridgeGuard, spawn_event_bridge};
use crate::error::{DaemonError, Result};
use crate::session::MidiSession;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use midiroute_core::catalog::EndpointCatalog;
use midiroute_core::endpoint::EndpointId;
use midiroute_core::message_log::{LogEntry, MessageLog};
use midiroute_core::packet::MidiPacket;
use midiroute_core::route::{RouteId, RouteIndex, RouteMatrix};
use midiroute_core::traffic::TrafficAnalyzer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop` waits for the reader to drain before abandoning it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stop_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Emitted after each successful forward.
#[derive(Debug, Clone)]
pub struct RouteForwarded {
    pub route_id: RouteId,
    pub source: EndpointId,
    pub target: EndpointId,
    pub timestamp: DateTime<Utc>,
}

enum ControlEvent {
    RoutesChanged,
    EndpointsChanged,
}

struct WorkerShared {
    matrix: Arc<RouteMatrix>,
    catalog: Arc<EndpointCatalog>,
    session: Arc<MidiSession>,
    traffic: Arc<TrafficAnalyzer>,
    log: Arc<MessageLog>,
    index: ArcSwap<RouteIndex>,
    names: ArcSwap<HashMap<EndpointId, String>>,
    forwarded_tx: broadcast::Sender<RouteForwarded>,
    index_epoch: AtomicU64,
    names_epoch: AtomicU64,
}

impl WorkerShared {
    fn rebuild_index(&self) {
        let index = RouteIndex::build(&self.matrix.snapshot());
        debug!(
            routes = index.route_count(),
            sources = index.source_count(),
            "route index rebuilt"
        );
        self.index.store(Arc::new(index));
        self.index_epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn rebuild_names(&self) {
        let names: HashMap<EndpointId, String> = self
            .catalog
            .list()
            .into_iter()
            .map(|e| (e.id, e.name))
            .collect();
        self.names.store(Arc::new(names));
        self.names_epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn name_of(&self, id: &EndpointId) -> String {
        self.names
            .load()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn dispatch(&self, packet: &MidiPacket) {
        let source = &packet.source_endpoint_id;
        self.traffic.register(source, packet.data.len(), packet.channel);
        self.log.add(LogEntry {
            timestamp: packet.timestamp,
            endpoint_name: self.name_of(source),
            channel: packet.channel,
            message_type: packet.message_type,
            detail: format!("IN {}", packet.detail()),
        });

        // The index version fetched here serves the whole packet.
        let index = self.index.load();
        for route in index.get(source) {
            if !route.enabled {
                continue;
            }
            if !route.filter.allows(packet.channel, packet.message_type) {
                continue;
            }
            match self.session.send(&route.target, packet) {
                Ok(()) => {
                    self.traffic
                        .register(&route.target, packet.data.len(), packet.channel);
                    self.log.add(LogEntry {
                        timestamp: Utc::now(),
                        endpoint_name: self.name_of(&route.target),
                        channel: packet.channel,
                        message_type: packet.message_type,
                        detail: format!(
                            "Routed from {} {}",
                            self.name_of(&route.source),
                            packet.detail()
                        ),
                    });
                    let _ = self.forwarded_tx.send(RouteForwarded {
                        route_id: route.id,
                        source: route.source.clone(),
                        target: route.target.clone(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    self.log.add(LogEntry {
                        timestamp: Utc::now(),
                        endpoint_name: self.name_of(&route.target),
                        channel: packet.channel,
                        message_type: packet.message_type,
                        detail: format!("ERROR {e}"),
                    });
                }
            }
        }
    }
}

struct WorkerRuntime {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    _bridges: Vec<BridgeGuard>,
}

/// Consumes inbound packets and forwards them along matching routes.
pub struct RoutingWorker {
    shared: Arc<WorkerShared>,
    config: WorkerConfig,
    runtime: Mutex<Option<WorkerRuntime>>,
}

impl RoutingWorker {
    pub fn new(
        matrix: Arc<RouteMatrix>,
        catalog: Arc<EndpointCatalog>,
        session: Arc<MidiSession>,
        traffic: Arc<TrafficAnalyzer>,
        log: Arc<MessageLog>,
        config: WorkerConfig,
    ) -> Self {
        let (forwarded_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(WorkerShared {
                matrix,
                catalog,
                session,
                traffic,
                log,
                index: ArcSwap::from_pointee(RouteIndex::default()),
                names: ArcSwap::from_pointee(HashMap::new()),
                forwarded_tx,
                index_epoch: AtomicU64::new(0),
                names_epoch: AtomicU64::new(0),
            }),
            config,
            runtime: Mutex::new(None),
        }
    }

    pub fn subscribe_forwarded(&self) -> broadcast::Receiver<RouteForwarded> {
        self.shared.forwarded_tx.subscribe()
    }

    /// Bumped on every index publish; lets callers await a rebuild.
    pub fn index_epoch(&self) -> u64 {
        self.shared.index_epoch.load(Ordering::SeqCst)
    }

    /// Bumped on every display-name cache rebuild.
    pub fn names_epoch(&self) -> u64 {
        self.shared.names_epoch.load(Ordering::SeqCst)
    }

    /// Rebuild and publish the route index from the current matrix.
    pub fn rebuild_index(&self) {
        self.shared.rebuild_index();
    }

    /// Subscribe to change events, build the initial index and name
    /// cache, and spawn the reader over the session's packet queue.
    pub fn start(
        &self,
        packets: mpsc::UnboundedReceiver<MidiPacket>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Err(DaemonError::AlreadyRunning);
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let bridges = vec![
            spawn_event_bridge(self.shared.matrix.subscribe(), control_tx.clone(), |_| {
                ControlEvent::RoutesChanged
            }),
            spawn_event_bridge(self.shared.catalog.subscribe(), control_tx, |_| {
                ControlEvent::EndpointsChanged
            }),
        ];

        self.shared.rebuild_index();
        self.shared.rebuild_names();

        let token = cancel.child_token();
        let reader = tokio::spawn(Self::reader_loop(
            self.shared.clone(),
            packets,
            control_rx,
            token.clone(),
        ));

        *runtime = Some(WorkerRuntime {
            cancel: token,
            reader,
            _bridges: bridges,
        });
        info!("routing worker started");
        Ok(())
    }

    /// Stop the reader, waiting up to the configured timeout before
    /// abandoning it (the queue is dropped with it).
    pub async fn stop(&self) -> Result<()> {
        let runtime = self.runtime.lock().take();
        let Some(runtime) = runtime else {
            return Ok(());
        };

        runtime.cancel.cancel();
        drop(runtime._bridges);

        let abort = runtime.reader.abort_handle();
        if tokio::time::timeout(self.config.stop_timeout, runtime.reader)
            .await
            .is_err()
        {
            warn!("reader did not stop in time, abandoning it");
            abort.abort();
        }
        info!("routing worker stopped");
        Ok(())
    }

    async fn reader_loop(
        shared: Arc<WorkerShared>,
        mut packets: mpsc::UnboundedReceiver<MidiPacket>,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
        cancel: CancellationToken,
    ) {
        let mut control_open = true;
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                control = control_rx.recv(), if control_open => match control {
                    Some(ControlEvent::RoutesChanged) => shared.rebuild_index(),
                    Some(ControlEvent::EndpointsChanged) => shared.rebuild_names(),
                    None => control_open = false,
                },

                packet = packets.recv() => match packet {
                    Some(packet) => shared.dispatch(&packet),
                    // Queue completed: all writers are gone.
                    None => break,
                },
            }
        }
        debug!("reader loop exited");
    }
}
