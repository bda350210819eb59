// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! MIDI session: keeps open OS ports in sync with the endpoint catalog
//!
//! The session owns every port handle. It derives the desired port set
//! from the catalog (online hardware endpoints, split by direction) and
//! reconciles the actually-open set against it: close what is no longer
//! wanted, open what is missing, skip what the backend reports
//! unavailable and retry it on the next pass.
//!
//! Reconciliation runs under a single-permit semaphore. A catalog change
//! arriving while a pass is running sets a pending flag, which buys
//! exactly one follow-up pass; a debounce window in front of the first
//! pass coalesces hot-plug bursts. Both together keep a storm of
//! `EndpointsChanged` events from ever stacking more than one extra
//! reconciliation.
//!
//! Lifecycle: `Stopped → Starting → Running → Stopped`, with
//! `Faulted(detail)` entered from any state when a pass fails fatally
//! and left only by an explicit `stop`. Each transition is announced
//! exactly once; duplicate transitions are suppressed.
//!
//! Loopback endpoints never hold OS handles. A send targeting one is
//! synthesized back into the inbound path with a fresh timestamp, which
//! is the whole loopback contract.

use crate::bridge::{BridgeGuard, spawn_event_bridge};
use crate::error::{DaemonError, Result};
use crate::provider::{InboundSink, InputPort, OutputPort, PortError, ProviderSet};
use chrono::Utc;
use midiroute_core::catalog::EndpointCatalog;
use midiroute_core::endpoint::{EndpointId, EndpointKind};
use midiroute_core::packet::MidiPacket;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Default debounce in front of the first reconciliation pass.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(120);

/// Default cap on a single inbound message (SysEx dominates).
pub const DEFAULT_SYSEX_MAX_BYTES: usize = 64 * 1024;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub sysex_max_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            sysex_max_bytes: DEFAULT_SYSEX_MAX_BYTES,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Faulted(String),
}

/// Announced once per state change.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub state: SessionState,
    pub detail: Option<String>,
}

#[derive(Default)]
struct PortTable {
    inputs: HashMap<EndpointId, Box<dyn InputPort>>,
    outputs: HashMap<EndpointId, Box<dyn OutputPort>>,
}

struct SessionRuntime {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _bridge: BridgeGuard,
}

/// Owns the port handles and the reconciliation loop.
pub struct MidiSession {
    catalog: Arc<EndpointCatalog>,
    providers: ProviderSet,
    config: SessionConfig,
    ports: Mutex<PortTable>,
    state: Mutex<SessionState>,
    state_tx: broadcast::Sender<StateChange>,
    packet_events: broadcast::Sender<MidiPacket>,
    inbound_tx: mpsc::UnboundedSender<MidiPacket>,
    inbound_sink: InboundSink,
    reconcile_gate: Semaphore,
    pending: AtomicBool,
    cancel: Mutex<CancellationToken>,
    runtime: Mutex<Option<SessionRuntime>>,
}

impl MidiSession {
    /// Build a session. The returned receiver is the inbound packet
    /// queue the routing worker drains; provider callbacks and loopback
    /// echoes are its only writers, and neither ever blocks.
    pub fn new(
        catalog: Arc<EndpointCatalog>,
        providers: ProviderSet,
        config: SessionConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MidiPacket>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = broadcast::channel(64);
        let (packet_events, _) = broadcast::channel(256);

        let sink = {
            let inbound_tx = inbound_tx.clone();
            let packet_events = packet_events.clone();
            let max_bytes = config.sysex_max_bytes;
            let sink: InboundSink = Arc::new(move |id, bytes, timestamp| {
                if bytes.len() > max_bytes {
                    warn!(%id, len = bytes.len(), max_bytes, "dropping oversized message");
                    return;
                }
                let Some(packet) = MidiPacket::from_bytes(id, bytes, timestamp) else {
                    trace!("ignoring empty inbound message");
                    return;
                };
                let _ = packet_events.send(packet.clone());
                let _ = inbound_tx.send(packet);
            });
            sink
        };

        let session = Arc::new(Self {
            catalog,
            providers,
            config,
            ports: Mutex::new(PortTable::default()),
            state: Mutex::new(SessionState::Stopped),
            state_tx,
            packet_events,
            inbound_tx,
            inbound_sink: sink,
            reconcile_gate: Semaphore::new(1),
            pending: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            runtime: Mutex::new(None),
        });
        (session, inbound_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Every packet the session emits inbound, hardware or loopback.
    pub fn subscribe_packets(&self) -> broadcast::Receiver<MidiPacket> {
        self.packet_events.subscribe()
    }

    /// Start the session: refresh the catalog, subscribe to its changes,
    /// run one reconciliation, and begin servicing hot-plug events.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        {
            let state = self.state.lock();
            if matches!(*state, SessionState::Starting | SessionState::Running) {
                return Err(DaemonError::AlreadyRunning);
            }
        }
        self.set_state(SessionState::Starting, None);

        let token = cancel.child_token();
        *self.cancel.lock() = token.clone();

        if let Err(e) = self.catalog.refresh() {
            let detail = e.to_string();
            self.fault(detail);
            return Err(e.into());
        }

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let bridge = spawn_event_bridge(self.catalog.subscribe(), notify_tx, |_| ());

        self.reconcile_now().await?;

        let task = tokio::spawn(Self::reconcile_loop(self.clone(), notify_rx, token.clone()));
        *self.runtime.lock() = Some(SessionRuntime {
            cancel: token,
            task,
            _bridge: bridge,
        });

        self.set_state(SessionState::Running, None);
        Ok(())
    }

    /// Stop the session: cancel the reconciler, wait out any in-flight
    /// pass, close every port. Idempotent and safe to call from any
    /// state, including `Faulted`.
    pub async fn stop(&self) -> Result<()> {
        {
            let state = self.state.lock();
            if *state == SessionState::Stopped {
                return Ok(());
            }
        }

        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            runtime.cancel.cancel();
            // Dropping the bridge unsubscribes from the catalog.
            drop(runtime._bridge);
            let _ = runtime.task.await;
        } else {
            self.cancel.lock().cancel();
        }

        // Wait for an in-flight reconciliation to finish.
        if let Ok(permit) = self.reconcile_gate.acquire().await {
            drop(permit);
        }

        {
            let mut ports = self.ports.lock();
            for (_, mut port) in ports.inputs.drain() {
                port.close();
            }
            for (_, mut port) in ports.outputs.drain() {
                port.close();
            }
        }

        self.set_state(SessionState::Stopped, None);
        info!("session stopped");
        Ok(())
    }

    /// Run one reconciliation pass, waiting out any pass in flight.
    /// Rejected while the session is stopped: there is nothing to
    /// reconcile against and no ports to own.
    pub async fn reconcile_now(&self) -> Result<()> {
        if self.state() == SessionState::Stopped {
            return Err(DaemonError::NotRunning);
        }
        let permit = self.reconcile_gate.acquire().await;
        let result = self.reconcile_pass();
        drop(permit);
        if let Err(e) = &result {
            self.fault(e.to_string());
        }
        result
    }

    /// Send one packet to `target`.
    ///
    /// Missing output handles mean the endpoint vanished between index
    /// rebuild and dispatch; the packet is dropped and the call
    /// succeeds. A closed port drops the packet too, but reports it so
    /// the dispatcher can record the failure; the session itself never
    /// retries or escalates. Loopback targets echo the payload back
    /// inbound with a fresh timestamp.
    pub fn send(&self, target: &EndpointId, packet: &MidiPacket) -> Result<()> {
        if self.cancel.lock().is_cancelled() {
            return Ok(());
        }

        if target.is_loopback() {
            if self.catalog.get(target).is_none() {
                trace!(%target, "dropping send to vanished loopback");
                return Ok(());
            }
            let Some(echo) = MidiPacket::from_bytes(target.clone(), packet.data.clone(), Utc::now())
            else {
                return Ok(());
            };
            let _ = self.packet_events.send(echo.clone());
            let _ = self.inbound_tx.send(echo);
            return Ok(());
        }

        let mut ports = self.ports.lock();
        match ports.outputs.get_mut(target) {
            None => {
                trace!(%target, "dropping send to vanished endpoint");
                Ok(())
            }
            Some(port) => match port.send(&packet.data) {
                Ok(()) => Ok(()),
                Err(PortError::Closed) => {
                    trace!(%target, "send hit closed port, packet dropped");
                    Err(DaemonError::Port(PortError::Closed))
                }
                Err(e) => Err(DaemonError::BackendFault(e.to_string())),
            },
        }
    }

    /// Ids of the currently open input ports (diagnostics and tests).
    pub fn open_inputs(&self) -> Vec<EndpointId> {
        self.ports.lock().inputs.keys().cloned().collect()
    }

    /// Ids of the currently open output ports (diagnostics and tests).
    pub fn open_outputs(&self) -> Vec<EndpointId> {
        self.ports.lock().outputs.keys().cloned().collect()
    }

    async fn reconcile_loop(
        session: Arc<Self>,
        mut notify_rx: mpsc::UnboundedReceiver<()>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = notify_rx.recv() => {
                    if changed.is_none() {
                        break;
                    }
                    // Debounce: every further change restarts the window,
                    // so a hot-plug burst triggers one pass.
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(session.config.debounce) => break,
                            more = notify_rx.recv() => {
                                if more.is_none() {
                                    break;
                                }
                            }
                        }
                    }
                    session.run_guarded().await;
                }
            }
        }
        debug!("reconcile loop exited");
    }

    /// One guarded reconciliation. If a pass is already running, only
    /// mark it pending; the runner loops once more when it sees the
    /// flag, which collapses any burst into a single follow-up pass.
    async fn run_guarded(&self) {
        match self.reconcile_gate.try_acquire() {
            Ok(permit) => {
                loop {
                    self.pending.store(false, Ordering::SeqCst);
                    if let Err(e) = self.reconcile_pass() {
                        error!("reconciliation failed: {e}");
                        self.fault(e.to_string());
                        break;
                    }
                    if !self.pending.swap(false, Ordering::SeqCst) {
                        break;
                    }
                }
                drop(permit);
            }
            Err(_) => {
                self.pending.store(true, Ordering::SeqCst);
            }
        }
    }

    fn reconcile_pass(&self) -> Result<()> {
        let cancel = self.cancel.lock().clone();
        let snapshot = self.catalog.list();

        let mut desired_inputs: HashSet<EndpointId> = HashSet::new();
        let mut desired_outputs: HashSet<EndpointId> = HashSet::new();
        for endpoint in snapshot
            .iter()
            .filter(|e| e.is_online && e.kind == EndpointKind::Hardware)
        {
            if endpoint.supports_input {
                desired_inputs.insert(endpoint.id.clone());
            }
            if endpoint.supports_output {
                desired_outputs.insert(endpoint.id.clone());
            }
        }

        let mut ports = self.ports.lock();
        let mut closed = 0usize;
        ports.inputs.retain(|id, port| {
            if desired_inputs.contains(id) {
                true
            } else {
                port.close();
                closed += 1;
                false
            }
        });
        ports.outputs.retain(|id, port| {
            if desired_outputs.contains(id) {
                true
            } else {
                port.close();
                closed += 1;
                false
            }
        });

        let mut opened = 0usize;
        let mut skipped = 0usize;
        for id in &desired_inputs {
            if cancel.is_cancelled() {
                break;
            }
            if ports.inputs.contains_key(id) {
                continue;
            }
            match self
                .providers
                .opener_for(id)
                .open_input(id, self.inbound_sink.clone())
            {
                Ok(handle) => {
                    ports.inputs.insert(id.clone(), handle);
                    opened += 1;
                }
                Err(PortError::Unavailable(reason)) => {
                    debug!(%id, %reason, "input port unavailable, retrying next pass");
                    skipped += 1;
                }
                Err(e) => return Err(DaemonError::BackendFault(e.to_string())),
            }
        }
        for id in &desired_outputs {
            if cancel.is_cancelled() {
                break;
            }
            if ports.outputs.contains_key(id) {
                continue;
            }
            match self.providers.opener_for(id).open_output(id) {
                Ok(handle) => {
                    ports.outputs.insert(id.clone(), handle);
                    opened += 1;
                }
                Err(PortError::Unavailable(reason)) => {
                    debug!(%id, %reason, "output port unavailable, retrying next pass");
                    skipped += 1;
                }
                Err(e) => return Err(DaemonError::BackendFault(e.to_string())),
            }
        }

        debug!(opened, closed, skipped, "reconciliation pass complete");
        Ok(())
    }

    fn fault(&self, detail: String) {
        self.set_state(SessionState::Faulted(detail.clone()), Some(detail));
    }

    fn set_state(&self, state: SessionState, detail: Option<String>) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state.clone();
        }
        info!(state = ?state, "session state changed");
        let _ = self.state_tx.send(StateChange { state, detail });
    }
}
