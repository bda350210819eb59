// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Runtime supervisor: startup and shutdown ordering
//!
//! Startup refreshes the catalog, starts the routing worker (so the
//! queue has its consumer before packets can flow), then starts the
//! session. Shutdown reverses: stop the worker, then the session. Every
//! step is awaited, and a failing step never skips the remaining
//! shutdown steps.

use crate::error::{DaemonError, Result};
use crate::session::MidiSession;
use crate::worker::RoutingWorker;
use midiroute_core::catalog::EndpointCatalog;
use midiroute_core::packet::MidiPacket;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct RuntimeSupervisor {
    catalog: Arc<EndpointCatalog>,
    session: Arc<MidiSession>,
    worker: Arc<RoutingWorker>,
    packets: Mutex<Option<mpsc::UnboundedReceiver<MidiPacket>>>,
    cancel: CancellationToken,
}

impl RuntimeSupervisor {
    pub fn new(
        catalog: Arc<EndpointCatalog>,
        session: Arc<MidiSession>,
        worker: Arc<RoutingWorker>,
        packets: mpsc::UnboundedReceiver<MidiPacket>,
    ) -> Self {
        Self {
            catalog,
            session,
            worker,
            packets: Mutex::new(Some(packets)),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        info!("runtime starting");
        self.catalog.refresh()?;

        let packets = self
            .packets
            .lock()
            .take()
            .ok_or(DaemonError::AlreadyRunning)?;
        self.worker.start(packets, self.cancel.child_token())?;
        self.session
            .clone()
            .start(self.cancel.child_token())
            .await?;

        info!("runtime started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("runtime shutting down");
        if let Err(e) = self.worker.stop().await {
            error!("failed to stop routing worker: {e}");
        }
        if let Err(e) = self.session.stop().await {
            error!("failed to stop session: {e}");
        }
        info!("runtime shut down");
    }
}
