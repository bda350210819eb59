// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Shared harness for integration tests: a full engine stack over the
//! in-memory mock provider.

// Not every test binary uses every helper.
#![allow(dead_code)]

use midiroute_core::catalog::EndpointCatalog;
use midiroute_core::endpoint::EndpointDescriptor;
use midiroute_core::message_log::MessageLog;
use midiroute_core::packet::MidiPacket;
use midiroute_core::route::RouteMatrix;
use midiroute_core::testing::MemoryLoopbackStore;
use midiroute_core::traffic::TrafficAnalyzer;
use midiroute_daemon::testing::MockProvider;
use midiroute_daemon::{
    MidiSession, ProviderSet, RoutingWorker, SessionConfig, WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct Stack {
    pub provider: MockProvider,
    pub catalog: Arc<EndpointCatalog>,
    pub matrix: Arc<RouteMatrix>,
    pub session: Arc<MidiSession>,
    pub worker: Arc<RoutingWorker>,
    pub log: Arc<MessageLog>,
    pub traffic: Arc<TrafficAnalyzer>,
    pub cancel: CancellationToken,
    packets: Option<mpsc::UnboundedReceiver<MidiPacket>>,
}

pub fn build_stack(endpoints: Vec<EndpointDescriptor>) -> Stack {
    let provider = MockProvider::new(endpoints);
    let providers = ProviderSet::native(Arc::new(provider.clone()));
    let catalog = Arc::new(EndpointCatalog::new(
        Arc::new(provider.clone()),
        Arc::new(MemoryLoopbackStore::default()),
    ));
    let matrix = Arc::new(RouteMatrix::new());
    let log = Arc::new(MessageLog::new());
    let traffic = Arc::new(TrafficAnalyzer::new());

    // Short debounce keeps hot-plug tests fast.
    let session_config = SessionConfig {
        debounce: Duration::from_millis(10),
        ..SessionConfig::default()
    };
    let (session, packets) = MidiSession::new(catalog.clone(), providers, session_config);
    let worker = Arc::new(RoutingWorker::new(
        matrix.clone(),
        catalog.clone(),
        session.clone(),
        traffic.clone(),
        log.clone(),
        WorkerConfig::default(),
    ));

    Stack {
        provider,
        catalog,
        matrix,
        session,
        worker,
        log,
        traffic,
        cancel: CancellationToken::new(),
        packets: Some(packets),
    }
}

impl Stack {
    /// Refresh the catalog, start the worker, then the session — the
    /// supervisor's startup order.
    pub async fn start(&mut self) {
        self.catalog.refresh().expect("catalog refresh");
        let packets = self.packets.take().expect("stack already started");
        self.worker
            .start(packets, self.cancel.child_token())
            .expect("worker start");
        self.session
            .clone()
            .start(self.cancel.child_token())
            .await
            .expect("session start");
    }

    pub async fn stop(&self) {
        self.worker.stop().await.expect("worker stop");
        self.session.stop().await.expect("session stop");
    }

    /// For tests that drive the supervisor themselves.
    pub fn take_packets(&mut self) -> mpsc::UnboundedReceiver<MidiPacket> {
        self.packets.take().expect("packets already taken")
    }
}

/// Poll until `cond` holds, failing after two seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
