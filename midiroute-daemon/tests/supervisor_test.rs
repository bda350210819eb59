// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Startup/shutdown ordering through the runtime supervisor.

mod common;

use common::{build_stack, wait_until};
use midiroute_core::endpoint::EndpointId;
use midiroute_core::filter::RouteFilter;
use midiroute_core::route::RouteDefinition;
use midiroute_daemon::testing::hardware_endpoint;
use midiroute_daemon::{RuntimeSupervisor, SessionState};

#[tokio::test]
async fn full_stack_routes_and_shuts_down_cleanly() {
    let mut stack = build_stack(vec![
        hardware_endpoint("hw:in1", true, false),
        hardware_endpoint("hw:out1", false, true),
    ]);
    stack
        .matrix
        .upsert(RouteDefinition::new(
            "hw:in1".into(),
            "hw:out1".into(),
            RouteFilter::allow_all(),
        ))
        .unwrap();

    let packets = stack.take_packets();
    let supervisor = RuntimeSupervisor::new(
        stack.catalog.clone(),
        stack.session.clone(),
        stack.worker.clone(),
        packets,
    );

    supervisor.start().await.unwrap();
    assert_eq!(stack.session.state(), SessionState::Running);

    stack.provider.inject(&"hw:in1".into(), &[0x90, 60, 100]);
    wait_until("packet routed", || stack.provider.sent().len() == 1).await;
    assert_eq!(stack.provider.sent()[0].0, EndpointId::from("hw:out1"));

    supervisor.shutdown().await;
    assert_eq!(stack.session.state(), SessionState::Stopped);
    assert!(stack.provider.open_inputs().is_empty());
    assert!(stack.provider.open_outputs().is_empty());
}

#[tokio::test]
async fn second_start_is_rejected() {
    let mut stack = build_stack(vec![]);
    let packets = stack.take_packets();
    let supervisor = RuntimeSupervisor::new(
        stack.catalog.clone(),
        stack.session.clone(),
        stack.worker.clone(),
        packets,
    );

    supervisor.start().await.unwrap();
    assert!(supervisor.start().await.is_err());
    supervisor.shutdown().await;
}

#[tokio::test]
async fn shutdown_without_start_is_harmless() {
    let mut stack = build_stack(vec![]);
    let packets = stack.take_packets();
    let supervisor = RuntimeSupervisor::new(
        stack.catalog.clone(),
        stack.session.clone(),
        stack.worker.clone(),
        packets,
    );

    supervisor.shutdown().await;
    assert_eq!(stack.session.state(), SessionState::Stopped);
}
