// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Session lifecycle, reconciliation, and loopback scenarios.

mod common;

use chrono::Utc;
use common::{build_stack, wait_until};
use midiroute_core::endpoint::EndpointId;
use midiroute_core::packet::MidiPacket;
use midiroute_daemon::testing::hardware_endpoint;
use midiroute_daemon::{DaemonError, SessionState};
use std::time::Duration;

fn sorted(mut ids: Vec<EndpointId>) -> Vec<EndpointId> {
    ids.sort();
    ids
}

#[tokio::test]
async fn start_opens_desired_ports_by_direction() {
    let mut stack = build_stack(vec![
        hardware_endpoint("hw:A", true, false),
        hardware_endpoint("hw:B", false, true),
        hardware_endpoint("hw:Both", true, true),
    ]);
    stack.start().await;

    assert_eq!(
        sorted(stack.provider.open_inputs()),
        vec![EndpointId::from("hw:A"), EndpointId::from("hw:Both")]
    );
    assert_eq!(
        sorted(stack.provider.open_outputs()),
        vec![EndpointId::from("hw:B"), EndpointId::from("hw:Both")]
    );
    assert_eq!(stack.session.state(), SessionState::Running);

    stack.stop().await;
    assert!(stack.provider.open_inputs().is_empty());
    assert!(stack.provider.open_outputs().is_empty());
}

#[tokio::test]
async fn hot_plug_reconciles_without_churn() {
    let mut stack = build_stack(vec![
        hardware_endpoint("hw:A", true, false),
        hardware_endpoint("hw:B", false, true),
    ]);
    stack.start().await;
    assert_eq!(stack.provider.open_count(&"hw:B".into()), 1);

    // hw:A disappears, hw:C appears, hw:B is untouched.
    stack.provider.set_endpoints(vec![
        hardware_endpoint("hw:B", false, true),
        hardware_endpoint("hw:C", true, false),
    ]);
    stack.catalog.refresh().unwrap();

    wait_until("input set converges to hw:C", || {
        stack.provider.open_inputs() == vec![EndpointId::from("hw:C")]
    })
    .await;
    assert_eq!(
        stack.provider.open_outputs(),
        vec![EndpointId::from("hw:B")]
    );
    // No churn on the surviving port.
    assert_eq!(stack.provider.open_count(&"hw:B".into()), 1);

    stack.stop().await;
}

#[tokio::test]
async fn unavailable_ports_are_retried_on_later_passes() {
    let mut stack = build_stack(vec![hardware_endpoint("hw:A", true, false)]);
    stack.provider.set_unavailable(&"hw:A".into(), true);
    stack.start().await;

    // Non-fatal: the session runs with the port skipped.
    assert_eq!(stack.session.state(), SessionState::Running);
    assert!(stack.provider.open_inputs().is_empty());

    stack.provider.set_unavailable(&"hw:A".into(), false);
    stack.catalog.refresh().unwrap();

    wait_until("port opens on retry", || {
        stack.provider.open_inputs() == vec![EndpointId::from("hw:A")]
    })
    .await;

    stack.stop().await;
}

#[tokio::test]
async fn backend_fault_moves_session_to_faulted() {
    let mut stack = build_stack(vec![hardware_endpoint("hw:A", true, false)]);
    stack.provider.set_backend_fault(&"hw:A".into(), true);

    let packets = stack.take_packets();
    drop(packets);
    let result = stack.session.clone().start(stack.cancel.child_token()).await;
    assert!(result.is_err());
    assert!(matches!(stack.session.state(), SessionState::Faulted(_)));

    // Explicit stop leaves Faulted for Stopped.
    stack.session.stop().await.unwrap();
    assert_eq!(stack.session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn state_changes_announce_each_transition_once() {
    let mut stack = build_stack(vec![]);
    let mut state_rx = stack.session.subscribe_state();

    stack.start().await;
    assert_eq!(state_rx.recv().await.unwrap().state, SessionState::Starting);
    assert_eq!(state_rx.recv().await.unwrap().state, SessionState::Running);

    stack.stop().await;
    assert_eq!(state_rx.recv().await.unwrap().state, SessionState::Stopped);

    // stop is idempotent and emits nothing the second time.
    stack.session.stop().await.unwrap();
    assert!(matches!(
        state_rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn reconcile_before_start_is_rejected() {
    let stack = build_stack(vec![hardware_endpoint("hw:A", true, false)]);
    let result = stack.session.reconcile_now().await;
    assert!(matches!(result, Err(DaemonError::NotRunning)));
    assert_eq!(stack.session.state(), SessionState::Stopped);
    assert!(stack.provider.open_inputs().is_empty());
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let mut stack = build_stack(vec![]);
    stack.start().await;
    assert!(
        stack
            .session
            .clone()
            .start(stack.cancel.child_token())
            .await
            .is_err()
    );
    stack.stop().await;
}

#[tokio::test]
async fn loopback_send_echoes_inbound_with_fresh_timestamp() {
    let mut stack = build_stack(vec![]);
    let loopback = stack.catalog.create_loopback("Echo bus").unwrap();
    stack.start().await;

    let mut packets_rx = stack.session.subscribe_packets();
    let original =
        MidiPacket::from_bytes("hw:elsewhere".into(), vec![0x90, 60, 100], Utc::now()).unwrap();

    let before = Utc::now();
    stack.session.send(&loopback.id, &original).unwrap();

    let echoed = tokio::time::timeout(Duration::from_secs(2), packets_rx.recv())
        .await
        .expect("loopback echo")
        .unwrap();
    assert_eq!(echoed.source_endpoint_id, loopback.id);
    assert_eq!(echoed.data, original.data);
    assert!(echoed.timestamp >= before);

    // Exactly one echo.
    assert!(matches!(
        packets_rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    stack.stop().await;
}

#[tokio::test]
async fn send_to_deleted_loopback_is_dropped_silently() {
    let mut stack = build_stack(vec![]);
    let loopback = stack.catalog.create_loopback("short-lived").unwrap();
    stack.start().await;

    stack.catalog.delete_loopback(&loopback.id).unwrap();

    let mut packets_rx = stack.session.subscribe_packets();
    let packet = MidiPacket::from_bytes("hw:x".into(), vec![0xF8], Utc::now()).unwrap();
    stack.session.send(&loopback.id, &packet).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        packets_rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    stack.stop().await;
}

#[tokio::test]
async fn send_to_vanished_hardware_endpoint_is_silent_success() {
    let mut stack = build_stack(vec![hardware_endpoint("hw:A", true, false)]);
    stack.start().await;

    let packet = MidiPacket::from_bytes("hw:A".into(), vec![0x90, 60, 100], Utc::now()).unwrap();
    // No output handle exists for hw:ghost; the send is a silent drop.
    stack
        .session
        .send(&"hw:ghost".into(), &packet)
        .expect("silent success");
    assert!(stack.provider.sent().is_empty());

    stack.stop().await;
}

#[tokio::test]
async fn loopback_created_while_running_reaches_new_refresh() {
    let mut stack = build_stack(vec![]);
    stack.start().await;

    // Creating a loopback emits EndpointsChanged; the reconciler wakes
    // up, finds nothing to open (loopbacks hold no OS ports), and the
    // catalog lists the endpoint for routing.
    let loopback = stack.catalog.create_loopback("live-added").unwrap();
    wait_until("catalog lists the loopback", || {
        stack.catalog.get(&loopback.id).is_some()
    })
    .await;
    assert!(stack.provider.open_inputs().is_empty());

    stack.stop().await;
}
