// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Bridging core change events onto the tokio runtime
//!
//! The core components broadcast changes over crossbeam channels so they
//! stay runtime-agnostic. Async consumers (the session's reconciler, the
//! routing worker) need those notifications inside `tokio::select!`
//! loops, so each subscription gets a dedicated forwarder thread that
//! blocks on the crossbeam receiver and pushes into an unbounded tokio
//! channel. The thread exits when the publisher goes away or when its
//! stop channel is dropped.

use crossbeam_channel::Receiver;
use tokio::sync::mpsc;

/// Handle that stops the forwarder thread when dropped.
pub(crate) struct BridgeGuard {
    _stop: crossbeam_channel::Sender<()>,
}

/// Forward every event from `events`, mapped through `map`, into `tx`.
pub(crate) fn spawn_event_bridge<T, U>(
    events: Receiver<T>,
    tx: mpsc::UnboundedSender<U>,
    map: impl Fn(T) -> U + Send + 'static,
) -> BridgeGuard
where
    T: Send + 'static,
    U: Send + 'static,
{
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    std::thread::spawn(move || {
        loop {
            crossbeam_channel::select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if tx.send(map(event)).is_err() {
                            break;
                        }
                    }
                    // Publisher dropped; nothing more will arrive.
                    Err(_) => break,
                },
                recv(stop_rx) -> _ => break,
            }
        }
    });
    BridgeGuard { _stop: stop_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_events_until_guard_drops() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = spawn_event_bridge(event_rx, tx, |n: u32| n * 2);

        event_tx.send(21).unwrap();
        let forwarded = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(forwarded, Some(42));

        drop(guard);
        // The thread exits; the tokio side eventually reads a close.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn exits_when_publisher_drops() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<u8>();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = spawn_event_bridge(event_rx, tx, |n| n);

        drop(event_tx);
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(closed, None);
    }
}
