// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Midiroute daemon: OS MIDI backends and the routing runtime
//!
//! This crate supplies everything `midiroute-core` keeps abstract: the
//! [`provider::PortProvider`] seam with its midir-backed production
//! implementation, the [`session::MidiSession`] that reconciles open
//! ports against the endpoint catalog, the [`worker::RoutingWorker`]
//! that moves packets from inputs to outputs, and the
//! [`supervisor::RuntimeSupervisor`] that orders startup and shutdown.
//!
//! The `midirouted` binary wires these together from the configuration
//! documents and runs until interrupted.

pub mod bridge;
pub mod error;
pub mod midir_backend;
pub mod provider;
pub mod session;
pub mod supervisor;
pub mod worker;

pub mod testing;

pub use error::{DaemonError, Result};
pub use midir_backend::MidirPortProvider;
pub use provider::{InboundSink, InputPort, OutputPort, PortError, PortProvider, ProviderSet};
pub use session::{MidiSession, SessionConfig, SessionState, StateChange};
pub use supervisor::RuntimeSupervisor;
pub use worker::{RouteForwarded, RoutingWorker, WorkerConfig};
