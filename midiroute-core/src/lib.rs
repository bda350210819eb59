// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Midiroute Core Engine
//!
//! Pure Rust MIDI routing engine with zero UI dependencies.
//!
//! This library holds everything the routing daemon needs that does not
//! touch the OS MIDI layer: message classification, route filters, the
//! authoritative route matrix and its derived index, the endpoint
//! catalog with loopback persistence, traffic counters, the bounded
//! message log, and the configuration schema.
//!
//! The OS-facing half (port providers, the reconciling session, the
//! dispatch worker, and the `midirouted` binary) lives in
//! `midiroute-daemon`, which consumes this crate through the
//! [`catalog::HardwareScanner`] and [`catalog::LoopbackStore`] seams and
//! the change events each component broadcasts.
//!
//! # Data flow
//!
//! ```text
//! ports → session → worker queue → RouteIndex lookup → session.send → ports
//!                     │                                    │
//!                 TrafficAnalyzer                      MessageLog
//! ```
//!
//! Control flow: `EndpointsChanged` drives port reconciliation,
//! `RoutesChanged` drives index rebuilds.

pub mod catalog;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod filter;
pub mod logging;
pub mod message_log;
pub mod packet;
pub mod route;
pub mod taxonomy;
pub mod traffic;

#[cfg(any(test, feature = "test-mocks"))]
pub mod testing;

pub use catalog::{
    CatalogEvent, EndpointCatalog, HardwareScanner, HardwareSignal, LoopbackRecord, LoopbackStore,
    PortDirection,
};
pub use config::{AppConfig, load_app_config, save_app_config};
pub use endpoint::{EndpointDescriptor, EndpointId, EndpointKind};
pub use error::{CatalogError, ConfigError, RouteError};
pub use events::EventHub;
pub use filter::RouteFilter;
pub use logging::{LoggingConfig, init_logging};
pub use message_log::{LogEntry, LogEvent, MessageLog};
pub use packet::MidiPacket;
pub use route::{MatrixEvent, RouteDefinition, RouteId, RouteIndex, RouteMatrix};
pub use taxonomy::MessageType;
pub use traffic::{TrafficAnalyzer, TrafficSnapshot};
