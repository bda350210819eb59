// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Error types for daemon operations

use crate::provider::PortError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("catalog error: {0}")]
    Catalog(#[from] midiroute_core::CatalogError),

    #[error("configuration error: {0}")]
    Config(#[from] midiroute_core::ConfigError),

    #[error("route error: {0}")]
    Route(#[from] midiroute_core::RouteError),

    #[error("port error: {0}")]
    Port(#[from] PortError),

    #[error("backend fault: {0}")]
    BackendFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
