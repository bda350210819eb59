// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Route and filter validation errors
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Endpoint catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A mutation could not be persisted; the in-memory state was rolled back.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// The hardware scanner failed catastrophically.
    #[error("backend fault: {0}")]
    Backend(String),
}

/// Configuration load/save errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
