// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Structured logging configuration and initialization
//!
//! Console and/or daily-rotated file output via tracing-subscriber.
//! `RUST_LOG` overrides the configured level for per-module filtering.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_format")]
    pub format: String,

    /// Directory for rotated log files
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Mirror log output to the console
    #[serde(default = "default_console_enabled")]
    pub console_enabled: bool,

    /// Write daily-rotated log files under `path`
    #[serde(default)]
    pub file_enabled: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/share/midiroute/logs")
}

fn default_console_enabled() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            path: default_path(),
            console_enabled: default_console_enabled(),
            file_enabled: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self.file_enabled = true;
        self
    }

    pub fn console_only(mut self) -> Self {
        self.file_enabled = false;
        self.console_enabled = true;
        self
    }
}

/// Initialize the tracing subscriber for the whole process.
///
/// Call once at startup; respects `RUST_LOG` over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    if config.file_enabled {
        std::fs::create_dir_all(&config.path)?;
        let file_appender = rolling::daily(&config.path, "midiroute.log");

        if config.format == "json" {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_target(true);
            if config.console_enabled {
                let console_layer = fmt::layer().compact().with_target(true);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .with(console_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .init();
            }
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_target(true);
            if config.console_enabled {
                let console_layer = fmt::layer().compact().with_target(true);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .with(console_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(file_layer)
                    .init();
            }
        }
    } else if config.console_enabled {
        if config.format == "json" {
            let console_layer = fmt::layer().json().with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .init();
        } else {
            let console_layer = fmt::layer().compact().with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .init();
        }
    }

    Ok(())
}
