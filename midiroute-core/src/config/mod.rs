// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Configuration schema and persistence

mod loader;
mod types;

pub use loader::{JsonLoopbackStore, load_app_config, save_app_config};
pub use types::{AppConfig, CONFIG_VERSION, DEFAULT_PROFILE, ProfileConfig, RouteEntry};
