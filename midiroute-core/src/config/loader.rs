// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Configuration persistence
//!
//! Loads tolerate damage: a missing document yields defaults, a
//! malformed one is backed up with a `.corrupt-<UTCstamp>.bak` suffix
//! and replaced by defaults. Saves go through write-tmp-then-rename so a
//! crash mid-write never leaves a torn document, and anything written
//! before a save is reflected by the next load.

use crate::catalog::{LoopbackRecord, LoopbackStore};
use crate::config::types::{AppConfig, CONFIG_VERSION, LegacyConfigV1};
use crate::error::{CatalogError, ConfigError};
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load the routing configuration.
///
/// Returns defaults for a missing file; backs up and returns defaults
/// for a malformed or unknown-version one. Only a genuine IO failure is
/// an error.
pub fn load_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(AppConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    match parse_versioned(&raw) {
        Some(mut config) => {
            config.sanitize();
            Ok(config)
        }
        None => {
            backup_corrupt(path);
            Ok(AppConfig::default())
        }
    }
}

/// Persist the routing configuration atomically.
pub fn save_app_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    atomic_write(path, json.as_bytes())?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

fn parse_versioned(raw: &str) -> Option<AppConfig> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("config is not valid JSON: {e}");
            return None;
        }
    };
    match value.get("version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == CONFIG_VERSION as u64 => match serde_json::from_value(value) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("config failed schema validation: {e}");
                None
            }
        },
        Some(1) => match serde_json::from_value::<LegacyConfigV1>(value) {
            Ok(legacy) => {
                info!("upgrading version 1 config to version {CONFIG_VERSION}");
                Some(legacy.upgrade())
            }
            Err(e) => {
                warn!("legacy config failed schema validation: {e}");
                None
            }
        },
        Some(other) => {
            warn!("unsupported config version {other}");
            None
        }
        None => {
            warn!("config is missing the required version field");
            None
        }
    }
}

/// Move a damaged document aside so the operator can inspect it.
fn backup_corrupt(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let file_name = path.file_name()?.to_string_lossy();
    let backup = path.with_file_name(format!("{file_name}.corrupt-{stamp}.bak"));
    match fs::rename(path, &backup) {
        Ok(()) => {
            warn!(backup = %backup.display(), "backed up corrupt document");
            Some(backup)
        }
        Err(e) => {
            warn!("failed to back up corrupt document: {e}");
            None
        }
    }
}

/// Write-tmp-then-rename. The rename is atomic on every platform the
/// daemon targets, so readers see either the old or the new document.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}

/// Loopback endpoint persistence backed by a JSON file.
pub struct JsonLoopbackStore {
    path: PathBuf,
}

impl JsonLoopbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LoopbackStore for JsonLoopbackStore {
    fn load(&self) -> Result<Vec<LoopbackRecord>, CatalogError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CatalogError::PersistenceFailed(e.to_string())),
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("loopback document is malformed: {e}");
                backup_corrupt(&self.path);
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[LoopbackRecord]) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| CatalogError::PersistenceFailed(e.to_string()))?;
        atomic_write(&self.path, json.as_bytes())
            .map_err(|e| CatalogError::PersistenceFailed(e.to_string()))
    }
}
