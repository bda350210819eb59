// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! In-memory catalog collaborators for tests
//!
//! Enabled for this crate's own tests and for downstream crates via the
//! `test-mocks` feature.

use crate::catalog::{HardwareScanner, LoopbackRecord, LoopbackStore};
use crate::endpoint::EndpointDescriptor;
use crate::error::CatalogError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scanner over a mutable in-memory endpoint list.
#[derive(Default)]
pub struct StaticScanner {
    endpoints: Mutex<Vec<EndpointDescriptor>>,
    fail: AtomicBool,
}

impl StaticScanner {
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            endpoints: Mutex::new(endpoints),
            fail: AtomicBool::new(false),
        }
    }

    /// Replace the endpoint list the next scan will report.
    pub fn set_endpoints(&self, endpoints: Vec<EndpointDescriptor>) {
        *self.endpoints.lock() = endpoints;
    }

    /// Make every subsequent scan fail with a backend fault.
    pub fn fail_scans(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl HardwareScanner for StaticScanner {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, CatalogError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Backend("simulated scan failure".to_string()));
        }
        Ok(self.endpoints.lock().clone())
    }
}

/// Loopback store that keeps records in memory.
#[derive(Default)]
pub struct MemoryLoopbackStore {
    records: Mutex<Vec<LoopbackRecord>>,
    fail_next_save: AtomicBool,
}

impl MemoryLoopbackStore {
    pub fn records(&self) -> Vec<LoopbackRecord> {
        self.records.lock().clone()
    }

    /// Make the next save fail, simulating an IO error.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

impl LoopbackStore for MemoryLoopbackStore {
    fn load(&self) -> Result<Vec<LoopbackRecord>, CatalogError> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, records: &[LoopbackRecord]) -> Result<(), CatalogError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(CatalogError::PersistenceFailed(
                "simulated save failure".to_string(),
            ));
        }
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}
