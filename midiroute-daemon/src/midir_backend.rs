// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! midir-backed port provider
//!
//! The production backend. Endpoint ids are the OS port names midir
//! reports: opaque strings, stable across reconciliations, matched
//! case-insensitively. A name present in both the input and the output
//! port list collapses into a single endpoint supporting both
//! directions.
//!
//! midir hands every connection its own client, so each open creates a
//! fresh `MidiInput`/`MidiOutput` and consumes it into the connection.
//! Dropping the connection closes the OS port, which makes handle close
//! idempotent for free.

use crate::provider::{InboundSink, InputPort, OutputPort, PortError, PortProvider};
use chrono::Utc;
use midir::{MidiInput, MidiOutput, MidiInputConnection, MidiOutputConnection};
use midiroute_core::endpoint::{EndpointDescriptor, EndpointId, EndpointKind};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Port provider backed by the system MIDI services via midir.
pub struct MidirPortProvider {
    client_name: String,
}

impl MidirPortProvider {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn midi_input(&self) -> Result<MidiInput, PortError> {
        MidiInput::new(&self.client_name).map_err(|e| PortError::Backend(e.to_string()))
    }

    fn midi_output(&self) -> Result<MidiOutput, PortError> {
        MidiOutput::new(&self.client_name).map_err(|e| PortError::Backend(e.to_string()))
    }
}

impl PortProvider for MidirPortProvider {
    fn scan(&self) -> Result<Vec<EndpointDescriptor>, PortError> {
        let midi_in = self.midi_input()?;
        let midi_out = self.midi_output()?;

        // Keyed case-insensitively by port name; duplicate names merge
        // into one endpoint carrying both directions.
        let mut endpoints: HashMap<EndpointId, EndpointDescriptor> = HashMap::new();

        for port in midi_in.ports() {
            let Ok(name) = midi_in.port_name(&port) else {
                continue;
            };
            let id = EndpointId::from(name.as_str());
            endpoints
                .entry(id.clone())
                .or_insert_with(|| hardware_descriptor(id, name))
                .supports_input = true;
        }
        for port in midi_out.ports() {
            let Ok(name) = midi_out.port_name(&port) else {
                continue;
            };
            let id = EndpointId::from(name.as_str());
            endpoints
                .entry(id.clone())
                .or_insert_with(|| hardware_descriptor(id, name))
                .supports_output = true;
        }

        debug!(count = endpoints.len(), "scanned MIDI endpoints");
        Ok(endpoints.into_values().collect())
    }

    fn open_input(
        &self,
        id: &EndpointId,
        sink: InboundSink,
    ) -> Result<Box<dyn InputPort>, PortError> {
        let midi_in = self.midi_input()?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|name| EndpointId::from(name.as_str()) == *id)
                    .unwrap_or(false)
            })
            .ok_or_else(|| PortError::Unavailable(format!("no input port named '{id}'")))?;

        let source_id = id.clone();
        let callback = move |_timestamp: u64, message: &[u8], _: &mut ()| {
            trace!(bytes = message.len(), "MIDI callback: {:02X?}", message);
            // The sink must not block; it enqueues and returns.
            sink(source_id.clone(), message.to_vec(), Utc::now());
        };

        let connection = midi_in
            .connect(&port, &format!("midiroute-in-{id}"), callback, ())
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        debug!(%id, "opened input port");
        Ok(Box::new(MidirInput {
            connection: Some(connection),
        }))
    }

    fn open_output(&self, id: &EndpointId) -> Result<Box<dyn OutputPort>, PortError> {
        let midi_out = self.midi_output()?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| EndpointId::from(name.as_str()) == *id)
                    .unwrap_or(false)
            })
            .ok_or_else(|| PortError::Unavailable(format!("no output port named '{id}'")))?;

        let connection = midi_out
            .connect(&port, &format!("midiroute-out-{id}"))
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        debug!(%id, "opened output port");
        Ok(Box::new(MidirOutput {
            connection: Some(connection),
        }))
    }
}

fn hardware_descriptor(id: EndpointId, name: String) -> EndpointDescriptor {
    EndpointDescriptor {
        id,
        name,
        kind: EndpointKind::Hardware,
        supports_input: false,
        supports_output: false,
        is_online: true,
        is_user_managed: false,
    }
}

struct MidirInput {
    connection: Option<MidiInputConnection<()>>,
}

impl InputPort for MidirInput {
    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection);
        }
    }
}

impl Drop for MidirInput {
    fn drop(&mut self) {
        self.close();
    }
}

struct MidirOutput {
    connection: Option<MidiOutputConnection>,
}

impl OutputPort for MidirOutput {
    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        match &mut self.connection {
            Some(connection) => connection.send(bytes).map_err(|e| {
                warn!("MIDI send failed: {e}");
                PortError::Closed
            }),
            None => Err(PortError::Closed),
        }
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection);
        }
    }
}

impl Drop for MidirOutput {
    fn drop(&mut self) {
        self.close();
    }
}
