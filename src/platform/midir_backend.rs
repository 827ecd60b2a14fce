//! Hardware MIDI through `midir`
//!
//! Ports are identified by midir's port id. A handle only stores the id and
//! name; the midir port is looked up again on open, so a handle survives
//! re-enumeration and reports an error once the device is gone.

use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ConnectionState, Direction, InputHandle, InputPort, MessageHandler, MidiAccess,
    MidiAccessProvider, MidiPort, OutputHandle, OutputPort,
};
use crate::error::{Error, Result};
use crate::midi::format_hex;

/// Requests hardware MIDI access through midir
pub struct MidirProvider {
    client_name: String,
}

impl MidirProvider {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

#[async_trait]
impl MidiAccessProvider for MidirProvider {
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>> {
        // Probe both directions so a broken backend fails here, not on first use
        MidiInput::new(&self.client_name)
            .map_err(|e| Error::UnsupportedPlatform(format!("MIDI input: {}", e)))?;
        MidiOutput::new(&self.client_name)
            .map_err(|e| Error::UnsupportedPlatform(format!("MIDI output: {}", e)))?;

        info!("MIDI access granted for client '{}'", self.client_name);
        Ok(Arc::new(MidirAccess::new(self.client_name.clone())))
    }
}

/// Enumerates midir ports, handing out one handle per port id
pub struct MidirAccess {
    client_name: String,
    inputs: Mutex<HashMap<String, Arc<MidirInput>>>,
    outputs: Mutex<HashMap<String, Arc<MidirOutput>>>,
}

impl MidirAccess {
    fn new(client_name: String) -> Self {
        Self {
            client_name,
            inputs: Mutex::new(HashMap::new()),
            outputs: Mutex::new(HashMap::new()),
        }
    }
}

impl MidiAccess for MidirAccess {
    fn inputs(&self) -> Vec<InputHandle> {
        let midi_in = match MidiInput::new(&self.client_name) {
            Ok(m) => m,
            Err(e) => {
                debug!("Failed to enumerate MIDI inputs: {}", e);
                return Vec::new();
            }
        };

        let mut known = self.inputs.lock();
        let mut handles = Vec::new();
        for port in midi_in.ports() {
            let Ok(name) = midi_in.port_name(&port) else {
                continue;
            };
            let id = port.id();
            let handle = known
                .entry(id.clone())
                .or_insert_with(|| Arc::new(MidirInput::new(id, name, self.client_name.clone())))
                .clone();
            handles.push(handle as InputHandle);
        }
        // Unplugged ports get a fresh handle when they come back
        known.retain(|id, _| handles.iter().any(|h| h.id() == id));
        debug!("Found {} MIDI input ports", handles.len());
        handles
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        let midi_out = match MidiOutput::new(&self.client_name) {
            Ok(m) => m,
            Err(e) => {
                debug!("Failed to enumerate MIDI outputs: {}", e);
                return Vec::new();
            }
        };

        let mut known = self.outputs.lock();
        let mut handles = Vec::new();
        for port in midi_out.ports() {
            let Ok(name) = midi_out.port_name(&port) else {
                continue;
            };
            let id = port.id();
            let handle = known
                .entry(id.clone())
                .or_insert_with(|| Arc::new(MidirOutput::new(id, name, self.client_name.clone())))
                .clone();
            handles.push(handle as OutputHandle);
        }
        // Unplugged ports get a fresh handle when they come back
        known.retain(|id, _| handles.iter().any(|h| h.id() == id));
        debug!("Found {} MIDI output ports", handles.len());
        handles
    }
}

/// Hardware input port
pub struct MidirInput {
    id: String,
    name: String,
    client_name: String,
    state: RwLock<ConnectionState>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
    connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl MidirInput {
    fn new(id: String, name: String, client_name: String) -> Self {
        Self {
            id,
            name,
            client_name,
            state: RwLock::new(ConnectionState::Closed),
            handler: Arc::new(RwLock::new(None)),
            connection: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<MidiInputConnection<()>> {
        let midi_in = MidiInput::new(&self.client_name)
            .map_err(|e| Error::DeviceUnavailable(format!("failed to create MIDI input: {}", e)))?;

        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| p.id() == self.id)
            .ok_or_else(|| Error::DeviceUnavailable(format!("input port '{}' not found", self.id)))?;

        let handler = self.handler.clone();
        midi_in
            .connect(
                &port,
                &self.client_name,
                move |_timestamp, data, _| {
                    if let Some(handler) = handler.read().as_ref() {
                        handler(data);
                    }
                },
                (),
            )
            .map_err(|e| Error::DeviceUnavailable(format!("failed to connect input '{}': {}", self.id, e)))
    }
}

impl MidiPort for MidirInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        Direction::Input
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

#[async_trait]
impl InputPort for MidirInput {
    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        *self.handler.write() = handler;
    }

    async fn open(&self) -> Result<()> {
        if self.connection.lock().is_some() {
            return Ok(());
        }

        *self.state.write() = ConnectionState::Pending;
        match self.connect() {
            Ok(connection) => {
                *self.connection.lock() = Some(connection);
                *self.state.write() = ConnectionState::Open;
                info!("Connected to input port: {}", self.name);
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
        }
        *self.state.write() = ConnectionState::Closed;
        info!("Closed input port: {}", self.name);
        Ok(())
    }
}

/// Hardware output port, connected on open or on first send
pub struct MidirOutput {
    id: String,
    name: String,
    client_name: String,
    state: RwLock<ConnectionState>,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidirOutput {
    fn new(id: String, name: String, client_name: String) -> Self {
        Self {
            id,
            name,
            client_name,
            state: RwLock::new(ConnectionState::Closed),
            connection: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<MidiOutputConnection> {
        let midi_out = MidiOutput::new(&self.client_name)
            .map_err(|e| Error::DeviceUnavailable(format!("failed to create MIDI output: {}", e)))?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| p.id() == self.id)
            .ok_or_else(|| Error::DeviceUnavailable(format!("output port '{}' not found", self.id)))?;

        midi_out
            .connect(&port, &self.client_name)
            .map_err(|e| Error::DeviceUnavailable(format!("failed to connect output '{}': {}", self.id, e)))
    }
}

impl MidiPort for MidirOutput {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        Direction::Output
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

#[async_trait]
impl OutputPort for MidirOutput {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_none() {
            *connection = Some(self.connect().map_err(|e| Error::SendFailure(e.message().to_string()))?);
            *self.state.write() = ConnectionState::Open;
        }

        if let Some(conn) = connection.as_mut() {
            conn.send(bytes)
                .map_err(|e| Error::SendFailure(format!("{}: {}", self.name, e)))?;
        }

        debug!("Sent to {}: {}", self.name, format_hex(bytes));
        Ok(())
    }

    async fn open(&self) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_none() {
            *self.state.write() = ConnectionState::Pending;
            match self.connect() {
                Ok(conn) => *connection = Some(conn),
                Err(e) => {
                    *self.state.write() = ConnectionState::Closed;
                    return Err(e);
                }
            }
        }
        *self.state.write() = ConnectionState::Open;
        info!("Connected to output port: {}", self.name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
        }
        *self.state.write() = ConnectionState::Closed;
        Ok(())
    }
}
