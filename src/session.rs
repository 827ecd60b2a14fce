//! MidiSession - device discovery, connection tracking and message sending
//!
//! A session is created once per application run and shared by reference.
//! It owns the granted MIDI access, the enumerated devices, the registries
//! of connected inputs and outputs, and the controller value store.
//!
//! Failures at the device boundary are logged and reported as `false` or as
//! a [`SendOutcome`]; only invalid send parameters and initialization
//! failures are returned as errors.

mod global;

pub use global::{default_session, install_default, teardown_default};

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::midi::{encode, format_hex, MessageType, MidiMessage};
use crate::platform::{
    ConnectionState, DeviceInfo, InputHandle, InputPort, MessageHandler, MidiAccess,
    MidiAccessProvider, MidiPort, OutputHandle, OutputPort,
};
use crate::registry::DeviceRegistry;
use crate::send::{
    require, require_target, transmit, CcParams, MessageParams, NoteOffParams, NoteOnParams,
    SendOutcome, Target, TargetSpec,
};
use crate::store::{ControllerValue, Subscription, ValueLookup, ValueQuery, ValueStore};

/// Caller-supplied handler for messages from an opened input
pub type InputCallback = Arc<dyn Fn(&InputEvent) + Send + Sync>;

/// Called when initialization fails
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Called when a device changes connection state
pub type StateCallback = Arc<dyn Fn(&DeviceInfo) + Send + Sync>;

/// Message received from an opened input
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub device_id: String,
    pub timestamp: Instant,
    pub bytes: Vec<u8>,
    /// Decoded form, when the bytes are a channel-voice message
    pub message: Option<MidiMessage>,
}

pub struct MidiSession {
    config: SessionConfig,
    access: RwLock<Option<Arc<dyn MidiAccess>>>,

    /// Devices enumerated from the granted access, after name filters
    inputs: RwLock<DeviceRegistry<dyn InputPort>>,
    outputs: RwLock<DeviceRegistry<dyn OutputPort>>,

    connected_inputs: RwLock<DeviceRegistry<dyn InputPort>>,
    connected_outputs: RwLock<DeviceRegistry<dyn OutputPort>>,

    store: ValueStore,

    event_tx: mpsc::Sender<InputEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<InputEvent>>>,

    error_callback: RwLock<Option<ErrorCallback>>,
    state_callbacks: RwLock<Vec<StateCallback>>,
}

impl MidiSession {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));

        Self {
            config,
            access: RwLock::new(None),
            inputs: RwLock::new(DeviceRegistry::new()),
            outputs: RwLock::new(DeviceRegistry::new()),
            connected_inputs: RwLock::new(DeviceRegistry::new()),
            connected_outputs: RwLock::new(DeviceRegistry::new()),
            store: ValueStore::new(),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            error_callback: RwLock::new(None),
            state_callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    /// Whether MIDI access has been granted
    pub fn is_ready(&self) -> bool {
        self.access.read().is_some()
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Request MIDI access and publish the enumerated devices.
    ///
    /// Failures are passed to the `on_error` callback and returned.
    pub async fn initialize(&self, provider: &dyn MidiAccessProvider) -> Result<()> {
        info!("Requesting MIDI access as '{}'", self.config.client_name);

        let access = match provider.request_access().await {
            Ok(access) => access,
            Err(e) => {
                warn!("MIDI access failed: {}", e);
                let callback = self.error_callback.read().clone();
                if let Some(callback) = callback {
                    callback(&e);
                }
                return Err(e);
            }
        };

        *self.access.write() = Some(access);
        self.refresh().await;

        info!(
            "MIDI ready: {} inputs, {} outputs",
            self.inputs.read().len(),
            self.outputs.read().len()
        );

        if self.config.auto_open_inputs {
            for input in self.inputs() {
                self.open_input(input, None).await;
            }
        }

        Ok(())
    }

    /// Re-enumerate devices. Connected devices that disappeared are closed
    /// and dropped from the connected registries.
    ///
    /// Returns false when MIDI access has not been granted.
    pub async fn refresh(&self) -> bool {
        let access = self.access.read().clone();
        let Some(access) = access else {
            warn!(
                "Cannot refresh devices: {}",
                Error::DeviceUnavailable("MIDI access not initialized".to_string())
            );
            return false;
        };

        let inputs = reconcile(
            &self.inputs,
            &self.connected_inputs,
            access.inputs(),
            |name| self.config.accepts_input(name),
        );
        let outputs = reconcile(
            &self.outputs,
            &self.connected_outputs,
            access.outputs(),
            |name| self.config.accepts_output(name),
        );

        for input in &inputs.dropped {
            input.set_message_handler(None);
            if let Err(e) = input.close().await {
                warn!("Failed to close vanished input '{}': {}", input.id(), e);
            }
        }
        for output in &outputs.dropped {
            if let Err(e) = output.close().await {
                warn!("Failed to close vanished output '{}': {}", output.id(), e);
            }
        }

        for input in &inputs.vanished {
            info!("Input disconnected: {}", input.name());
            self.notify_state(&disconnected(input.info()));
        }
        for output in &outputs.vanished {
            info!("Output disconnected: {}", output.name());
            self.notify_state(&disconnected(output.info()));
        }
        for info in inputs
            .appeared
            .iter()
            .map(|d| d.info())
            .chain(outputs.appeared.iter().map(|d| d.info()))
        {
            debug!("Device available: {} ({})", info.name, info.id);
            self.notify_state(&info);
        }

        true
    }

    // =========================================================================
    // Device registries
    // =========================================================================

    /// Enumerated inputs, in platform order
    pub fn inputs(&self) -> Vec<InputHandle> {
        self.inputs.read().to_vec()
    }

    pub fn outputs(&self) -> Vec<OutputHandle> {
        self.outputs.read().to_vec()
    }

    pub fn connected_inputs(&self) -> Vec<InputHandle> {
        self.connected_inputs.read().to_vec()
    }

    pub fn connected_outputs(&self) -> Vec<OutputHandle> {
        self.connected_outputs.read().to_vec()
    }

    pub fn find_input(&self, id: &str) -> Option<InputHandle> {
        self.connected_inputs
            .read()
            .get(id)
            .or_else(|| self.inputs.read().get(id))
    }

    pub fn find_output(&self, id: &str) -> Option<OutputHandle> {
        self.connected_outputs
            .read()
            .get(id)
            .or_else(|| self.outputs.read().get(id))
    }

    /// Current state of a known device, inputs first
    pub fn connection_state(&self, id: &str) -> Option<ConnectionState> {
        self.find_input(id)
            .map(|d| d.state())
            .or_else(|| self.find_output(id).map(|d| d.state()))
    }

    /// Attach a message handler, open the input, then register it.
    ///
    /// The handler always reports the raw bytes (debug log and event
    /// channel); `callback` is invoked in addition when given.
    pub async fn open_input(&self, input: InputHandle, callback: Option<InputCallback>) -> bool {
        if !self.is_ready() {
            warn!(
                "{}",
                Error::DeviceUnavailable(format!(
                    "cannot open input '{}' before MIDI access is granted",
                    input.id()
                ))
            );
            return false;
        }
        if self.connected_inputs.read().contains(input.id()) {
            debug!("Input already open: {}", input.id());
            return true;
        }

        input.set_message_handler(Some(self.message_handler(input.id(), callback)));
        self.notify_state(&DeviceInfo {
            state: ConnectionState::Pending,
            ..input.info()
        });

        match input.open().await {
            Ok(()) => {
                self.connected_inputs.write().add(input.clone());
                info!("Input opened: {} ({})", input.name(), input.id());
                self.notify_state(&input.info());
                true
            }
            Err(e) => {
                warn!("Failed to open input '{}': {}", input.id(), e);
                input.set_message_handler(None);
                self.notify_state(&input.info());
                false
            }
        }
    }

    /// Close the input, then unregister it
    pub async fn close_input(&self, input: &InputHandle) -> bool {
        if !self.is_ready() {
            warn!(
                "{}",
                Error::DeviceUnavailable(format!(
                    "cannot close input '{}' before MIDI access is granted",
                    input.id()
                ))
            );
            return false;
        }

        match input.close().await {
            Ok(()) => {
                self.connected_inputs.write().remove(input.id());
                input.set_message_handler(None);
                info!("Input closed: {} ({})", input.name(), input.id());
                self.notify_state(&input.info());
                true
            }
            Err(e) => {
                warn!("Failed to close input '{}': {}", input.id(), e);
                false
            }
        }
    }

    /// Open the output and register it for sending
    pub async fn add_output(&self, output: OutputHandle) -> bool {
        if !self.is_ready() {
            warn!(
                "{}",
                Error::DeviceUnavailable(format!(
                    "cannot add output '{}' before MIDI access is granted",
                    output.id()
                ))
            );
            return false;
        }

        match output.open().await {
            Ok(()) => {
                self.connected_outputs.write().add(output.clone());
                info!("Output added: {} ({})", output.name(), output.id());
                self.notify_state(&output.info());
                true
            }
            Err(e) => {
                warn!("Failed to open output '{}': {}", output.id(), e);
                false
            }
        }
    }

    /// Unregister and close an output. Unknown ids are ignored.
    pub async fn remove_output(&self, id: &str) -> bool {
        let removed = self.connected_outputs.write().remove(id);
        let Some(output) = removed else {
            return false;
        };

        if let Err(e) = output.close().await {
            warn!("Failed to close output '{}': {}", id, e);
        }
        info!("Output removed: {} ({})", output.name(), id);
        self.notify_state(&output.info());
        true
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Encode and send any message type; only the target is required
    pub fn send_message(&self, params: MessageParams) -> Result<SendOutcome> {
        let target = require_target(params.target)?;
        let bytes = encode(
            &params.kind,
            Some(params.channel.unwrap_or(self.config.default_channel)),
            params.controller_number.or(params.pitch),
            params.value.or(params.velocity),
        );
        Ok(transmit(&target, bytes, self.config.verbose))
    }

    /// Send a control change and record the value for every target device
    pub fn send_cc(&self, params: CcParams) -> Result<SendOutcome> {
        let channel = require(params.channel, "channel", 15)?;
        let controller = require(params.controller_number, "controllerNumber", 127)?;
        let value = require(params.value, "value", 127)?;
        let target = require_target(params.target)?;

        let bytes = encode(
            MessageType::ControlChange.as_str(),
            Some(channel),
            Some(controller),
            Some(value),
        );
        let outcome = transmit(&target, bytes, self.config.verbose);

        for device in target.devices() {
            self.store.update(device.id(), channel, controller, value);
        }

        Ok(outcome)
    }

    pub fn send_note_on(&self, params: NoteOnParams) -> Result<SendOutcome> {
        let channel = require(params.channel, "channel", 15)?;
        let pitch = require(params.pitch, "pitch", 127)?;
        let velocity = require(params.value.or(params.velocity), "value or velocity", 127)?;
        let target = require_target(params.target)?;

        let bytes = encode(
            MessageType::NoteOn.as_str(),
            Some(channel),
            Some(pitch),
            Some(velocity),
        );
        Ok(transmit(&target, bytes, self.config.verbose))
    }

    pub fn send_note_off(&self, params: NoteOffParams) -> Result<SendOutcome> {
        let channel = require(params.channel, "channel", 15)?;
        let pitch = require(params.pitch, "pitch", 127)?;
        let target = require_target(params.target)?;

        let bytes = encode(MessageType::NoteOff.as_str(), Some(channel), Some(pitch), Some(0));
        Ok(transmit(&target, bytes, self.config.verbose))
    }

    pub fn send_message_json(&self, params: serde_json::Value) -> Result<SendOutcome> {
        let params: MessageParams<TargetSpec> = serde_json::from_value(params)?;
        self.send_message(params.map_target(|spec| self.resolve_target(&spec))?)
    }

    pub fn send_cc_json(&self, params: serde_json::Value) -> Result<SendOutcome> {
        let params: CcParams<TargetSpec> = serde_json::from_value(params)?;
        self.send_cc(params.map_target(|spec| self.resolve_target(&spec))?)
    }

    pub fn send_note_on_json(&self, params: serde_json::Value) -> Result<SendOutcome> {
        let params: NoteOnParams<TargetSpec> = serde_json::from_value(params)?;
        self.send_note_on(params.map_target(|spec| self.resolve_target(&spec))?)
    }

    pub fn send_note_off_json(&self, params: serde_json::Value) -> Result<SendOutcome> {
        let params: NoteOffParams<TargetSpec> = serde_json::from_value(params)?;
        self.send_note_off(params.map_target(|spec| self.resolve_target(&spec))?)
    }

    fn resolve_target(&self, spec: &TargetSpec) -> Result<Target> {
        let lookup = |id: &str| {
            self.find_output(id)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown output device '{}'", id)))
        };

        match spec {
            TargetSpec::One(id) => Ok(Target::Single(lookup(id)?)),
            TargetSpec::Many(ids) => ids
                .iter()
                .map(|id| lookup(id))
                .collect::<Result<Vec<_>>>()
                .map(Target::List),
        }
    }

    // =========================================================================
    // Values and notifications
    // =========================================================================

    pub fn get_value(&self, query: &ValueQuery) -> ValueLookup {
        self.store.get(query)
    }

    /// Subscribe to controller value updates
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ControllerValue) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    /// Register the callback invoked when initialization fails
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *self.error_callback.write() = Some(Arc::new(callback));
    }

    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(&DeviceInfo) + Send + Sync + 'static,
    {
        self.state_callbacks.write().push(Arc::new(callback));
    }

    /// Take the receiver of incoming messages (only once)
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<InputEvent>> {
        self.event_rx.lock().take()
    }

    /// Close every connection and forget devices and values
    pub async fn shutdown(&self) {
        let inputs = self.connected_inputs();
        for input in &inputs {
            self.close_input(input).await;
        }

        let outputs = self.connected_outputs();
        for output in &outputs {
            self.remove_output(output.id()).await;
        }

        self.connected_inputs.write().clear();
        self.connected_outputs.write().clear();
        self.inputs.write().clear();
        self.outputs.write().clear();
        self.store.clear();
        *self.access.write() = None;

        info!("MIDI session shut down");
    }

    fn message_handler(&self, device_id: &str, callback: Option<InputCallback>) -> MessageHandler {
        let event_tx = self.event_tx.clone();
        let device_id = device_id.to_string();

        Arc::new(move |bytes: &[u8]| {
            debug!("MIDI in {}: {}", device_id, format_hex(bytes));

            let event = InputEvent {
                device_id: device_id.clone(),
                timestamp: Instant::now(),
                bytes: bytes.to_vec(),
                message: MidiMessage::parse(bytes),
            };

            if let Some(callback) = &callback {
                callback(&event);
            }

            // Never block the MIDI thread
            if event_tx.try_send(event).is_err() {
                trace!("Dropped MIDI event from {}", device_id);
            }
        })
    }

    fn notify_state(&self, info: &DeviceInfo) {
        debug!("Device {} is {}", info.id, info.state);
        let callbacks = self.state_callbacks.read().clone();
        for callback in callbacks {
            callback(info);
        }
    }
}

impl Default for MidiSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

fn disconnected(info: DeviceInfo) -> DeviceInfo {
    DeviceInfo {
        state: ConnectionState::Disconnected,
        ..info
    }
}

/// Registry changes produced by one re-enumeration
struct Churn<P: ?Sized> {
    /// Not listed before
    appeared: Vec<Arc<P>>,
    /// No longer present
    vanished: Vec<Arc<P>>,
    /// Vanished devices that were connected, removed from that registry
    dropped: Vec<Arc<P>>,
}

/// Replace the available devices with a fresh enumeration
fn reconcile<P: MidiPort + ?Sized>(
    available: &RwLock<DeviceRegistry<P>>,
    connected: &RwLock<DeviceRegistry<P>>,
    enumerated: Vec<Arc<P>>,
    accept: impl Fn(&str) -> bool,
) -> Churn<P> {
    let present: HashSet<String> = enumerated.iter().map(|d| d.id().to_string()).collect();

    let dropped = connected.write().retain(|d| present.contains(d.id()));
    let mut vanished = dropped.clone();

    let mut available = available.write();
    for device in available.iter() {
        let id = device.id();
        if !present.contains(id) && !vanished.iter().any(|v| v.id() == id) {
            vanished.push(device.clone());
        }
    }

    let previous: HashSet<String> = available.ids().into_iter().collect();
    available.clear();

    let mut appeared = Vec::new();
    for device in enumerated.into_iter().filter(|d| accept(d.name())) {
        if !previous.contains(device.id()) {
            appeared.push(device.clone());
        }
        available.add(device);
    }

    Churn {
        appeared,
        vanished,
        dropped,
    }
}
