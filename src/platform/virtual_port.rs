//! In-memory MIDI service
//!
//! Virtual ports behave like hardware ports without touching the host MIDI
//! stack: outputs record what they were sent, inputs deliver injected bytes
//! once opened. Failure modes (denied access, missing open capability,
//! failing sends) can be switched on per port for exercising error paths.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{
    ConnectionState, Direction, InputHandle, InputPort, MessageHandler, MidiAccess,
    MidiAccessProvider, MidiPort, OutputHandle, OutputPort,
};
use crate::error::{Error, Result};

/// Virtual input port
pub struct VirtualInput {
    id: String,
    name: String,
    manufacturer: String,
    openable: bool,
    state: RwLock<ConnectionState>,
    handler: RwLock<Option<MessageHandler>>,
}

impl VirtualInput {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manufacturer: String::new(),
            openable: true,
            state: RwLock::new(ConnectionState::Closed),
            handler: RwLock::new(None),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    /// Port that reports no open capability
    pub fn without_open(mut self) -> Self {
        self.openable = false;
        self
    }

    /// Deliver bytes as if the device had sent them.
    ///
    /// Returns false when the port is not open or has no handler.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        if *self.state.read() != ConnectionState::Open {
            return false;
        }
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => {
                handler(bytes);
                true
            }
            None => false,
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }
}

impl MidiPort for VirtualInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    fn direction(&self) -> Direction {
        Direction::Input
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

#[async_trait]
impl InputPort for VirtualInput {
    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        *self.handler.write() = handler;
    }

    async fn open(&self) -> Result<()> {
        if !self.openable {
            return Err(Error::DeviceUnavailable(format!(
                "input '{}' cannot be opened",
                self.id
            )));
        }
        *self.state.write() = ConnectionState::Pending;
        tokio::task::yield_now().await;
        *self.state.write() = ConnectionState::Open;
        debug!("Virtual input opened: {}", self.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Closed;
        debug!("Virtual input closed: {}", self.id);
        Ok(())
    }
}

/// Virtual output port recording every message sent to it
pub struct VirtualOutput {
    id: String,
    name: String,
    manufacturer: String,
    state: RwLock<ConnectionState>,
    sent: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl VirtualOutput {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            manufacturer: String::new(),
            state: RwLock::new(ConnectionState::Closed),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.sent.lock().last().cloned()
    }
}

impl MidiPort for VirtualOutput {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    fn direction(&self) -> Direction {
        Direction::Output
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

#[async_trait]
impl OutputPort for VirtualOutput {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::SendFailure(format!("output '{}' rejected the message", self.id)));
        }
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }

    async fn open(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Open;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state.write() = ConnectionState::Closed;
        Ok(())
    }
}

/// Set of virtual devices; ports can be plugged and unplugged at runtime
#[derive(Default)]
pub struct VirtualAccess {
    inputs: RwLock<Vec<Arc<VirtualInput>>>,
    outputs: RwLock<Vec<Arc<VirtualOutput>>>,
}

impl VirtualAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&self, input: VirtualInput) -> Arc<VirtualInput> {
        let input = Arc::new(input);
        self.inputs.write().push(input.clone());
        input
    }

    pub fn add_output(&self, output: VirtualOutput) -> Arc<VirtualOutput> {
        let output = Arc::new(output);
        self.outputs.write().push(output.clone());
        output
    }

    /// Unplug an input; open handles keep working until dropped
    pub fn remove_input(&self, id: &str) {
        self.inputs.write().retain(|input| input.id() != id);
    }

    pub fn remove_output(&self, id: &str) {
        self.outputs.write().retain(|output| output.id() != id);
    }
}

impl MidiAccess for VirtualAccess {
    fn inputs(&self) -> Vec<InputHandle> {
        self.inputs
            .read()
            .iter()
            .map(|input| input.clone() as InputHandle)
            .collect()
    }

    fn outputs(&self) -> Vec<OutputHandle> {
        self.outputs
            .read()
            .iter()
            .map(|output| output.clone() as OutputHandle)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Refusal {
    Unsupported,
    Denied,
}

/// Grants access to a [`VirtualAccess`], or refuses on demand
pub struct VirtualProvider {
    access: Arc<VirtualAccess>,
    refusal: Option<Refusal>,
}

impl VirtualProvider {
    pub fn new(access: Arc<VirtualAccess>) -> Self {
        Self { access, refusal: None }
    }

    /// Provider that behaves like a platform without MIDI support
    pub fn unsupported() -> Self {
        Self {
            access: Arc::new(VirtualAccess::new()),
            refusal: Some(Refusal::Unsupported),
        }
    }

    /// Provider whose permission prompt is declined
    pub fn denied() -> Self {
        Self {
            access: Arc::new(VirtualAccess::new()),
            refusal: Some(Refusal::Denied),
        }
    }
}

#[async_trait]
impl MidiAccessProvider for VirtualProvider {
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>> {
        match self.refusal {
            Some(Refusal::Unsupported) => Err(Error::UnsupportedPlatform(
                "virtual platform has no MIDI support".to_string(),
            )),
            Some(Refusal::Denied) => Err(Error::PermissionDenied(
                "virtual permission prompt declined".to_string(),
            )),
            None => Ok(self.access.clone() as Arc<dyn MidiAccess>),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_input_delivers_only_when_open() {
        let input = VirtualInput::new("in1", "Keys");
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        input.set_message_handler(Some(Arc::new(move |_: &[u8]| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(!input.inject(&[0x90, 60, 1]));
        input.open().await.unwrap();
        assert_eq!(input.state(), ConnectionState::Open);
        assert!(input.inject(&[0x90, 60, 1]));
        input.close().await.unwrap();
        assert!(!input.inject(&[0x90, 60, 1]));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_input_without_open_capability() {
        let input = VirtualInput::new("in1", "Keys").without_open();
        let err = input.open().await.unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
        assert_eq!(input.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_output_records_and_fails() {
        let output = VirtualOutput::new("out1", "Synth");
        output.send(&[0xB0, 1, 2]).unwrap();
        output.set_failing(true);
        assert!(output.send(&[0xB0, 1, 3]).is_err());
        assert_eq!(output.sent(), vec![vec![0xB0, 1, 2]]);
        assert_eq!(output.last_sent(), Some(vec![0xB0, 1, 2]));
    }

    #[tokio::test]
    async fn test_provider_refusals() {
        let err = VirtualProvider::unsupported().request_access().await.err().unwrap();
        assert!(matches!(err, Error::UnsupportedPlatform(_)));

        let err = VirtualProvider::denied().request_access().await.err().unwrap();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_access_enumerates_same_handles() {
        let access = Arc::new(VirtualAccess::new());
        access.add_input(VirtualInput::new("in1", "Keys"));
        access.add_output(VirtualOutput::new("out1", "Synth"));

        let granted = VirtualProvider::new(access.clone()).request_access().await.unwrap();
        let first = granted.inputs();
        let second = granted.inputs();
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(granted.outputs()[0].id(), "out1");

        access.remove_output("out1");
        assert!(granted.outputs().is_empty());
    }
}
