//! Host MIDI service boundary
//!
//! The session never talks to a MIDI API directly. It consumes an access
//! object that enumerates input and output ports; each port knows its id,
//! name and connection state, inputs can be opened with a message handler
//! attached, outputs can send bytes.

#[cfg(feature = "hardware")]
pub mod midir_backend;
pub mod virtual_port;

#[cfg(feature = "hardware")]
pub use midir_backend::{MidirAccess, MidirInput, MidirOutput, MidirProvider};
pub use virtual_port::{VirtualAccess, VirtualInput, VirtualOutput, VirtualProvider};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Handler receiving the raw bytes of every incoming message
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

pub type InputHandle = Arc<dyn InputPort>;
pub type OutputHandle = Arc<dyn OutputPort>;

/// Connection state of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Device is no longer present
    Disconnected,
    /// Open requested, not completed yet
    Pending,
    Open,
    /// Present but not open
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Pending => write!(f, "pending"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Plain description of a port, safe to hand to UI code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub direction: Direction,
    pub state: ConnectionState,
}

/// Behavior shared by input and output ports
pub trait MidiPort: Send + Sync {
    /// Stable identifier, unique per direction
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn manufacturer(&self) -> &str {
        ""
    }

    fn direction(&self) -> Direction;

    fn state(&self) -> ConnectionState;

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            manufacturer: self.manufacturer().to_string(),
            direction: self.direction(),
            state: self.state(),
        }
    }
}

#[async_trait]
pub trait InputPort: MidiPort {
    /// Attach (or detach with `None`) the handler for incoming bytes
    fn set_message_handler(&self, handler: Option<MessageHandler>);

    /// Start receiving. Ports without this capability fail.
    async fn open(&self) -> Result<()> {
        Err(Error::DeviceUnavailable(format!(
            "input '{}' cannot be opened",
            self.id()
        )))
    }

    async fn close(&self) -> Result<()> {
        Err(Error::DeviceUnavailable(format!(
            "input '{}' cannot be closed",
            self.id()
        )))
    }
}

#[async_trait]
pub trait OutputPort: MidiPort {
    /// Transmit one message. Synchronous and fallible.
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Prepare the connection ahead of the first send
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Granted access to the host MIDI service
pub trait MidiAccess: Send + Sync {
    /// Enumerate input ports. The same device yields the same handle.
    fn inputs(&self) -> Vec<InputHandle>;

    fn outputs(&self) -> Vec<OutputHandle>;
}

/// Entry point to the host MIDI service
#[async_trait]
pub trait MidiAccessProvider: Send + Sync {
    /// Request access, failing with `UnsupportedPlatform` or `PermissionDenied`
    async fn request_access(&self) -> Result<Arc<dyn MidiAccess>>;
}

/// Case-insensitive substring match used for port filters
pub fn name_matches(name: &str, pattern: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(p) if p.is_empty() => true,
        Some(p) => name.to_lowercase().contains(&p.to_lowercase()),
    }
}
