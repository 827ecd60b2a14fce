//! Message-send parameters, targets and outcomes
//!
//! Transmission never fails as a whole: every device in the target is tried
//! and the result is reported as a [`SendOutcome`]. Only missing or
//! out-of-range parameters are returned as errors, before anything is sent.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::midi::format_hex;
use crate::platform::{MidiPort, OutputHandle, OutputPort};

/// Where a message goes
#[derive(Clone)]
pub enum Target {
    Single(OutputHandle),
    List(Vec<OutputHandle>),
}

impl Target {
    pub fn devices(&self) -> &[OutputHandle] {
        match self {
            Target::Single(device) => std::slice::from_ref(device),
            Target::List(devices) => devices,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.devices().iter().map(|d| d.id().to_string()).collect()
    }
}

impl From<OutputHandle> for Target {
    fn from(device: OutputHandle) -> Self {
        Target::Single(device)
    }
}

impl From<Vec<OutputHandle>> for Target {
    fn from(devices: Vec<OutputHandle>) -> Self {
        Target::List(devices)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Single(device) => f.debug_tuple("Single").field(&device.id()).finish(),
            Target::List(_) => f.debug_tuple("List").field(&self.ids()).finish(),
        }
    }
}

/// Target given by device id(s), as found in JSON parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    One(String),
    Many(Vec<String>),
}

impl TargetSpec {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            TargetSpec::One(id) => vec![id.as_str()],
            TargetSpec::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// Generic message. Every field except the target has a default:
/// type `""` (null status), channel from the session config, data bytes 0.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams<T = Target> {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub channel: Option<u8>,
    #[serde(alias = "controller")]
    pub controller_number: Option<u8>,
    pub pitch: Option<u8>,
    pub value: Option<u8>,
    pub velocity: Option<u8>,
    #[serde(alias = "device", alias = "devices")]
    pub target: Option<T>,
}

/// Control change. Channel, controller, value and target are required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcParams<T = Target> {
    pub channel: Option<u8>,
    #[serde(alias = "controller")]
    pub controller_number: Option<u8>,
    pub value: Option<u8>,
    #[serde(alias = "device", alias = "devices")]
    pub target: Option<T>,
}

/// Note on. Value wins over velocity when both are given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOnParams<T = Target> {
    pub channel: Option<u8>,
    pub pitch: Option<u8>,
    pub value: Option<u8>,
    pub velocity: Option<u8>,
    #[serde(alias = "device", alias = "devices")]
    pub target: Option<T>,
}

/// Note off, always sent with value 0
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOffParams<T = Target> {
    pub channel: Option<u8>,
    pub pitch: Option<u8>,
    #[serde(alias = "device", alias = "devices")]
    pub target: Option<T>,
}

impl<T> MessageParams<T> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            channel: None,
            controller_number: None,
            pitch: None,
            value: None,
            velocity: None,
            target: None,
        }
    }

    pub fn map_target<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<MessageParams<U>> {
        Ok(MessageParams {
            kind: self.kind,
            channel: self.channel,
            controller_number: self.controller_number,
            pitch: self.pitch,
            value: self.value,
            velocity: self.velocity,
            target: self.target.map(f).transpose()?,
        })
    }
}

impl CcParams {
    pub fn new(channel: u8, controller_number: u8, value: u8, target: impl Into<Target>) -> Self {
        Self {
            channel: Some(channel),
            controller_number: Some(controller_number),
            value: Some(value),
            target: Some(target.into()),
        }
    }
}

impl<T> CcParams<T> {
    pub fn map_target<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<CcParams<U>> {
        Ok(CcParams {
            channel: self.channel,
            controller_number: self.controller_number,
            value: self.value,
            target: self.target.map(f).transpose()?,
        })
    }
}

impl NoteOnParams {
    pub fn new(channel: u8, pitch: u8, velocity: u8, target: impl Into<Target>) -> Self {
        Self {
            channel: Some(channel),
            pitch: Some(pitch),
            value: None,
            velocity: Some(velocity),
            target: Some(target.into()),
        }
    }
}

impl<T> NoteOnParams<T> {
    pub fn map_target<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<NoteOnParams<U>> {
        Ok(NoteOnParams {
            channel: self.channel,
            pitch: self.pitch,
            value: self.value,
            velocity: self.velocity,
            target: self.target.map(f).transpose()?,
        })
    }
}

impl NoteOffParams {
    pub fn new(channel: u8, pitch: u8, target: impl Into<Target>) -> Self {
        Self {
            channel: Some(channel),
            pitch: Some(pitch),
            target: Some(target.into()),
        }
    }
}

impl<T> NoteOffParams<T> {
    pub fn map_target<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<NoteOffParams<U>> {
        Ok(NoteOffParams {
            channel: self.channel,
            pitch: self.pitch,
            target: self.target.map(f).transpose()?,
        })
    }
}

/// Require a field and check it against an inclusive upper bound
pub(crate) fn require(field: Option<u8>, name: &str, max: u8) -> Result<u8> {
    let value = field.ok_or_else(|| Error::InvalidArgument(format!("{} is required", name)))?;
    if value > max {
        return Err(Error::InvalidArgument(format!(
            "{} must be in 0-{}, got {}",
            name, max, value
        )));
    }
    Ok(value)
}

pub(crate) fn require_target<T>(target: Option<T>) -> Result<T> {
    target.ok_or_else(|| Error::InvalidArgument("device is required".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Every device accepted the message
    Sent,
    /// Some devices failed
    Partial,
    /// No device accepted the message
    Failed,
}

/// Per-device failure recorded in a [`SendOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub device_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of transmitting one message to a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub kind: OutcomeKind,
    pub bytes: [u8; 3],
    pub delivered: Vec<String>,
    pub failures: Vec<DeliveryFailure>,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Sent
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format_hex(&self.bytes);
        let failures = self
            .failures
            .iter()
            .map(|fail| format!("{}: {}", fail.device_id, fail.message))
            .collect::<Vec<_>>()
            .join("; ");

        match self.kind {
            OutcomeKind::Sent => write!(f, "sent {} to {}", hex, self.delivered.join(", ")),
            OutcomeKind::Partial => write!(
                f,
                "sent {} to {} of {} devices ({})",
                hex,
                self.delivered.len(),
                self.delivered.len() + self.failures.len(),
                failures
            ),
            OutcomeKind::Failed if self.failures.is_empty() => {
                write!(f, "failed to send {}: no target devices", hex)
            }
            OutcomeKind::Failed => write!(f, "failed to send {}: {}", hex, failures),
        }
    }
}

/// Send bytes to every device of the target, collecting failures
pub fn transmit(target: &Target, bytes: [u8; 3], verbose: bool) -> SendOutcome {
    let mut delivered = Vec::new();
    let mut failures = Vec::new();

    for device in target.devices() {
        match device.send(&bytes) {
            Ok(()) => {
                debug!("Sent: {} -> {}", format_hex(&bytes), device.id());
                delivered.push(device.id().to_string());
            }
            Err(e) => {
                if verbose {
                    warn!("Failed to send {} to {}: {}", format_hex(&bytes), device.id(), e);
                }
                failures.push(DeliveryFailure {
                    device_id: device.id().to_string(),
                    kind: e.kind(),
                    message: e.message().to_string(),
                });
            }
        }
    }

    let kind = match (delivered.is_empty(), failures.is_empty()) {
        (false, true) => OutcomeKind::Sent,
        (false, false) => OutcomeKind::Partial,
        (true, _) => OutcomeKind::Failed,
    };

    SendOutcome {
        kind,
        bytes,
        delivered,
        failures,
    }
}

/// Multi-device target helper
pub fn list<I>(devices: I) -> Target
where
    I: IntoIterator<Item = OutputHandle>,
{
    Target::List(devices.into_iter().collect())
}
