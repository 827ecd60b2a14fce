//! MIDI status table, 3-byte message encoding and decoding
//!
//! Only single channel-voice messages are handled. System messages and
//! SysEx are out of scope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel-voice message types with their status nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    NoteOff,
    NoteOn,
    AfterTouch,
    #[serde(alias = "cc")]
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
}

impl MessageType {
    /// All message types, in status-byte order
    pub fn all() -> &'static [MessageType] {
        &[
            MessageType::NoteOff,
            MessageType::NoteOn,
            MessageType::AfterTouch,
            MessageType::ControlChange,
            MessageType::ProgramChange,
            MessageType::ChannelPressure,
            MessageType::PitchWheel,
        ]
    }

    /// Resolve a symbolic name (`"noteOn"`, `"cc"`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "noteOff" => Some(MessageType::NoteOff),
            "noteOn" => Some(MessageType::NoteOn),
            "afterTouch" => Some(MessageType::AfterTouch),
            "cc" | "controlChange" => Some(MessageType::ControlChange),
            "programChange" => Some(MessageType::ProgramChange),
            "channelPressure" => Some(MessageType::ChannelPressure),
            "pitchWheel" => Some(MessageType::PitchWheel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NoteOff => "noteOff",
            MessageType::NoteOn => "noteOn",
            MessageType::AfterTouch => "afterTouch",
            MessageType::ControlChange => "cc",
            MessageType::ProgramChange => "programChange",
            MessageType::ChannelPressure => "channelPressure",
            MessageType::PitchWheel => "pitchWheel",
        }
    }

    /// Status byte with the channel nibble cleared
    pub const fn status(self) -> u8 {
        match self {
            MessageType::NoteOff => 0x80,
            MessageType::NoteOn => 0x90,
            MessageType::AfterTouch => 0xA0,
            MessageType::ControlChange => 0xB0,
            MessageType::ProgramChange => 0xC0,
            MessageType::ChannelPressure => 0xD0,
            MessageType::PitchWheel => 0xE0,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status byte for a symbolic message type; unknown names map to `0x00`
pub fn status_byte(name: &str) -> u8 {
    MessageType::from_name(name).map_or(0x00, MessageType::status)
}

/// Build a 3-byte message.
///
/// The channel is added to the status byte without validation, so a channel
/// above 15 spills into the type nibble. Range checks belong to the caller.
pub fn encode(kind: &str, channel: Option<u8>, data1: Option<u8>, data2: Option<u8>) -> [u8; 3] {
    [
        status_byte(kind).wrapping_add(channel.unwrap_or(0)),
        data1.unwrap_or(0),
        data2.unwrap_or(0),
    ]
}

/// Decoded channel-voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MidiMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    AfterTouch { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, 8192 is center
    PitchWheel { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a single channel-voice message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status and system messages are not tracked
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let channel = status & 0x0F;
        let d1 = data.get(1).map(|b| b & 0x7F);
        let d2 = data.get(2).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff { channel, note: d1?, velocity: d2? }),
            // Note On with velocity 0 is a Note Off
            0x90 => match (d1?, d2?) {
                (note, 0) => Some(MidiMessage::NoteOff { channel, note, velocity: 0 }),
                (note, velocity) => Some(MidiMessage::NoteOn { channel, note, velocity }),
            },
            0xA0 => Some(MidiMessage::AfterTouch { channel, note: d1?, pressure: d2? }),
            0xB0 => Some(MidiMessage::ControlChange { channel, controller: d1?, value: d2? }),
            0xC0 => Some(MidiMessage::ProgramChange { channel, program: d1? }),
            0xD0 => Some(MidiMessage::ChannelPressure { channel, pressure: d1? }),
            0xE0 => {
                let lsb = d1? as u16;
                let msb = d2? as u16;
                Some(MidiMessage::PitchWheel { channel, value: (msb << 7) | lsb })
            }
            _ => None,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            MidiMessage::NoteOff { .. } => MessageType::NoteOff,
            MidiMessage::NoteOn { .. } => MessageType::NoteOn,
            MidiMessage::AfterTouch { .. } => MessageType::AfterTouch,
            MidiMessage::ControlChange { .. } => MessageType::ControlChange,
            MidiMessage::ProgramChange { .. } => MessageType::ProgramChange,
            MidiMessage::ChannelPressure { .. } => MessageType::ChannelPressure,
            MidiMessage::PitchWheel { .. } => MessageType::PitchWheel,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::AfterTouch { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchWheel { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel, note, velocity)
            }
            MidiMessage::AfterTouch { channel, note, pressure } => {
                write!(f, "AfterTouch ch:{} n:{} p:{}", channel, note, pressure)
            }
            MidiMessage::ControlChange { channel, controller, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel, controller, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel, pressure)
            }
            MidiMessage::PitchWheel { channel, value } => {
                write!(f, "PitchWheel ch:{} v:{}", channel, value)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line rendering of a received message for the monitor
pub fn format_event(elapsed_ms: u64, device: &str, data: &[u8]) -> String {
    let decoded = MidiMessage::parse(data)
        .map(|m| format!(" => {}", m))
        .unwrap_or_default();

    format!("[{:08}ms] {} | {}{}", elapsed_ms, device, format_hex(data), decoded)
}
