//! MIDI session library
//!
//! Device discovery, input/output connection tracking, message encoding and
//! a controller value store on top of a pluggable MIDI platform.
//!
//! ```no_run
//! use std::sync::Arc;
//! use midi_session::{CcParams, MidiSession, OutputHandle, VirtualAccess, VirtualOutput, VirtualProvider};
//!
//! # async fn demo() -> midi_session::Result<()> {
//! let access = Arc::new(VirtualAccess::new());
//! let synth = access.add_output(VirtualOutput::new("synth", "Synth"));
//!
//! let session = MidiSession::default();
//! session.initialize(&VirtualProvider::new(access)).await?;
//! session.send_cc(CcParams::new(0, 7, 100, synth as OutputHandle))?;
//! assert_eq!(session.store().value(0, 7), Some(100));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod midi;
pub mod platform;
pub mod registry;
pub mod send;
pub mod session;
pub mod store;

pub use config::SessionConfig;
pub use error::{Error, ErrorKind, Result};
pub use midi::{encode, status_byte, MessageType, MidiMessage};
pub use platform::{
    ConnectionState, DeviceInfo, Direction, InputHandle, InputPort, MidiAccess,
    MidiAccessProvider, MidiPort, OutputHandle, OutputPort, VirtualAccess, VirtualInput,
    VirtualOutput, VirtualProvider,
};
#[cfg(feature = "hardware")]
pub use platform::MidirProvider;
pub use registry::DeviceRegistry;
pub use send::{
    CcParams, MessageParams, NoteOffParams, NoteOnParams, OutcomeKind, SendOutcome, Target,
    TargetSpec,
};
pub use session::{
    default_session, install_default, teardown_default, InputCallback, InputEvent, MidiSession,
};
pub use store::{ControllerValue, Subscription, ValueLookup, ValueQuery, ValueStore};
