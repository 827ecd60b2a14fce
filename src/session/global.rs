//! Process-wide default session

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use super::MidiSession;

static DEFAULT_SESSION: RwLock<Option<Arc<MidiSession>>> = parking_lot::const_rwlock(None);

/// Install the default session, returning the one it replaces
pub fn install_default(session: Arc<MidiSession>) -> Option<Arc<MidiSession>> {
    DEFAULT_SESSION.write().replace(session)
}

pub fn default_session() -> Option<Arc<MidiSession>> {
    DEFAULT_SESSION.read().clone()
}

/// Shut down and uninstall the default session.
///
/// Returns false when none was installed.
pub async fn teardown_default() -> bool {
    let session = DEFAULT_SESSION.write().take();
    match session {
        Some(session) => {
            session.shutdown().await;
            info!("Default MIDI session torn down");
            true
        }
        None => false,
    }
}
