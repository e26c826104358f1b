//! Trait boundary to the platform filesystem-notification source
//! (inotify/FSEvents/ReadDirectoryChangesW — out of scope here; a real
//! implementation lives in the orchestrator's platform layer and an
//! in-memory double stands in for tests).

use crate::event::NotifyEvent;

pub trait NotificationSource {
    /// Drains whatever events have arrived since the last call. Returns an
    /// empty vec, never blocks — the orchestrator polls this once per
    /// tick alongside its other work.
    fn poll(&mut self) -> Vec<NotifyEvent>;
}
