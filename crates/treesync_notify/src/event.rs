//! The event type consumed from a filesystem-notification source.

use treesync_cache::SyncNodeId;

/// Whether a notification implies the named path itself changed, or that
/// its descendants might have (a coarse "something under here moved"
/// event some platforms/network shares report instead of per-file ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRequirement {
    SelfOnly,
    Descendants,
}

/// One event off the notification source: a path relative to some
/// already-known node, plus whether it came from a network share (routed
/// through the long-debounce queue instead of applied immediately).
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    pub anchor: SyncNodeId,
    pub relative_path: Vec<String>,
    pub requirement: ScanRequirement,
    pub network_share: bool,
}
