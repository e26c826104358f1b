//! The callback seam a host application supplies to learn about sync
//! lifecycle changes, detected conflicts, and stalls. `Sync::tick` never
//! blocks on this: the implementation is expected to enqueue or log and
//! return immediately.

use crate::error::SyncFailure;
use crate::stall::StallReason;

/// Lifecycle states reported through [`StateObserver::on_sync_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Running,
    Failed(SyncFailure),
    Disabled,
}

/// Host integration seam (Tauri app, CLI, language bindings — all outside
/// this engine's scope, but they need a way in). [`TracingObserver`] is the
/// default so the engine is drivable without one.
pub trait StateObserver {
    fn on_sync_state(&mut self, state: SyncState);
    fn on_conflicts_detected(&mut self, paths: &[String]);
    fn on_stall(&mut self, local: &[(String, StallReason)], cloud: &[(String, StallReason)]);
}

/// Logs every callback through `tracing` instead of doing nothing.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StateObserver for TracingObserver {
    fn on_sync_state(&mut self, state: SyncState) {
        match state {
            SyncState::Running => tracing::info!("sync running"),
            SyncState::Failed(reason) => tracing::error!(%reason, "sync failed"),
            SyncState::Disabled => tracing::warn!("sync disabled"),
        }
    }

    fn on_conflicts_detected(&mut self, paths: &[String]) {
        for path in paths {
            tracing::warn!(%path, "conflict detected");
        }
    }

    fn on_stall(&mut self, local: &[(String, StallReason)], cloud: &[(String, StallReason)]) {
        for (path, reason) in local {
            tracing::warn!(%path, ?reason, side = "local", "sync stalled");
        }
        for (path, reason) in cloud {
            tracing::warn!(%path, ?reason, side = "cloud", "sync stalled");
        }
    }
}
