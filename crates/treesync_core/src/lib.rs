//! The reconciliation engine: the triplet reconciler, move detector,
//! stall detector, backup-sync substate machine, file-stability rate
//! limiter, and the per-sync orchestrator that ties them to the scanner
//! pool, notification coalescer, and config store.

pub mod backup;
pub mod cloud;
pub mod error;
pub mod moves;
pub mod observer;
pub mod orchestrator;
pub mod reconcile;
pub mod stability;
pub mod stall;

pub use backup::BackupSubstate;
pub use cloud::{CloudNode, NetworkClient};
pub use error::{EngineFatal, SyncFailure, TransientReason};
pub use observer::{StateObserver, SyncState, TracingObserver};
pub use orchestrator::Sync;
pub use stability::StabilityTracker;
pub use stall::{StallDetector, StallReason};
