//! Errors surfaced to the application, divided into the three bands the
//! engine recognizes: transient per-row conditions (not represented here —
//! those become [`crate::stall::StallReason`]s, aliased below as
//! [`TransientReason`], instead), persistent per-sync failures
//! ([`SyncFailure`]), and engine-fatal conditions ([`EngineFatal`]).

/// Transient, per-row conditions. [`crate::stall::StallReason`] already
/// carries these; the alias exists so call sites can spell the band name a
/// host integration expects.
pub type TransientReason = crate::stall::StallReason;

/// A persistent per-sync failure: the sync transitions to `Failed` (or
/// `Disabled` for user-controlled cases), emits one state-change callback
/// through [`crate::observer::StateObserver::on_sync_state`], and its
/// reconciler halts until the user intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncFailure {
    #[error("this filesystem does not support the features sync requires")]
    UnsupportedFilesystem,
    #[error("the remote node has an unexpected type")]
    InvalidRemoteType,
    #[error("the local node has an unexpected type")]
    InvalidLocalType,
    #[error("the initial scan of the sync root failed")]
    InitialScanFailed,
    #[error("the local path is temporarily unavailable")]
    LocalPathTemporaryUnavailable,
    #[error("the local path is unavailable")]
    LocalPathUnavailable,
    #[error("the remote node could not be found")]
    RemoteNodeNotFound,
    #[error("cloud storage quota exceeded")]
    StorageOverquota,
    #[error("the remote path has changed")]
    RemotePathHasChanged,
    #[error("the remote node was moved to rubbish")]
    RemoteNodeMovedToRubbish,
    #[error("the local fingerprint does not match what was expected")]
    LocalFingerprintMismatch,
    #[error("another active sync is rooted below this path")]
    ActiveSyncBelowPath,
    #[error("another active sync is rooted above this path")]
    ActiveSyncAbovePath,
    #[error("the local path collides with another sync's root")]
    LocalPathSyncCollision,
    #[error("too many action packets arrived; resynchronizing")]
    TooManyActionPackets,
    #[error("a backup sync detected local modification of its mirror")]
    BackupModified,
    #[error("a backup sync's source is not below its configured drive")]
    BackupSourceNotBelowDrive,
    #[error("writing the sync configuration failed")]
    SyncConfigWriteFailure,
}

/// An unrecoverable, engine-wide condition: not scoped to one sync, and not
/// something a reconciliation pass can retry its way out of. The process
/// hosting the engine is expected to restart it (or halt) rather than call
/// `tick` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineFatal {
    #[error("the sync-node cache is corrupt and cannot be recovered")]
    CacheCorrupt,
    #[error("the scanner worker pool has no surviving threads")]
    ScannerPoolDied,
    #[error("the encrypted config envelope could not be opened with any known key")]
    ConfigKeysExhausted,
}
