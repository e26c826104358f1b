//! The per-sync orchestrator: owns the sync-node tree, the scanner pool
//! handle, the notification coalescer, the encrypted config store, and the
//! trackers that carry state across passes, and drives one reconciliation
//! tick end to end.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use treesync_cache::{Cache, PersistentStore};
use treesync_config::ConfigStore;
use treesync_ignore::FilterChain;
use treesync_notify::{Coalescer, NotificationSource};
use treesync_path::CaseSensitivity;
use treesync_scan::{FsNode, ScanOutcome, ScanRequest, ScannerPool};

use crate::backup::BackupSubstate;
use crate::cloud::NetworkClient;
use crate::error::SyncFailure;
use crate::observer::{StateObserver, SyncState, TracingObserver};
use crate::reconcile::{reconcile_directory, LocalLister, ReconcileCtx};
use crate::stability::StabilityTracker;
use crate::stall::StallDetector;

const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`LocalLister`] that dispatches through a shared [`ScannerPool`] and
/// blocks on the reply — the orchestrator never walks a directory itself,
/// per the concurrency model, but a reconciliation tick still needs the
/// result before it can decide the next row.
struct PoolLister {
    pool: Arc<ScannerPool>,
}

impl LocalLister for PoolLister {
    fn list(&mut self, dir: &std::path::Path) -> std::io::Result<Vec<FsNode>> {
        let (tx, rx) = mpsc::channel::<ScanOutcome>();
        self.pool.submit(ScanRequest {
            dir: dir.to_path_buf(),
            follow_symlinks: false,
            prior_children: Default::default(),
            on_complete: Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        });
        match rx.recv_timeout(SCAN_TIMEOUT) {
            Ok(outcome) => outcome.entries,
            Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "scan timed out")),
        }
    }
}

/// One configured sync: a local root paired with a cloud folder, plus all
/// the state the reconciler needs to carry between ticks.
pub struct Sync<N: NetworkClient> {
    pub cache: Cache,
    pub client: N,
    pool: Arc<ScannerPool>,
    stability: StabilityTracker,
    stall: StallDetector,
    backup: BackupSubstate,
    coalescer: Coalescer,
    ignore: FilterChain,
    case: CaseSensitivity,
    local_root: PathBuf,
    cloud_root_handle: u64,
    config: ConfigStore,
    config_dirty: bool,
    observer: Box<dyn StateObserver + Send>,
    persist: PersistentStore,
    initial_scan: bool,
}

impl<N: NetworkClient> Sync<N> {
    pub fn new(
        pool: Arc<ScannerPool>,
        client: N,
        local_root: PathBuf,
        cloud_root_handle: u64,
        case: CaseSensitivity,
        ignore: FilterChain,
        config: ConfigStore,
        persist: PersistentStore,
    ) -> Self {
        let cache = match persist.load(case) {
            Ok(cache) => cache,
            Err(err) => {
                warn!(error = %err, "failed to load persisted sync-node cache, starting empty");
                Cache::new(case)
            }
        };
        let initial_scan = cache.len() <= 1;
        Self {
            cache,
            client,
            pool,
            stability: StabilityTracker::new(),
            stall: StallDetector::new(),
            backup: BackupSubstate::None,
            coalescer: Coalescer::new(),
            ignore,
            case,
            local_root,
            cloud_root_handle,
            config,
            config_dirty: false,
            observer: Box::new(TracingObserver),
            persist,
            initial_scan,
        }
    }

    pub fn set_backup(&mut self, backup: BackupSubstate) {
        self.backup = backup;
    }

    /// Replaces the default `tracing`-backed observer with the host's own.
    pub fn set_observer(&mut self, observer: Box<dyn StateObserver + Send>) {
        self.observer = observer;
    }

    /// Drains every pending notification into `scanAgain` marks on the
    /// tree. Step 3 of the tick loop.
    pub fn drain_notifications(&mut self, source: &mut dyn NotificationSource) {
        for event in source.poll() {
            self.coalescer.ingest(&mut self.cache, event);
        }
        self.coalescer.flush_quiet_network_buckets(&mut self.cache);
    }

    /// Runs one full reconciliation pass: move-check, row-action, recurse,
    /// and flag propagation, then updates the stall detector. Step 5 of
    /// the tick loop.
    pub fn reconcile_once(&mut self) -> Result<bool, SyncFailure> {
        self.stall.begin_pass();
        let mut lister = PoolLister { pool: Arc::clone(&self.pool) };
        let root = self.cache.root();
        let cloud_root = self.cloud_root_handle;
        let local_root = self.local_root.clone();

        let mut persisted_deletes: Vec<i64> = Vec::new();
        let mut ctx = ReconcileCtx {
            cache: &mut self.cache,
            client: &mut self.client,
            lister: &mut lister,
            stability: &mut self.stability,
            stall: &mut self.stall,
            backup: Some(&mut self.backup),
            case: self.case,
            ignore: &self.ignore,
            local_root: &local_root,
            persisted_deletes: &mut persisted_deletes,
        };

        let progressed = reconcile_directory(&mut ctx, root, cloud_root, &local_root, "")?;
        if progressed {
            self.stall.record_progress();
        }
        // A full-tree pass always leaves scanning caught up, by
        // construction of this simplified (non-incremental) tick loop.
        self.stall.end_pass(true);
        if !progressed {
            self.backup = self.backup.promote_on_clean_pass();
            self.initial_scan = false;
        }

        self.persist_tree(&persisted_deletes);

        let conflicts: Vec<String> = self
            .cache
            .conflicted_nodes()
            .into_iter()
            .map(|id| self.cache.path_to_root(id).join("/"))
            .collect();
        if !conflicts.is_empty() {
            self.observer.on_conflicts_detected(&conflicts);
        }
        if self.stall.is_stalled() {
            let local: Vec<_> = self.stall.local.iter().map(|(p, r)| (p.clone(), *r)).collect();
            let cloud: Vec<_> = self.stall.cloud.iter().map(|(p, r)| (p.clone(), *r)).collect();
            self.observer.on_stall(&local, &cloud);
        }

        Ok(progressed)
    }

    /// Queues every surviving sync-node for upsert and every node this pass
    /// tore down for delete, then flushes to disk once the pending queue
    /// crosses the threshold for the current scan phase.
    fn persist_tree(&mut self, deletes: &[i64]) {
        let root = self.cache.root();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.persist.queue_upsert(id);
            stack.extend(self.cache.children(id));
        }
        for &db_id in deletes {
            self.persist.queue_delete(db_id);
        }
        if self.persist.should_flush(self.initial_scan) {
            if let Err(err) = self.persist.flush(&mut self.cache) {
                warn!(error = %err, "failed to flush persisted sync-node cache");
            }
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.stall.is_stalled()
    }

    pub fn mark_config_dirty(&mut self) {
        self.config_dirty = true;
    }

    /// Flushes the encrypted config store if something changed since the
    /// last flush. Step 7 of the tick loop.
    pub fn flush_config_if_dirty(&mut self, doc: &treesync_config::Document) {
        if !self.config_dirty {
            return;
        }
        match self.config.store(doc) {
            Ok(()) => {
                self.config_dirty = false;
                info!("sync config flushed");
            }
            Err(err) => warn!(error = %err, "failed to flush sync config"),
        }
    }

    /// One full tick: drain notifications, reconcile, flush config.
    /// Command-queue draining and per-sync state-machine transitions
    /// belong to the caller, which owns every `Sync` and the tick loop
    /// across all of them (spec's orchestrator proper).
    pub fn tick(
        &mut self,
        source: &mut dyn NotificationSource,
        doc: &treesync_config::Document,
    ) -> Result<bool, SyncFailure> {
        self.drain_notifications(source);
        let progressed = match self.reconcile_once() {
            Ok(progressed) => progressed,
            Err(err) => {
                self.observer.on_sync_state(SyncState::Failed(err));
                return Err(err);
            }
        };
        self.flush_config_if_dirty(doc);
        Ok(progressed)
    }
}
