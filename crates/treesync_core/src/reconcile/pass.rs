//! Steps B and C of the reconciliation pass: for each triplet row, decide
//! and apply an action, then recurse into folders and propagate flags back
//! up the tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use treesync_cache::{Cache, NodeKind as SyncKind, SyncNode, SyncNodeId};
use treesync_ignore::{Decision, FilterChain};
use treesync_path::CaseSensitivity;
use treesync_scan::{Fingerprint, FsNode, FsNodeKind};

use crate::backup::BackupSubstate;
use crate::cloud::{CloudNode, NetworkClient};
use crate::error::SyncFailure;
use crate::moves::{
    abandon_failed_move, begin_move, complete_successful_move, detect_cloud_move, detect_local_move,
    is_move_destination_pending,
};
use crate::reconcile::row::{build_rows, Triplet};
use crate::stability::StabilityTracker;
use crate::stall::{StallDetector, StallReason};

/// What a single row's move-check believed about its own source, before
/// claims are cross-checked against each other.
enum MoveCandidate {
    Local { fsid: u64, kind: SyncKind, fingerprint: Option<Fingerprint> },
    Cloud { handle: u64, kind: SyncKind, fingerprint: Option<Fingerprint> },
}

/// One row's bid to be the new home of `source`. Two claims on the same
/// source in a single pass is a contradictory rename.
struct MoveClaim {
    row_name: String,
    source: SyncNodeId,
    candidate: MoveCandidate,
}

fn fs_kind_to_sync(kind: FsNodeKind) -> Option<SyncKind> {
    match kind {
        FsNodeKind::File => Some(SyncKind::File),
        FsNodeKind::Folder => Some(SyncKind::Folder),
        FsNodeKind::Symlink | FsNodeKind::Unknown => None,
    }
}

/// A directory's worth of already-scanned filesystem children and its
/// local path, supplied by the caller (the orchestrator owns the scanner
/// pool; this crate never touches a directory handle directly).
pub trait LocalLister {
    fn list(&mut self, dir: &Path) -> std::io::Result<Vec<FsNode>>;
}

/// What the reconciler needs for one pass over one sync: the tree, the
/// network client, and the per-sync trackers that carry state across
/// passes.
pub struct ReconcileCtx<'a, N: NetworkClient, L: LocalLister> {
    pub cache: &'a mut Cache,
    pub client: &'a mut N,
    pub lister: &'a mut L,
    pub stability: &'a mut StabilityTracker,
    pub stall: &'a mut StallDetector,
    pub backup: Option<&'a mut BackupSubstate>,
    pub case: CaseSensitivity,
    pub ignore: &'a FilterChain,
    /// The sync's local root, fixed for the whole tick. Needed to rebuild an
    /// absolute path for a move source that lives in a directory other than
    /// the one currently being walked.
    pub local_root: &'a Path,
    /// Database ids of every persisted row this pass tore down, so the
    /// caller can queue the matching deletes against the on-disk store
    /// once the whole tree has been walked.
    pub persisted_deletes: &'a mut Vec<i64>,
}

/// Walks one directory's triplet and every folder beneath it, applying row
/// actions and recursing. Returns whether any row in this subtree made
/// forward progress this pass (feeds [`StallDetector`]).
pub fn reconcile_directory<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_parent: SyncNodeId,
    cloud_parent: u64,
    local_dir: &Path,
    relative_path: &str,
) -> Result<bool, SyncFailure> {
    let cloud_children = ctx.client.lookup_cloud_children(cloud_parent);
    let raw_fs_children = ctx
        .lister
        .list(local_dir)
        .map_err(|_| SyncFailure::LocalPathTemporaryUnavailable)?;

    let fs_children: Vec<FsNode> = raw_fs_children
        .into_iter()
        .filter(|node| {
            let child_rel = if relative_path.is_empty() {
                node.name.clone()
            } else {
                format!("{relative_path}/{}", node.name)
            };
            let size = match &node.fingerprint {
                Some(fp) => Some(fp.size),
                None => None,
            };
            ctx.ignore.evaluate(node.kind == FsNodeKind::Folder, &node.name, &child_rel, size)
                == Decision::Include
        })
        .collect();

    let rows = build_rows(ctx.cache, sync_parent, cloud_children, fs_children, ctx.case);

    // Phase 1 (whole row set): move-check every row before any row-action
    // runs. A single per-row pass would let a lexicographically-earlier
    // row whose node is actually a move's source be deleted by its own
    // "stale record" action before a later row gets a chance to recognize
    // it as a move destination and claim it — the old fsid/handle indexes
    // that claim depends on only survive until that deletion.
    //
    // Detection runs to completion over every row before any claim is
    // acted on, so a source claimed from both sides in the same pass (a
    // contradictory rename) is known to be contested before either side's
    // RPC would otherwise fire — dispatching the first claim as soon as
    // it is found would race the discovery of the second.
    let mut claims: Vec<MoveClaim> = Vec::new();
    let mut claim_counts: HashMap<SyncNodeId, u32> = HashMap::new();
    for row in &rows {
        if row.sync.is_some() {
            continue;
        }
        if let (Some(fs), None) = (&row.fs, &row.cloud) {
            if let (Some(fsid), Some(kind)) = (fs.fsid, fs_kind_to_sync(fs.kind)) {
                if let Some(source) = detect_local_move(ctx.cache, fsid, kind, fs.fingerprint, sync_parent)
                {
                    *claim_counts.entry(source).or_insert(0) += 1;
                    claims.push(MoveClaim {
                        row_name: row.name.clone(),
                        source,
                        candidate: MoveCandidate::Local { fsid, kind, fingerprint: fs.fingerprint },
                    });
                    continue;
                }
            }
        }
        if let (Some(cloud), None) = (&row.cloud, &row.fs) {
            if let Some(source) =
                detect_cloud_move(ctx.cache, cloud.handle, cloud.kind, cloud.fingerprint, sync_parent)
            {
                *claim_counts.entry(source).or_insert(0) += 1;
                claims.push(MoveClaim {
                    row_name: row.name.clone(),
                    source,
                    candidate: MoveCandidate::Cloud {
                        handle: cloud.handle,
                        kind: cloud.kind,
                        fingerprint: cloud.fingerprint,
                    },
                });
            }
        }
    }

    let mut move_destinations: HashMap<String, SyncNodeId> = HashMap::new();
    let mut to_finalize: Vec<SyncNodeId> = Vec::new();
    let mut move_progress = false;
    for claim in &claims {
        let kind = match claim.candidate {
            MoveCandidate::Local { kind, .. } => kind,
            MoveCandidate::Cloud { kind, .. } => kind,
        };
        let dest = ctx
            .cache
            .insert_child(sync_parent, claim.row_name.clone(), kind)
            .ok_or(SyncFailure::LocalPathSyncCollision)?;
        let source_handle = ctx.cache.get(claim.source).and_then(|n| n.last_handle);
        let (source_fsid, source_handle_token) = match claim.candidate {
            MoveCandidate::Local { fsid, .. } => (Some(fsid), source_handle),
            MoveCandidate::Cloud { handle, .. } => (None, Some(handle)),
        };
        let fingerprint = match claim.candidate {
            MoveCandidate::Local { fingerprint, .. } => fingerprint,
            MoveCandidate::Cloud { fingerprint, .. } => fingerprint,
        };
        begin_move(ctx.cache, dest, claim.source, source_fsid, source_handle_token, kind, fingerprint);

        // Contested: more than one destination this pass claims the same
        // source. Neither claim is dispatched and the source is left
        // untouched (`begin_move` only flags it, never destroys it) —
        // both destinations simply surface the contention.
        if claim_counts.get(&claim.source).copied().unwrap_or(0) > 1 {
            ctx.stall.record_local(
                child_path(relative_path, &claim.row_name),
                StallReason::MoveBlockedByExistingItem,
            );
            move_destinations.insert(claim.row_name.clone(), dest);
            continue;
        }

        let outcome = match &claim.candidate {
            MoveCandidate::Local { .. } => match source_handle {
                Some(handle) => ctx.client.move_node(handle, cloud_parent, &claim.row_name).map(|()| {
                    ctx.cache.set_synced_fsid(dest, source_fsid);
                    ctx.cache.set_handle(dest, source_handle);
                }),
                None => Err("move source has no cloud handle yet".to_string()),
            },
            MoveCandidate::Cloud { handle, .. } => {
                let mut old_path = ctx.local_root.to_path_buf();
                for part in ctx.cache.path_to_root(claim.source) {
                    old_path.push(part);
                }
                let new_path = local_dir.join(&claim.row_name);
                std::fs::rename(&old_path, &new_path).map(|()| {
                    ctx.cache.set_handle(dest, Some(*handle));
                }).map_err(|err| err.to_string())
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(node) = ctx.cache.get_mut(dest) {
                    node.last_fingerprint = fingerprint;
                    if let Some(token) = node.rare_mut().pending_move.as_mut() {
                        token.succeeded = true;
                    }
                }
                to_finalize.push(dest);
                move_progress = true;
            }
            Err(_) => {
                abandon_failed_move(ctx.cache, dest);
                // `dest` was inserted this very pass and never persisted,
                // so tearing it down needs no matching disk delete.
                ctx.cache.remove_subtree(dest);
                ctx.stall.record_local(
                    child_path(relative_path, &claim.row_name),
                    StallReason::MoveBlockedByExistingItem,
                );
                continue;
            }
        }
        move_destinations.insert(claim.row_name.clone(), dest);
    }

    // Only now, after every claim has been resolved, actually reparent
    // children and destroy each successful move's source. Doing this
    // before every claim was known would let a contested source be torn
    // down before its other claimant's detection ran.
    for dest in to_finalize {
        complete_successful_move(ctx.cache, dest, ctx.persisted_deletes);
    }

    let mut progressed = move_progress;
    for row in &rows {
        if let Some(&dest_id) = move_destinations.get(&row.name) {
            recurse_into_move_destination(ctx, dest_id, local_dir, relative_path, &row.name)?;
            continue;
        }
        if let Some(sync_id) = row.sync {
            if ctx.cache.get(sync_id).is_none() {
                // Consumed as a move source in phase 1 above; nothing left
                // to do for this row.
                continue;
            }
        }
        let row_progressed = reconcile_row(ctx, sync_parent, cloud_parent, local_dir, relative_path, row)?;
        progressed = progressed || row_progressed;
    }

    ctx.cache.propagate_up(sync_parent);
    Ok(progressed)
}

/// Removes a sync-node's subtree and queues the database ids it carried
/// for deletion against the persisted store.
fn remove_and_queue_delete<N: NetworkClient, L: LocalLister>(ctx: &mut ReconcileCtx<N, L>, id: SyncNodeId) {
    let removed = ctx.cache.remove_subtree(id);
    ctx.persisted_deletes.extend(removed.iter().filter_map(|n| n.db_id));
}

fn child_path(relative_path: &str, name: &str) -> String {
    if relative_path.is_empty() {
        name.to_string()
    } else {
        format!("{relative_path}/{name}")
    }
}

/// A move destination resolved in phase 1 needs no row-action of its own
/// this pass, but a folder that just arrived still needs its children
/// walked.
fn recurse_into_move_destination<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    dest_id: SyncNodeId,
    local_dir: &Path,
    relative_path: &str,
    name: &str,
) -> Result<bool, SyncFailure> {
    if is_move_destination_pending(ctx.cache, dest_id) {
        return Ok(false);
    }
    let is_folder = ctx.cache.get(dest_id).map(|n| n.kind) == Some(SyncKind::Folder);
    if !is_folder {
        return Ok(false);
    }
    let Some(handle) = ctx.cache.get(dest_id).and_then(|n| n.last_handle) else {
        return Ok(false);
    };
    let child_relative = child_path(relative_path, name);
    let child_local_path = local_dir.join(name);
    reconcile_directory(ctx, dest_id, handle, &child_local_path, &child_relative)
}

fn reconcile_row<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_parent: SyncNodeId,
    cloud_parent: u64,
    local_dir: &Path,
    relative_path: &str,
    row: &Triplet,
) -> Result<bool, SyncFailure> {
    let child_relative = child_path(relative_path, &row.name);
    let child_local_path = local_dir.join(&row.name);

    // A row whose sync node is the destination of an unresolved move is
    // left entirely alone until the client reports success or failure.
    if let Some(sync_id) = row.sync {
        if is_move_destination_pending(ctx.cache, sync_id) {
            ctx.stall.record_local(
                child_relative.clone(),
                StallReason::MoveNeedsDestinationProcessing,
            );
            return Ok(false);
        }
        if ctx.cache.get(sync_id).is_some_and(SyncNode::is_moved_away) {
            // Its sibling row elsewhere owns this node now; nothing to do
            // here until the move resolves and the node is actually gone.
            return Ok(false);
        }
    }

    let backup_active = ctx.backup.as_deref().is_some_and(|b| b.is_backup());

    let progress = match (&row.cloud, row.sync, &row.fs) {
        // All three agree: nothing to do.
        (Some(cloud), Some(sync_id), Some(fs)) => {
            reconcile_all_present(ctx, sync_id, cloud, fs, &child_relative, backup_active)?
        }

        // Cloud and sync-node agree, filesystem entry is gone: the file
        // was deleted locally (or never created yet, for a fresh sync).
        // A backup sync never re-creates local content to paper over
        // this — local is authoritative, so the deletion is propagated
        // to the cloud exactly like a non-backup sync would.
        (Some(_), Some(sync_id), None) => {
            ctx.client
                .move_to_debris(
                    ctx.cache.get(sync_id).and_then(|n| n.last_handle).unwrap_or(0),
                    false,
                )
                .ok();
            remove_and_queue_delete(ctx, sync_id);
            true
        }

        // Sync-node and filesystem agree, cloud entry is gone: deleted on
        // the cloud side (or rejected by the server).
        (None, Some(sync_id), Some(_)) => {
            std::fs::remove_file(&child_local_path)
                .or_else(|_| std::fs::remove_dir_all(&child_local_path))
                .ok();
            remove_and_queue_delete(ctx, sync_id);
            true
        }

        // Sync-node only: both sides have forgotten this path. Drop the
        // stale record.
        (None, Some(sync_id), None) => {
            remove_and_queue_delete(ctx, sync_id);
            true
        }

        // Cloud and filesystem both have it but there is no sync-node
        // yet: either a brand-new sync (adopt as already-synced when
        // content matches) or a genuine conflict (keep the newer side).
        (Some(cloud), None, Some(fs)) => reconcile_adopt(ctx, sync_parent, cloud, fs, &child_relative)?,

        // Cloud only: a new remote entry to mirror locally, unless a
        // backup sync makes local the authority, in which case an orphan
        // cloud entry with nothing local to pair it with is deleted from
        // the cloud instead of pulled down.
        (Some(cloud), None, None) => {
            reconcile_downsync_new(ctx, sync_parent, cloud, &child_local_path, backup_active)?
        }

        // Filesystem only: a new local entry to mirror to the cloud. The
        // sync-node is created now; the upload itself happens once this
        // node round-trips through the all-present case on a later pass.
        (None, None, Some(fs)) => reconcile_upsync_new(ctx, sync_parent, fs, &child_relative)?,

        (None, None, None) => false,
    };

    // Phase 2 continued: recurse into folders that still need attention.
    let mut recursed_progress = false;
    if let Some(sync_id) = row.sync.or_else(|| ctx.cache.child(sync_parent, &row.name)) {
        let is_folder = ctx.cache.get(sync_id).map(|n| n.kind) == Some(SyncKind::Folder);
        if is_folder && !is_move_destination_pending(ctx.cache, sync_id) {
            let child_cloud_handle = row.cloud.as_ref().map(|c| c.handle);
            if let Some(handle) = child_cloud_handle {
                recursed_progress = reconcile_directory(
                    ctx,
                    sync_id,
                    handle,
                    &child_local_path,
                    &child_relative,
                )?;
            }
        }
    }

    Ok(progress || recursed_progress)
}

fn reconcile_all_present<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_id: SyncNodeId,
    cloud: &CloudNode,
    fs: &FsNode,
    child_relative: &str,
    backup_active: bool,
) -> Result<bool, SyncFailure> {
    let synced_matches_fs = ctx
        .cache
        .get(sync_id)
        .map(|n| n.last_fingerprint == fs.fingerprint && n.last_fsid == fs.fsid)
        .unwrap_or(false);
    let synced_matches_cloud = ctx
        .cache
        .get(sync_id)
        .map(|n| n.last_fingerprint == cloud.fingerprint && n.last_handle == Some(cloud.handle))
        .unwrap_or(false);

    if synced_matches_fs && synced_matches_cloud {
        // Both sides now agree with the last-synced state: any conflict
        // raised on an earlier pass over this row no longer applies.
        if let Some(node) = ctx.cache.get_mut(sync_id) {
            node.flags.conflicts = treesync_cache::PropagationState::Resolved;
        }
        return Ok(false);
    }

    if fs.kind == FsNodeKind::Folder {
        // Folders reconcile by recursion only; equality above already
        // covers the no-op case.
        return Ok(false);
    }

    // Local changed since the last sync: mirroring local to cloud is
    // exactly what a backup sync is for, so this case is unaffected by
    // `backup_active`.
    if !synced_matches_fs && synced_matches_cloud {
        let path = PathBuf::from(child_relative);
        if !ctx.stability.observe(
            &path,
            fs.fingerprint.map(|f| f.size).unwrap_or(0),
            fs.fingerprint.map(|f| f.mtime).unwrap_or(0),
        ) {
            return Ok(false);
        }
        ctx.stability.forget(&path);
        ctx.cache.get_mut(sync_id).unwrap().rare_mut().transfer_in_progress =
            Some(treesync_cache::TransferKind::Upload);
        return Ok(true);
    }

    // Cloud changed since the last sync with the local file untouched.
    if synced_matches_fs && !synced_matches_cloud {
        if backup_active {
            // The local source is authoritative for a backup sync: an
            // unexpected cloud-side edit is overwritten (mirror) or
            // reported (monitor, once a clean pass has already happened),
            // never silently accepted.
            ctx.stall.record_local(
                child_relative.to_string(),
                StallReason::WaitingForFileToStopChanging,
            );
            return Ok(false);
        }
        ctx.cache.get_mut(sync_id).unwrap().rare_mut().transfer_in_progress =
            Some(treesync_cache::TransferKind::Download);
        return Ok(true);
    }

    // Both sides changed since the last sync with no way to pick a winner
    // automatically: raise `conflicts` and leave the row untouched for a
    // user decision.
    if let Some(node) = ctx.cache.get_mut(sync_id) {
        node.flags.conflicts = node.flags.conflicts.join(treesync_cache::PropagationState::Here);
    }
    Ok(false)
}

fn reconcile_adopt<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_parent: SyncNodeId,
    cloud: &CloudNode,
    fs: &FsNode,
    child_relative: &str,
) -> Result<bool, SyncFailure> {
    let Some(kind) = fs_kind_to_sync(fs.kind) else {
        return Ok(false);
    };
    if cloud.kind != kind {
        ctx.stall
            .record_local(child_relative.to_string(), StallReason::MoveNeedsOtherSideParent);
        return Ok(false);
    }

    let same_content = fs.kind == FsNodeKind::Folder || cloud.fingerprint == fs.fingerprint;

    let id = ctx
        .cache
        .insert_child(sync_parent, fs.name.clone(), kind)
        .ok_or(SyncFailure::LocalPathSyncCollision)?;
    ctx.cache.set_synced_fsid(id, fs.fsid);
    ctx.cache.set_handle(id, Some(cloud.handle));

    if same_content {
        if let Some(node) = ctx.cache.get_mut(id) {
            node.last_fingerprint = fs.fingerprint;
        }
    } else {
        // Differing content with no shared history: the newer mtime wins.
        // Recording the *other* side's fingerprint as "last synced" makes
        // the all-present branch see a mismatch against the losing side
        // on the very next pass and queue the matching transfer.
        let fs_newer = fs.fingerprint.map(|f| f.mtime).unwrap_or(0)
            >= cloud.fingerprint.map(|f| f.mtime).unwrap_or(0);
        if let Some(node) = ctx.cache.get_mut(id) {
            node.last_fingerprint = if fs_newer { cloud.fingerprint } else { fs.fingerprint };
        }
    }
    Ok(true)
}

fn reconcile_downsync_new<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_parent: SyncNodeId,
    cloud: &CloudNode,
    local_path: &Path,
    backup_active: bool,
) -> Result<bool, SyncFailure> {
    if backup_active {
        ctx.client.move_to_debris(cloud.handle, false).ok();
        return Ok(true);
    }
    if cloud.kind == SyncKind::Folder {
        std::fs::create_dir(local_path).map_err(|_| SyncFailure::LocalPathUnavailable)?;
    } else {
        ctx.client
            .start_download(cloud.handle, local_path)
            .map_err(|_| SyncFailure::RemoteNodeNotFound)?;
    }
    let id = ctx
        .cache
        .insert_child(sync_parent, cloud.name.clone(), cloud.kind)
        .ok_or(SyncFailure::LocalPathSyncCollision)?;
    ctx.cache.set_handle(id, Some(cloud.handle));
    if cloud.kind == SyncKind::File {
        if let Some(node) = ctx.cache.get_mut(id) {
            node.rare_mut().transfer_in_progress = Some(treesync_cache::TransferKind::Download);
        }
    }
    Ok(true)
}

fn reconcile_upsync_new<N: NetworkClient, L: LocalLister>(
    ctx: &mut ReconcileCtx<N, L>,
    sync_parent: SyncNodeId,
    fs: &FsNode,
    child_relative: &str,
) -> Result<bool, SyncFailure> {
    let Some(kind) = fs_kind_to_sync(fs.kind) else {
        return Ok(false);
    };
    let path = PathBuf::from(child_relative);
    if kind == SyncKind::File
        && !ctx.stability.observe(
            &path,
            fs.fingerprint.map(|f| f.size).unwrap_or(0),
            fs.fingerprint.map(|f| f.mtime).unwrap_or(0),
        )
    {
        return Ok(false);
    }
    if kind == SyncKind::File {
        ctx.stability.forget(&path);
    }

    let id = ctx
        .cache
        .insert_child(sync_parent, fs.name.clone(), kind)
        .ok_or(SyncFailure::LocalPathSyncCollision)?;
    ctx.cache.set_synced_fsid(id, fs.fsid);
    if kind == SyncKind::File {
        if let Some(node) = ctx.cache.get_mut(id) {
            node.rare_mut().transfer_in_progress = Some(treesync_cache::TransferKind::Upload);
        }
    }
    Ok(true)
}
