//! Move/rename detection: correlating a disappearing fsid or cloud handle
//! with its reappearance elsewhere in the tree, and applying a move once
//! the client confirms it completed.

use treesync_cache::{Cache, MoveToken, NodeKind, SyncNodeId};
use treesync_scan::Fingerprint;

fn fingerprints_compatible(a: Option<Fingerprint>, b: Option<Fingerprint>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        (None, None) => true,
        _ => false,
    }
}

/// Finds a surviving SyncNode elsewhere in the tree whose last-synced fsid
/// matches `fsid`, with a type and fingerprint that agree with the row
/// that is claiming to be its new position — the **local move** case.
pub fn detect_local_move(
    cache: &Cache,
    fsid: u64,
    candidate_kind: NodeKind,
    candidate_fingerprint: Option<Fingerprint>,
    excluding: SyncNodeId,
) -> Option<SyncNodeId> {
    cache
        .move_candidates_by_fsid(fsid)
        .into_iter()
        .filter(|&id| id != excluding)
        .find(|&id| {
            cache.get(id).is_some_and(|n| {
                n.kind == candidate_kind && fingerprints_compatible(n.last_fingerprint, candidate_fingerprint)
            })
        })
}

/// Same correlation, but by cloud handle — the **cloud move** case.
pub fn detect_cloud_move(
    cache: &Cache,
    handle: u64,
    candidate_kind: NodeKind,
    candidate_fingerprint: Option<Fingerprint>,
    excluding: SyncNodeId,
) -> Option<SyncNodeId> {
    cache
        .move_candidates_by_handle(handle)
        .into_iter()
        .filter(|&id| id != excluding)
        .find(|&id| {
            cache.get(id).is_some_and(|n| {
                n.kind == candidate_kind && fingerprints_compatible(n.last_fingerprint, candidate_fingerprint)
            })
        })
}

/// Attaches a pending move token to `destination`, recording what is known
/// about the source row at the moment the move was suspected. The source
/// row itself is left untouched in the tree until the move is confirmed —
/// only marked so the row-action phase skips it this pass.
pub fn begin_move(
    cache: &mut Cache,
    destination: SyncNodeId,
    source: SyncNodeId,
    source_fsid: Option<u64>,
    source_handle: Option<u64>,
    source_kind: NodeKind,
    source_fingerprint: Option<Fingerprint>,
) {
    if let Some(node) = cache.get_mut(destination) {
        node.rare_mut().pending_move = Some(MoveToken {
            source_fsid,
            source_handle,
            source_kind,
            source_fingerprint,
            source_node: source,
            succeeded: false,
            failed: false,
            result_processed: false,
        });
    }
    if let Some(node) = cache.get_mut(source) {
        node.rare_mut().moved_away = true;
    }
}

/// True while `node` is itself the destination of a move still in flight —
/// its subtree must not be further mutated until the move resolves.
pub fn is_move_destination_pending(cache: &Cache, node: SyncNodeId) -> bool {
    cache
        .get(node)
        .and_then(|n| n.pending_move())
        .is_some_and(|token| !token.succeeded && !token.failed)
}

/// Once the client reports a move succeeded, relocates the source
/// SyncNode's children under the destination and destroys the source —
/// the source's fsid/handle are cleared first so it can never again be
/// matched as a move candidate while the removal is in flight.
///
/// Every persisted row the removal touches (the source and, because
/// `remove_subtree` recurses, anything still parented under it) has its
/// database id appended to `deleted_db_ids` so the caller can queue the
/// matching deletes against the on-disk store.
pub fn complete_successful_move(
    cache: &mut Cache,
    destination: SyncNodeId,
    deleted_db_ids: &mut Vec<i64>,
) -> bool {
    let token = match cache.get(destination).and_then(|n| n.pending_move()) {
        Some(token) if token.succeeded => token.clone(),
        _ => return false,
    };
    let source = token.source_node;

    let children: Vec<SyncNodeId> = cache.children(source).collect();
    for child in children {
        let name = cache
            .get(child)
            .map(|n| n.local_name.clone())
            .unwrap_or_default();
        cache.reparent(child, destination, name);
    }

    cache.set_synced_fsid(source, None);
    cache.set_handle(source, None);
    let removed = cache.remove_subtree(source);
    deleted_db_ids.extend(removed.iter().filter_map(|n| n.db_id));

    if let Some(node) = cache.get_mut(destination) {
        node.rare_mut().pending_move = None;
        node.compact_rare();
    }
    true
}

/// A move the client reported as failed is simply abandoned: the token is
/// cleared and both rows are revisited from scratch on the next pass.
pub fn abandon_failed_move(cache: &mut Cache, destination: SyncNodeId) {
    let source = cache
        .get(destination)
        .and_then(|n| n.pending_move())
        .map(|t| t.source_node);

    if let Some(node) = cache.get_mut(destination) {
        node.rare_mut().pending_move = None;
        node.compact_rare();
    }
    if let Some(source) = source {
        if let Some(node) = cache.get_mut(source) {
            node.rare_mut().moved_away = false;
            node.compact_rare();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_cache::NodeKind;
    use treesync_path::CaseSensitivity;

    #[test]
    fn detects_local_move_by_matching_fsid_and_fingerprint() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let old = cache.insert_child(root, "old.txt".into(), NodeKind::File).unwrap();
        cache.set_synced_fsid(old, Some(7));

        let new_row = cache.insert_child(root, "new.txt".into(), NodeKind::File).unwrap();
        let found = detect_local_move(&cache, 7, NodeKind::File, None, new_row);
        assert_eq!(found, Some(old));
    }

    #[test]
    fn complete_successful_move_reparents_children_and_destroys_source() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let source = cache.insert_child(root, "src".into(), NodeKind::Folder).unwrap();
        let child = cache.insert_child(source, "a.txt".into(), NodeKind::File).unwrap();
        let destination = cache.insert_child(root, "dst".into(), NodeKind::Folder).unwrap();

        begin_move(&mut cache, destination, source, None, None, NodeKind::Folder, None);
        cache
            .get_mut(destination)
            .unwrap()
            .rare_mut()
            .pending_move
            .as_mut()
            .unwrap()
            .succeeded = true;

        let mut deleted = Vec::new();
        assert!(complete_successful_move(&mut cache, destination, &mut deleted));
        assert_eq!(cache.child(destination, "a.txt"), Some(child));
        assert_eq!(cache.get(child).unwrap().parent, Some(destination));
        assert!(cache.child(root, "src").is_none());
    }

    #[test]
    fn pending_unresolved_move_blocks_destination_recursion() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let source = cache.insert_child(root, "src".into(), NodeKind::Folder).unwrap();
        let destination = cache.insert_child(root, "dst".into(), NodeKind::Folder).unwrap();
        begin_move(&mut cache, destination, source, None, None, NodeKind::Folder, None);
        assert!(is_move_destination_pending(&cache, destination));
    }
}
