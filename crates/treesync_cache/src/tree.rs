//! The in-memory sync-node tree: one arena of [`SyncNode`]s plus the global
//! indexes the move detector needs for O(1 + k) candidate lookup instead of
//! a full-tree walk per suspected move.

use std::collections::HashMap;

use treesync_path::{fold_case, CaseSensitivity};

use crate::arena::{Arena, Id};
use crate::node::{NodeKind, SyncNode, SyncNodeId};

/// Keys a `Vec` of node ids by the value every entry shares, appending new
/// matches and pruning nodes that no longer carry it.
fn index_insert(index: &mut HashMap<u64, Vec<SyncNodeId>>, key: u64, id: SyncNodeId) {
    let bucket = index.entry(key).or_default();
    if !bucket.contains(&id) {
        bucket.push(id);
    }
}

fn index_remove(index: &mut HashMap<u64, Vec<SyncNodeId>>, key: u64, id: SyncNodeId) {
    if let Some(bucket) = index.get_mut(&key) {
        bucket.retain(|&existing| existing != id);
        if bucket.is_empty() {
            index.remove(&key);
        }
    }
}

/// The sync-node tree for one sync, plus the indexes used to turn "is there
/// a node whose last-known fsid/handle was X" into a direct lookup.
pub struct Cache {
    arena: Arena<SyncNode>,
    root: SyncNodeId,
    case: CaseSensitivity,

    /// fsid -> nodes last synced with that fsid (the node's filesystem
    /// identity as of the last fully-reconciled pass).
    synced_fsid_index: HashMap<u64, Vec<SyncNodeId>>,
    /// fsid -> nodes whose most recent *scan* (not necessarily synced)
    /// reported that fsid — used to spot a local rename before the cloud
    /// side has caught up.
    scanned_fsid_index: HashMap<u64, Vec<SyncNodeId>>,
    /// cloud handle -> nodes last associated with that handle.
    handle_index: HashMap<u64, Vec<SyncNodeId>>,
}

impl Cache {
    pub fn new(case: CaseSensitivity) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(SyncNode::new(String::new(), NodeKind::Folder, None));
        Self {
            arena,
            root,
            case,
            synced_fsid_index: HashMap::new(),
            scanned_fsid_index: HashMap::new(),
            handle_index: HashMap::new(),
        }
    }

    pub fn root(&self) -> SyncNodeId {
        self.root
    }

    pub fn get(&self, id: SyncNodeId) -> Option<&SyncNode> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: SyncNodeId) -> Option<&mut SyncNode> {
        self.arena.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    fn child_key(&self, name: &str) -> String {
        match self.case {
            CaseSensitivity::Sensitive => name.to_string(),
            CaseSensitivity::Insensitive => fold_case(name),
        }
    }

    pub fn child(&self, parent: SyncNodeId, name: &str) -> Option<SyncNodeId> {
        let key = self.child_key(name);
        self.arena.get(parent)?.children.get(&key).copied()
    }

    pub fn children(&self, parent: SyncNodeId) -> impl Iterator<Item = SyncNodeId> + '_ {
        self.arena
            .get(parent)
            .into_iter()
            .flat_map(|node| node.children.values().copied())
    }

    /// Inserts a new child node under `parent` with the given name, failing
    /// if `parent` already has a child under the same case-folded key.
    pub fn insert_child(
        &mut self,
        parent: SyncNodeId,
        name: String,
        kind: NodeKind,
    ) -> Option<SyncNodeId> {
        let key = self.child_key(&name);
        if self.arena.get(parent)?.children.contains_key(&key) {
            return None;
        }
        let id = self.arena.insert(SyncNode::new(name, kind, Some(parent)));
        self.arena.get_mut(parent)?.children.insert(key, id);
        Some(id)
    }

    /// Detaches `id` from its parent's child map without removing it from
    /// the arena or indexes — used when a node is about to be reparented by
    /// a move rather than truly deleted.
    pub fn detach(&mut self, id: SyncNodeId) {
        let parent = match self.arena.get(id).and_then(|n| n.parent) {
            Some(p) => p,
            None => return,
        };
        let key = self
            .arena
            .get(id)
            .map(|n| self.child_key(&n.local_name))
            .unwrap_or_default();
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.shift_remove(&key);
        }
    }

    /// Reparents `id` under `new_parent` with `new_name`, as the final step
    /// of confirming a move.
    pub fn reparent(&mut self, id: SyncNodeId, new_parent: SyncNodeId, new_name: String) -> bool {
        self.detach(id);
        let key = self.child_key(&new_name);
        let Some(parent_node) = self.arena.get_mut(new_parent) else {
            return false;
        };
        if parent_node.children.contains_key(&key) {
            return false;
        }
        parent_node.children.insert(key, id);
        if let Some(node) = self.arena.get_mut(id) {
            node.local_name = new_name;
            node.parent = Some(new_parent);
        }
        true
    }

    /// Removes `id` and its entire subtree from the tree and every index.
    /// Returns the removed nodes (root of the removed subtree first).
    pub fn remove_subtree(&mut self, id: SyncNodeId) -> Vec<SyncNode> {
        self.detach(id);
        self.remove_recursive(id)
    }

    fn remove_recursive(&mut self, id: SyncNodeId) -> Vec<SyncNode> {
        let children: Vec<SyncNodeId> = self
            .arena
            .get(id)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default();

        let mut removed = Vec::with_capacity(children.len() + 1);
        let Some(node) = self.arena.remove(id) else {
            return removed;
        };
        if let Some(fsid) = node.last_fsid {
            index_remove(&mut self.synced_fsid_index, fsid, id);
            index_remove(&mut self.scanned_fsid_index, fsid, id);
        }
        if let Some(handle) = node.last_handle {
            index_remove(&mut self.handle_index, handle, id);
        }
        removed.push(node);
        for child in children {
            removed.extend(self.remove_recursive(child));
        }
        removed
    }

    pub fn set_synced_fsid(&mut self, id: SyncNodeId, fsid: Option<u64>) {
        if let Some(node) = self.arena.get_mut(id) {
            if let Some(old) = node.last_fsid {
                index_remove(&mut self.synced_fsid_index, old, id);
            }
            node.last_fsid = fsid;
        }
        if let Some(fsid) = fsid {
            index_insert(&mut self.synced_fsid_index, fsid, id);
        }
    }

    pub fn set_scanned_fsid(&mut self, id: SyncNodeId, fsid: u64) {
        index_insert(&mut self.scanned_fsid_index, fsid, id);
    }

    pub fn clear_scanned_fsid(&mut self, id: SyncNodeId, fsid: u64) {
        index_remove(&mut self.scanned_fsid_index, fsid, id);
    }

    pub fn set_handle(&mut self, id: SyncNodeId, handle: Option<u64>) {
        if let Some(node) = self.arena.get_mut(id) {
            if let Some(old) = node.last_handle {
                index_remove(&mut self.handle_index, old, id);
            }
            node.last_handle = handle;
        }
        if let Some(handle) = handle {
            index_insert(&mut self.handle_index, handle, id);
        }
    }

    /// Candidate nodes a filesystem move/rename to `fsid` might have come
    /// from, per the sync-node-cache move-detection rule: any node whose
    /// most recent scan or sync reported this fsid elsewhere in the tree.
    pub fn move_candidates_by_fsid(&self, fsid: u64) -> Vec<SyncNodeId> {
        let mut candidates = self
            .synced_fsid_index
            .get(&fsid)
            .cloned()
            .unwrap_or_default();
        for id in self.scanned_fsid_index.get(&fsid).into_iter().flatten() {
            if !candidates.contains(id) {
                candidates.push(*id);
            }
        }
        candidates
    }

    pub fn move_candidates_by_handle(&self, handle: u64) -> Vec<SyncNodeId> {
        self.handle_index.get(&handle).cloned().unwrap_or_default()
    }

    /// Every node whose own `conflicts` flag is `Here` — an actual
    /// conflict at that path, as opposed to a descendant's conflict merely
    /// propagated upward as `DescendantFlagged`.
    pub fn conflicted_nodes(&self) -> Vec<SyncNodeId> {
        self.arena
            .iter()
            .filter(|(_, node)| node.flags.conflicts == crate::flags::PropagationState::Here)
            .map(|(id, _)| id)
            .collect()
    }

    /// Raises each ancestor's flags to at least what `flags.implied_for_parent()`
    /// demands, stopping as soon as an ancestor is already at or above that
    /// level (its own ancestors were necessarily already raised when it
    /// was).
    pub fn propagate_up(&mut self, from: SyncNodeId) {
        let mut implied = match self.arena.get(from) {
            Some(node) => node.flags.implied_for_parent(),
            None => return,
        };
        let mut current = self.arena.get(from).and_then(|n| n.parent);
        while let Some(id) = current {
            let Some(node) = self.arena.get_mut(id) else { break };
            let joined = node.flags.join(&implied);
            if joined == node.flags {
                break;
            }
            node.flags = joined;
            implied = node.flags.implied_for_parent();
            current = node.parent;
        }
    }

    pub fn path_to_root(&self, mut id: SyncNodeId) -> Vec<String> {
        let mut parts = Vec::new();
        while let Some(node) = self.arena.get(id) {
            if node.parent.is_none() {
                break;
            }
            parts.push(node.local_name.clone());
            id = match node.parent {
                Some(p) => p,
                None => break,
            };
        }
        parts.reverse();
        parts
    }

    /// Walks `parts` from `anchor` as far as existing children allow.
    /// Returns the deepest node reached and whether every part was
    /// consumed (an exact match) versus stopping at an ancestor.
    pub fn resolve_descendant(&self, anchor: SyncNodeId, parts: &[String]) -> (SyncNodeId, bool) {
        let mut current = anchor;
        for part in parts {
            match self.child(current, part) {
                Some(next) => current = next,
                None => return (current, false),
            }
        }
        (current, true)
    }

    /// Rebuilds every index from the arena's current contents, used after
    /// loading a persisted tree where the indexes themselves are not
    /// stored on disk.
    pub(crate) fn reindex(&mut self) {
        self.synced_fsid_index.clear();
        self.scanned_fsid_index.clear();
        self.handle_index.clear();
        let entries: Vec<(Id, Option<u64>, Option<u64>)> = self
            .arena
            .iter()
            .map(|(id, node)| (id, node.last_fsid, node.last_handle))
            .collect();
        for (id, fsid, handle) in entries {
            if let Some(fsid) = fsid {
                index_insert(&mut self.synced_fsid_index, fsid, id);
            }
            if let Some(handle) = handle {
                index_insert(&mut self.handle_index, handle, id);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_a_child() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let id = cache
            .insert_child(root, "a.txt".into(), NodeKind::File)
            .unwrap();
        assert_eq!(cache.child(root, "a.txt"), Some(id));
        assert_eq!(cache.child(root, "A.txt"), None);
    }

    #[test]
    fn case_insensitive_tree_folds_lookups() {
        let mut cache = Cache::new(CaseSensitivity::Insensitive);
        let root = cache.root();
        let id = cache
            .insert_child(root, "Report.TXT".into(), NodeKind::File)
            .unwrap();
        assert_eq!(cache.child(root, "report.txt"), Some(id));
    }

    #[test]
    fn move_candidates_found_by_fsid_after_scan() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let id = cache
            .insert_child(root, "old.txt".into(), NodeKind::File)
            .unwrap();
        cache.set_synced_fsid(id, Some(42));
        assert_eq!(cache.move_candidates_by_fsid(42), vec![id]);
    }

    #[test]
    fn remove_subtree_clears_indexes() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let id = cache
            .insert_child(root, "a.txt".into(), NodeKind::File)
            .unwrap();
        cache.set_synced_fsid(id, Some(7));
        cache.remove_subtree(id);
        assert!(cache.move_candidates_by_fsid(7).is_empty());
        assert_eq!(cache.child(root, "a.txt"), None);
    }

    #[test]
    fn reparent_moves_node_and_updates_name() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let dir = cache
            .insert_child(root, "dir".into(), NodeKind::Folder)
            .unwrap();
        let file = cache
            .insert_child(root, "a.txt".into(), NodeKind::File)
            .unwrap();
        assert!(cache.reparent(file, dir, "b.txt".into()));
        assert_eq!(cache.child(root, "a.txt"), None);
        assert_eq!(cache.child(dir, "b.txt"), Some(file));
    }

    #[test]
    fn resolve_descendant_stops_at_the_deepest_existing_node() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let dir = cache
            .insert_child(root, "dir".into(), NodeKind::Folder)
            .unwrap();
        let (node, exact) =
            cache.resolve_descendant(root, &["dir".to_string(), "missing.txt".to_string()]);
        assert_eq!(node, dir);
        assert!(!exact);
    }

    #[test]
    fn propagate_up_raises_ancestors_to_descendant_flagged() {
        use crate::flags::PropagationState;
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let dir = cache
            .insert_child(root, "dir".into(), NodeKind::Folder)
            .unwrap();
        let file = cache
            .insert_child(dir, "a.txt".into(), NodeKind::File)
            .unwrap();
        cache.get_mut(file).unwrap().flags.sync_again = PropagationState::Here;
        cache.propagate_up(file);
        assert_eq!(
            cache.get(dir).unwrap().flags.sync_again,
            PropagationState::DescendantFlagged
        );
    }
}
