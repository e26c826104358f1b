//! Encrypted, on-disk persistence of the sync-node tree via rusqlite.
//!
//! Writes are coalesced: callers queue a node for upsert or a row id for
//! delete as changes happen, and [`PersistentStore::flush`] only actually
//! touches the database once the queue crosses a threshold (or the caller
//! forces it, e.g. at shutdown). The threshold is tighter during the
//! initial scan of a new sync, where a crash should not lose an entire
//! folder's worth of identity, and looser once steady-state syncing means
//! most passes touch only a handful of nodes.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use treesync_config::Keys;
use treesync_path::CaseSensitivity;
use treesync_scan::Fingerprint;

use crate::flags::PropagationFlags;
use crate::node::{NodeKind, SyncNode, SyncNodeId};
use crate::tree::Cache;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES sync_nodes(id) ON DELETE CASCADE,
    blob BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_nodes_parent ON sync_nodes(parent_id);
"#;

pub const INITIAL_SCAN_FLUSH_THRESHOLD: usize = 100;
pub const STEADY_STATE_FLUSH_THRESHOLD: usize = 50_000;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] treesync_config::EnvelopeError),
}

/// The durable subset of a [`SyncNode`]'s fields. Transient in-progress
/// state (`rare`, i.e. pending moves and in-flight creates/deletes/
/// transfers) is intentionally not persisted — it describes work the
/// orchestrator is already doing and is safe to rediscover on the next
/// pass after a restart, and the arena ids it would otherwise reference
/// are not stable across a reload anyway.
#[derive(Serialize, Deserialize)]
struct StoredNode {
    local_name: String,
    short_name: Option<String>,
    kind: NodeKind,
    last_fsid: Option<u64>,
    last_handle: Option<u64>,
    last_fingerprint: Option<Fingerprint>,
    flags: PropagationFlags,
}

impl From<&SyncNode> for StoredNode {
    fn from(node: &SyncNode) -> Self {
        Self {
            local_name: node.local_name.clone(),
            short_name: node.short_name.clone(),
            kind: node.kind,
            last_fsid: node.last_fsid,
            last_handle: node.last_handle,
            last_fingerprint: node.last_fingerprint,
            flags: node.flags,
        }
    }
}

pub struct PersistentStore {
    conn: Connection,
    keys: Keys,
    pending_upsert: Vec<SyncNodeId>,
    pending_delete: Vec<i64>,
}

impl PersistentStore {
    pub fn open(path: &Path, keys: Keys) -> Result<Self, PersistError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            keys,
            pending_upsert: Vec::new(),
            pending_delete: Vec::new(),
        })
    }

    pub fn open_in_memory(keys: Keys) -> Result<Self, PersistError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            keys,
            pending_upsert: Vec::new(),
            pending_delete: Vec::new(),
        })
    }

    pub fn queue_upsert(&mut self, id: SyncNodeId) {
        if !self.pending_upsert.contains(&id) {
            self.pending_upsert.push(id);
        }
    }

    pub fn queue_delete(&mut self, db_id: i64) {
        self.pending_delete.push(db_id);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_upsert.len() + self.pending_delete.len()
    }

    pub fn should_flush(&self, initial_scan: bool) -> bool {
        let threshold = if initial_scan {
            INITIAL_SCAN_FLUSH_THRESHOLD
        } else {
            STEADY_STATE_FLUSH_THRESHOLD
        };
        self.pending_len() >= threshold
    }

    /// Writes every queued change to disk. Upserts are applied in
    /// ancestor-before-descendant order so a brand-new child's `parent_id`
    /// foreign key always resolves to a row that already exists.
    pub fn flush(&mut self, cache: &mut Cache) -> Result<(), PersistError> {
        if self.pending_upsert.is_empty() && self.pending_delete.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        for db_id in self.pending_delete.drain(..) {
            tx.execute("DELETE FROM sync_nodes WHERE id = ?1", params![db_id])?;
        }

        let mut ordered = self.pending_upsert.drain(..).collect::<Vec<_>>();
        ordered.sort_by_key(|&id| cache.path_to_root(id).len());

        for id in ordered {
            let Some(node) = cache.get(id) else { continue };
            let stored = StoredNode::from(node);
            let plaintext = serde_json::to_vec(&stored)?;
            let blob = treesync_config::seal(&plaintext, &self.keys);
            let parent_db_id = node.parent.and_then(|p| cache.get(p)).and_then(|p| p.db_id);

            let db_id = node.db_id;
            match db_id {
                Some(existing) => {
                    tx.execute(
                        "UPDATE sync_nodes SET parent_id = ?1, blob = ?2 WHERE id = ?3",
                        params![parent_db_id, blob, existing],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO sync_nodes (parent_id, blob) VALUES (?1, ?2)",
                        params![parent_db_id, blob],
                    )?;
                    let new_id = tx.last_insert_rowid();
                    if let Some(node) = cache.get_mut(id) {
                        node.db_id = Some(new_id);
                    }
                }
            }
        }
        tx.commit()?;
        debug!("sync-node cache flushed to disk");
        Ok(())
    }

    /// Loads the full persisted tree. Rows whose `parent_id` points at a
    /// row that no longer exists (truncated write, manual edit) are
    /// skipped along with their entire subtree rather than treated as a
    /// fatal error — the next scan will simply recreate that corner of the
    /// tree from scratch.
    pub fn load(&self, case: CaseSensitivity) -> Result<Cache, PersistError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, parent_id, blob FROM sync_nodes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_db_id: HashMap<i64, (Option<i64>, StoredNode)> = HashMap::new();
        for (db_id, parent_id, blob) in rows {
            let plaintext = match treesync_config::open(&blob, &self.keys) {
                Ok(p) => p,
                Err(err) => {
                    warn!(db_id, error = %err, "dropping sync-node row that failed to decrypt");
                    continue;
                }
            };
            let stored: StoredNode = match serde_json::from_slice(&plaintext) {
                Ok(s) => s,
                Err(err) => {
                    warn!(db_id, error = %err, "dropping sync-node row with unreadable contents");
                    continue;
                }
            };
            by_db_id.insert(db_id, (parent_id, stored));
        }

        let mut cache = Cache::new(case);
        let root = cache.root();
        cache
            .get_mut(root)
            .expect("cache always has a root")
            .db_id = None;

        let mut children_of: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
        for (db_id, (parent_id, _)) in &by_db_id {
            children_of.entry(*parent_id).or_default().push(*db_id);
        }

        let mut id_map: HashMap<i64, SyncNodeId> = HashMap::new();
        let mut pending = children_of.get(&None).cloned().unwrap_or_default();
        let mut visited_roots = Vec::new();
        visited_roots.append(&mut pending);

        // Breadth-first build so every parent is materialized before its
        // children are attached.
        let mut queue: Vec<(i64, SyncNodeId)> = Vec::new();
        for db_id in visited_roots {
            let Some((_, stored)) = by_db_id.get(&db_id) else { continue };
            let Some(id) = cache.insert_child(root, stored.local_name.clone(), stored.kind) else {
                continue;
            };
            apply_stored(&mut cache, id, stored, db_id);
            id_map.insert(db_id, id);
            queue.push((db_id, id));
        }

        while let Some((parent_db_id, parent_id)) = queue.pop() {
            for child_db_id in children_of.get(&Some(parent_db_id)).into_iter().flatten() {
                let Some((_, stored)) = by_db_id.get(child_db_id) else { continue };
                let Some(id) = cache.insert_child(parent_id, stored.local_name.clone(), stored.kind) else {
                    continue;
                };
                apply_stored(&mut cache, id, stored, *child_db_id);
                id_map.insert(*child_db_id, id);
                queue.push((*child_db_id, id));
            }
        }

        cache.reindex();
        Ok(cache)
    }
}

fn apply_stored(cache: &mut Cache, id: SyncNodeId, stored: &StoredNode, db_id: i64) {
    let Some(node) = cache.get_mut(id) else { return };
    node.short_name = stored.short_name.clone();
    node.last_fsid = stored.last_fsid;
    node.last_handle = stored.last_handle;
    node.last_fingerprint = stored.last_fingerprint;
    node.flags = stored.flags;
    node.db_id = Some(db_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn keys() -> Keys {
        Keys::derive(b"0123456789abcdef-per-user-record").unwrap()
    }

    #[test]
    fn upsert_then_load_round_trips_tree_shape() {
        let mut store = PersistentStore::open_in_memory(keys()).unwrap();
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let dir = cache.insert_child(root, "dir".into(), NodeKind::Folder).unwrap();
        let file = cache.insert_child(dir, "a.txt".into(), NodeKind::File).unwrap();
        cache.set_synced_fsid(file, Some(99));

        store.queue_upsert(dir);
        store.queue_upsert(file);
        store.flush(&mut cache).unwrap();

        let loaded = store.load(CaseSensitivity::Sensitive).unwrap();
        let loaded_root = loaded.root();
        let loaded_dir = loaded.child(loaded_root, "dir").unwrap();
        let loaded_file = loaded.child(loaded_dir, "a.txt").unwrap();
        assert_eq!(loaded.get(loaded_file).unwrap().last_fsid, Some(99));
    }

    #[test]
    fn delete_removes_the_row() {
        let mut store = PersistentStore::open_in_memory(keys()).unwrap();
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let file = cache.insert_child(root, "a.txt".into(), NodeKind::File).unwrap();
        store.queue_upsert(file);
        store.flush(&mut cache).unwrap();

        let db_id = cache.get(file).unwrap().db_id.unwrap();
        store.queue_delete(db_id);
        store.flush(&mut cache).unwrap();

        let loaded = store.load(CaseSensitivity::Sensitive).unwrap();
        assert_eq!(loaded.child(loaded.root(), "a.txt"), None);
    }

    #[test]
    fn should_flush_respects_initial_scan_threshold() {
        let mut store = PersistentStore::open_in_memory(keys()).unwrap();
        for i in 0..100 {
            store.queue_delete(i);
        }
        assert!(store.should_flush(true));
        assert!(!store.should_flush(false));
    }

    #[test]
    fn row_with_missing_parent_and_its_subtree_is_dropped_on_load() {
        let mut store = PersistentStore::open_in_memory(keys()).unwrap();
        let orphan = StoredNode {
            local_name: "orphan".into(),
            short_name: None,
            kind: NodeKind::File,
            last_fsid: None,
            last_handle: None,
            last_fingerprint: None,
            flags: PropagationFlags::default(),
        };
        let plaintext = serde_json::to_vec(&orphan).unwrap();
        let blob = treesync_config::seal(&plaintext, &store.keys);
        store
            .conn
            .execute(
                "INSERT INTO sync_nodes (parent_id, blob) VALUES (?1, ?2)",
                params![Some(9999i64), blob],
            )
            .unwrap();

        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let file = cache.insert_child(root, "kept.txt".into(), NodeKind::File).unwrap();
        store.queue_upsert(file);
        store.flush(&mut cache).unwrap();

        let loaded = store.load(CaseSensitivity::Sensitive).unwrap();
        assert!(loaded.child(loaded.root(), "kept.txt").is_some());
        assert!(loaded.child(loaded.root(), "orphan").is_none());
    }
}
