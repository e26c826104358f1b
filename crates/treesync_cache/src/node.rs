//! The persistent `SyncNode`: the engine's record of one path that has, at
//! some point, existed on any of the cloud/sync-node/filesystem triplet.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use treesync_scan::Fingerprint;

use crate::arena::Id;
use crate::flags::PropagationFlags;

pub type SyncNodeId = Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Folder,
}

/// What kind of transfer, if any, is in flight for this node. Kept out of
/// the common [`SyncNode`] fields because it applies to a small minority of
/// live nodes at any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Upload,
    Download,
}

/// State for a move/rename this node is suspected of being the destination
/// of, mirroring the engine's `MoveInProgress` bookkeeping: the fields
/// recorded about the *source* row at the moment the move was detected, so
/// the reconciler can confirm or retract the move once the transfer
/// resolves without re-deriving them from a row that may no longer exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveToken {
    pub source_fsid: Option<u64>,
    pub source_handle: Option<u64>,
    pub source_kind: NodeKind,
    pub source_fingerprint: Option<Fingerprint>,
    pub source_node: SyncNodeId,
    pub succeeded: bool,
    pub failed: bool,
    pub result_processed: bool,
}

/// Fields only a small fraction of nodes ever populate. Boxed so a node
/// that never needs them pays one pointer-sized `None` instead of carrying
/// all these fields inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RareFields {
    pub pending_move: Option<MoveToken>,
    pub create_in_progress: bool,
    pub delete_in_progress: bool,
    pub transfer_in_progress: Option<TransferKind>,
    /// Set on the *source* row of a suspected move the instant a
    /// destination elsewhere claims it (see `MoveToken::source_node`), so
    /// the row-action phase does not delete it out from under the move
    /// regardless of which directory the walk visits first.
    pub moved_away: bool,
}

impl RareFields {
    fn is_default(&self) -> bool {
        self.pending_move.is_none()
            && !self.create_in_progress
            && !self.delete_in_progress
            && self.transfer_in_progress.is_none()
            && !self.moved_away
    }
}

/// One node of the persistent sync-node tree: the engine's belief about a
/// single path, reconciled across the cloud, sync-node cache, and local
/// filesystem triplet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncNode {
    pub local_name: String,
    /// A short-name alias (e.g. an 8.3 DOS alias) distinct from
    /// `local_name`, when the filesystem exposes one.
    pub short_name: Option<String>,
    pub kind: NodeKind,

    /// The filesystem id last observed for this node, used to correlate
    /// scan rows with this node across renames.
    pub last_fsid: Option<u64>,
    /// The cloud handle last observed for this node.
    pub last_handle: Option<u64>,
    pub last_fingerprint: Option<Fingerprint>,

    pub parent: Option<SyncNodeId>,
    /// Children keyed by the fold-cased name used for lookup; insertion
    /// order is preserved so directory listings stay stable between scans.
    pub children: IndexMap<String, SyncNodeId>,

    pub flags: PropagationFlags,

    /// The row id this node was last persisted under, `None` until the
    /// first flush assigns one.
    pub db_id: Option<i64>,

    pub rare: Option<Box<RareFields>>,
}

impl SyncNode {
    pub fn new(local_name: String, kind: NodeKind, parent: Option<SyncNodeId>) -> Self {
        Self {
            local_name,
            short_name: None,
            kind,
            last_fsid: None,
            last_handle: None,
            last_fingerprint: None,
            parent,
            children: IndexMap::new(),
            flags: PropagationFlags::default(),
            db_id: None,
            rare: None,
        }
    }

    pub fn rare_mut(&mut self) -> &mut RareFields {
        self.rare.get_or_insert_with(Box::default)
    }

    /// Drops the rare-fields box once it returns to its default value, so a
    /// node that finishes a transfer or a move doesn't keep paying for the
    /// allocation indefinitely.
    pub fn compact_rare(&mut self) {
        if self.rare.as_deref().is_some_and(RareFields::is_default) {
            self.rare = None;
        }
    }

    pub fn pending_move(&self) -> Option<&MoveToken> {
        self.rare.as_ref()?.pending_move.as_ref()
    }

    pub fn is_create_in_progress(&self) -> bool {
        self.rare.as_ref().is_some_and(|r| r.create_in_progress)
    }

    pub fn is_delete_in_progress(&self) -> bool {
        self.rare.as_ref().is_some_and(|r| r.delete_in_progress)
    }

    pub fn transfer_in_progress(&self) -> Option<TransferKind> {
        self.rare.as_ref()?.transfer_in_progress
    }

    pub fn is_moved_away(&self) -> bool {
        self.rare.as_ref().is_some_and(|r| r.moved_away)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rare_fields_compact_back_to_none_once_default() {
        let mut node = SyncNode::new("a.txt".into(), NodeKind::File, None);
        node.rare_mut().create_in_progress = true;
        assert!(node.rare.is_some());

        node.rare_mut().create_in_progress = false;
        node.compact_rare();
        assert!(node.rare.is_none());
    }

    #[test]
    fn fresh_node_has_no_pending_move() {
        let node = SyncNode::new("a.txt".into(), NodeKind::File, None);
        assert!(node.pending_move().is_none());
    }
}
