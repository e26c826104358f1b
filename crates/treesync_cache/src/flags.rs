//! The propagation-flag lattice shared by every "needs another look"
//! signal on a [`crate::node::SyncNode`]: `scanAgain`, `checkMovesAgain`,
//! `syncAgain`, `conflicts`, `useBlocked`, `scanBlocked`.
//!
//! Each flag lives at one of four levels, ordered `Resolved < DescendantFlagged
//! < Here <= HereAndBelow`, and a parent's flag is raised to at least
//! `DescendantFlagged` whenever any descendant sets its own flag to `Here` or
//! above — the orchestrator walks up from wherever work was found instead of
//! re-scanning the whole tree to notice it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum PropagationState {
    #[default]
    Resolved,
    DescendantFlagged,
    Here,
    HereAndBelow,
}

impl PropagationState {
    /// True once this level means "work is needed here or below", i.e.
    /// anything above `Resolved`.
    pub fn pending(self) -> bool {
        self != PropagationState::Resolved
    }

    /// The flag an ancestor should be raised to, given that one of its
    /// descendants is at `self`. Only `Here`/`HereAndBelow` at the
    /// descendant imply anything for the ancestor; `DescendantFlagged`
    /// itself does not re-propagate further up past one level.
    pub fn implied_for_parent(self) -> PropagationState {
        match self {
            PropagationState::Here | PropagationState::HereAndBelow => {
                PropagationState::DescendantFlagged
            }
            PropagationState::DescendantFlagged | PropagationState::Resolved => {
                PropagationState::Resolved
            }
        }
    }

    /// Join two flag values: the lattice supremum, used when two
    /// independent reasons both want to raise the same flag.
    pub fn join(self, other: PropagationState) -> PropagationState {
        self.max(other)
    }
}

/// The six propagation flags tracked per node, per spec §3/§9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PropagationFlags {
    pub scan_again: PropagationState,
    pub check_moves_again: PropagationState,
    pub sync_again: PropagationState,
    pub conflicts: PropagationState,
    pub use_blocked: PropagationState,
    pub scan_blocked: PropagationState,
}

impl PropagationFlags {
    pub fn any_pending(&self) -> bool {
        self.scan_again.pending()
            || self.check_moves_again.pending()
            || self.sync_again.pending()
            || self.conflicts.pending()
            || self.use_blocked.pending()
            || self.scan_blocked.pending()
    }

    /// The flags an ancestor should be raised to if this node carries
    /// `self`, applied field by field.
    pub fn implied_for_parent(&self) -> PropagationFlags {
        PropagationFlags {
            scan_again: self.scan_again.implied_for_parent(),
            check_moves_again: self.check_moves_again.implied_for_parent(),
            sync_again: self.sync_again.implied_for_parent(),
            conflicts: self.conflicts.implied_for_parent(),
            use_blocked: self.use_blocked.implied_for_parent(),
            scan_blocked: self.scan_blocked.implied_for_parent(),
        }
    }

    pub fn join(&self, other: &PropagationFlags) -> PropagationFlags {
        PropagationFlags {
            scan_again: self.scan_again.join(other.scan_again),
            check_moves_again: self.check_moves_again.join(other.check_moves_again),
            sync_again: self.sync_again.join(other.sync_again),
            conflicts: self.conflicts.join(other.conflicts),
            use_blocked: self.use_blocked.join(other.use_blocked),
            scan_blocked: self.scan_blocked.join(other.scan_blocked),
        }
    }
}
