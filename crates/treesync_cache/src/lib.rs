//! The persistent sync-node cache: a tree that mirrors the reconciler's
//! belief about every path it has ever seen on any side of the cloud/
//! sync-node/filesystem triplet, plus the indexes the move detector needs
//! and the encrypted on-disk store that survives a restart.

mod arena;
mod flags;
mod node;
mod persist;
mod tree;

pub use flags::{PropagationFlags, PropagationState};
pub use node::{MoveToken, NodeKind, RareFields, SyncNode, SyncNodeId, TransferKind};
pub use persist::{
    PersistError, PersistentStore, INITIAL_SCAN_FLUSH_THRESHOLD, STEADY_STATE_FLUSH_THRESHOLD,
};
pub use tree::Cache;
