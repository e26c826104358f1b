//! The reconciliation pass: triplet construction (Step A), the per-row
//! move-check and action walk with folder recursion (Step B), and flag
//! propagation back up the tree (Step C, delegated to
//! [`treesync_cache::Cache::propagate_up`]).

mod pass;
mod row;

pub use pass::{reconcile_directory, LocalLister, ReconcileCtx};
pub use row::{build_rows, Triplet};
