//! Stall detection: once a pass makes zero forward progress for more than
//! ten consecutive passes (with scanning fully caught up on both this and
//! the previous pass), every still-unresolved row publishes a
//! `(path, reason)` entry instead of being silently retried forever.

use std::collections::BTreeMap;

const STALL_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    MoveBlockedByExistingItem,
    MoveNeedsOtherSideParent,
    MoveNeedsDestinationProcessing,
    WaitingForFileToStopChanging,
    UpsyncNeedsTargetFolder,
    DownsyncNeedsTargetFolder,
    DeleteWaitingOnMoves,
    MovingDownloadToTarget,
}

/// Tracks forward progress across passes and, once stalled, the per-path
/// reasons blocking every unresolved row on each side.
pub struct StallDetector {
    no_progress_count: u32,
    made_progress_this_pass: bool,
    reachable_nodes_all_scanned: bool,
    scanning_was_complete: bool,
    pub local: BTreeMap<String, StallReason>,
    pub cloud: BTreeMap<String, StallReason>,
}

impl Default for StallDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StallDetector {
    pub fn new() -> Self {
        Self {
            no_progress_count: 0,
            made_progress_this_pass: false,
            reachable_nodes_all_scanned: false,
            scanning_was_complete: false,
            local: BTreeMap::new(),
            cloud: BTreeMap::new(),
        }
    }

    /// Resets per-pass bookkeeping. Call once at the start of a
    /// reconciliation pass.
    pub fn begin_pass(&mut self) {
        self.made_progress_this_pass = false;
    }

    pub fn record_progress(&mut self) {
        self.made_progress_this_pass = true;
    }

    /// Finalizes the pass: advances (or resets) the no-progress counter
    /// and records whether scanning was fully caught up, which is
    /// required on *two consecutive* passes before stall classification
    /// is trusted (a single fully-scanned pass could still have just
    /// finished discovering new work).
    pub fn end_pass(&mut self, reachable_nodes_all_scanned: bool) {
        if self.made_progress_this_pass {
            self.no_progress_count = 0;
            self.local.clear();
            self.cloud.clear();
        } else {
            self.no_progress_count += 1;
        }
        self.scanning_was_complete = self.reachable_nodes_all_scanned;
        self.reachable_nodes_all_scanned = reachable_nodes_all_scanned;
    }

    pub fn is_stalled(&self) -> bool {
        self.no_progress_count > STALL_THRESHOLD
            && self.reachable_nodes_all_scanned
            && self.scanning_was_complete
    }

    /// Records a local-side stall at `path`, applying ancestor-collapse:
    /// an existing ancestor entry suppresses this one, and a new ancestor
    /// entry supersedes any descendants already recorded.
    pub fn record_local(&mut self, path: String, reason: StallReason) {
        record_collapsed(&mut self.local, path, reason);
    }

    pub fn record_cloud(&mut self, path: String, reason: StallReason) {
        record_collapsed(&mut self.cloud, path, reason);
    }
}

fn record_collapsed(map: &mut BTreeMap<String, StallReason>, path: String, reason: StallReason) {
    if map.keys().any(|existing| is_ancestor(existing, &path)) {
        return;
    }
    map.retain(|existing, _| !is_ancestor(&path, existing));
    map.insert(path, reason);
}

/// True if `ancestor` is a proper ancestor of (or equal to) `path` under
/// `/`-separated component comparison.
fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == path {
        return true;
    }
    let prefix = if ancestor.ends_with('/') {
        ancestor.to_string()
    } else {
        format!("{ancestor}/")
    };
    path.starts_with(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_resets_the_counter_and_clears_stalls() {
        let mut detector = StallDetector::new();
        detector.record_local("/a.txt".into(), StallReason::WaitingForFileToStopChanging);
        detector.begin_pass();
        detector.record_progress();
        detector.end_pass(true);
        assert!(detector.local.is_empty());
    }

    #[test]
    fn stall_requires_more_than_ten_passes_and_complete_scanning() {
        let mut detector = StallDetector::new();
        for _ in 0..11 {
            detector.begin_pass();
            detector.end_pass(true);
        }
        assert!(detector.is_stalled());
    }

    #[test]
    fn incomplete_scanning_suppresses_stall_even_after_many_passes() {
        let mut detector = StallDetector::new();
        for _ in 0..11 {
            detector.begin_pass();
            detector.end_pass(false);
        }
        assert!(!detector.is_stalled());
    }

    #[test]
    fn ancestor_entry_suppresses_a_later_descendant() {
        let mut map = BTreeMap::new();
        record_collapsed(&mut map, "/dir".into(), StallReason::MoveNeedsOtherSideParent);
        record_collapsed(
            &mut map,
            "/dir/child.txt".into(),
            StallReason::WaitingForFileToStopChanging,
        );
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("/dir"));
    }

    #[test]
    fn new_ancestor_entry_supersedes_existing_descendants() {
        let mut map = BTreeMap::new();
        record_collapsed(
            &mut map,
            "/dir/child.txt".into(),
            StallReason::WaitingForFileToStopChanging,
        );
        record_collapsed(&mut map, "/dir".into(), StallReason::MoveNeedsOtherSideParent);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("/dir"));
    }
}
