//! The "file still changing" rate limit: a file whose disappearance
//! elsewhere in the tree suggests an in-place rewrite must hold its
//! `(size, mtime)` steady for a window before it is eligible for upload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const STABILITY_WINDOW: Duration = Duration::from_secs(3);
const MAX_DEFER: Duration = Duration::from_secs(60);

struct Record {
    first_seen: Instant,
    last_size: u64,
    last_mtime: i64,
    last_change: Instant,
}

/// Tracks per-path `(size, mtime)` observations across reconciliation
/// passes to decide whether a file has stopped changing.
#[derive(Default)]
pub struct StabilityTracker {
    records: HashMap<PathBuf, Record>,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation and reports whether the file is now stable
    /// enough to act on: unchanged for [`STABILITY_WINDOW`], or forced
    /// through after [`MAX_DEFER`] regardless (a file that never settles
    /// must not block forever).
    pub fn observe(&mut self, path: &Path, size: u64, mtime: i64) -> bool {
        let now = Instant::now();
        let record = self.records.entry(path.to_path_buf()).or_insert(Record {
            first_seen: now,
            last_size: size,
            last_mtime: mtime,
            last_change: now,
        });

        if record.last_size != size || record.last_mtime != mtime {
            record.last_size = size;
            record.last_mtime = mtime;
            record.last_change = now;
        }

        let stable = now.duration_since(record.last_change) >= STABILITY_WINDOW;
        let timed_out = now.duration_since(record.first_seen) >= MAX_DEFER;
        if stable || timed_out {
            self.records.remove(path);
            true
        } else {
            false
        }
    }

    /// Drops tracking state for a path once it has been acted on or no
    /// longer needs watching (e.g. it was deleted before becoming stable).
    pub fn forget(&mut self, path: &Path) {
        self.records.remove(path);
    }
}
