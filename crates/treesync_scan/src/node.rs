//! The scanned filesystem entry type.

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsNodeKind {
    File,
    Folder,
    Symlink,
    /// A permanent per-entry failure (e.g. unreadable file type); the
    /// entry still occupies a row but can never be reconciled.
    Unknown,
}

/// One entry observed by a directory scan.
#[derive(Debug, Clone)]
pub struct FsNode {
    pub name: String,
    /// Short-name alias (e.g. an 8.3 DOS alias), when the filesystem
    /// exposes one and it differs from `name`.
    pub short_name: Option<String>,
    pub kind: FsNodeKind,
    /// Stable filesystem identifier (inode number or equivalent). `None`
    /// when the OS/filesystem cannot report one (move detection is
    /// disabled for this entry in that case).
    pub fsid: Option<u64>,
    pub fingerprint: Option<Fingerprint>,
    /// A transient access failure (permission denied, I/O error) that
    /// should be retried on the next pass rather than treated as
    /// permanent absence.
    pub blocked: bool,
}

impl FsNode {
    pub fn matches_for_reuse(&self, kind: FsNodeKind, fsid: Option<u64>, fp: Option<Fingerprint>) -> bool {
        self.kind == kind
            && self.fsid == fsid
            && self
                .fingerprint
                .zip(fp)
                .map(|(a, b)| a.size == b.size && a.mtime == b.mtime)
                .unwrap_or(false)
    }
}
