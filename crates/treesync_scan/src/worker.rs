//! The actual directory walk performed by a worker thread.

use std::collections::HashMap;
use std::fs::DirEntry;
use std::path::Path;

use crate::fingerprint::{self, Fingerprint};
use crate::node::{FsNode, FsNodeKind};

/// Scans one directory, reusing fingerprints from `prior_children` when an
/// entry's `(type, fsid, mtime, size)` tuple is unchanged so unmodified
/// files never have their content re-read.
pub fn scan_directory(
    dir: &Path,
    follow_symlinks: bool,
    prior_children: &HashMap<String, FsNode>,
) -> std::io::Result<Vec<FsNode>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue, // transient per-entry failure; skip, don't abort the scan
        };
        nodes.push(scan_entry(&entry, follow_symlinks, prior_children));
    }
    Ok(nodes)
}

fn scan_entry(
    entry: &DirEntry,
    follow_symlinks: bool,
    prior_children: &HashMap<String, FsNode>,
) -> FsNode {
    let name = entry.file_name().to_string_lossy().into_owned();

    let link_metadata = match entry.metadata() {
        Ok(m) => m,
        Err(_) => {
            return FsNode {
                name,
                short_name: None,
                kind: FsNodeKind::Unknown,
                fsid: None,
                fingerprint: None,
                blocked: true,
            };
        }
    };

    let file_type = entry.file_type();
    let is_symlink = file_type.map(|t| t.is_symlink()).unwrap_or(false);

    let kind = if is_symlink && !follow_symlinks {
        FsNodeKind::Symlink
    } else if link_metadata.is_dir() {
        FsNodeKind::Folder
    } else if link_metadata.is_file() {
        FsNodeKind::File
    } else {
        FsNodeKind::Unknown
    };

    let fsid = stable_id(&link_metadata);
    let mtime = mtime_secs(&link_metadata);
    let size = link_metadata.len();

    if kind == FsNodeKind::Symlink || kind == FsNodeKind::Folder || kind == FsNodeKind::Unknown {
        return FsNode {
            name,
            short_name: None,
            kind,
            fsid,
            fingerprint: None,
            blocked: false,
        };
    }

    let fingerprint = resolve_fingerprint(&entry.path(), &name, kind, fsid, mtime, size, prior_children);

    FsNode {
        name,
        short_name: None,
        kind,
        fsid,
        fingerprint,
        blocked: fingerprint.is_none(),
    }
}

fn resolve_fingerprint(
    path: &Path,
    name: &str,
    kind: FsNodeKind,
    fsid: Option<u64>,
    mtime: i64,
    size: u64,
    prior_children: &HashMap<String, FsNode>,
) -> Option<Fingerprint> {
    let candidate = Fingerprint { size, mtime, checksum: [0; 4] };
    if let Some(prior) = prior_children.get(name) {
        if prior.matches_for_reuse(kind, fsid, Some(candidate)) {
            return prior.fingerprint;
        }
    }
    fingerprint::compute(path, size, mtime).ok()
}

#[cfg(unix)]
fn stable_id(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn stable_id(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi!").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let nodes = scan_directory(dir.path(), false, &HashMap::new()).unwrap();
        let mut kinds: Vec<_> = nodes.iter().map(|n| (n.name.clone(), n.kind)).collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("a.txt".to_string(), FsNodeKind::File),
                ("sub".to_string(), FsNodeKind::Folder)
            ]
        );
    }

    #[test]
    fn reuses_fingerprint_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hi!").unwrap();

        let first = scan_directory(dir.path(), false, &HashMap::new()).unwrap();
        let prior: HashMap<_, _> = first.into_iter().map(|n| (n.name.clone(), n)).collect();

        let second = scan_directory(dir.path(), false, &prior).unwrap();
        assert_eq!(
            second[0].fingerprint.unwrap().checksum,
            prior["a.txt"].fingerprint.unwrap().checksum
        );
    }

    #[test]
    fn detects_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hi!").unwrap();
        let first = scan_directory(dir.path(), false, &HashMap::new()).unwrap();
        let prior: HashMap<_, _> = first.into_iter().map(|n| (n.name.clone(), n)).collect();

        // Change both content and mtime-affecting size so the reuse rule
        // can't short-circuit.
        std::fs::write(&path, "hi there, a longer body now").unwrap();
        let second = scan_directory(dir.path(), false, &prior).unwrap();
        assert_ne!(second[0].fingerprint.unwrap().size, prior["a.txt"].fingerprint.unwrap().size);
    }
}
