//! Step A: triplet construction. Cloud, sync-node, and filesystem children
//! of one directory are merged by name under the sync's case policy; a
//! second cloud/fs entry under the same name becomes a clash on that row
//! rather than a row of its own.

use std::collections::BTreeMap;

use treesync_cache::{Cache, SyncNodeId};
use treesync_path::{fold_case, CaseSensitivity};
use treesync_scan::FsNode;

use crate::cloud::CloudNode;

/// The `(cloud?, sync?, fs?)` tuple for one name in a directory, plus the
/// same-side entries that lost the name-collision and fell into a clash
/// list instead of pairing.
#[derive(Debug, Default)]
pub struct Triplet {
    pub name: String,
    pub cloud: Option<CloudNode>,
    pub sync: Option<SyncNodeId>,
    pub fs: Option<FsNode>,
    pub cloud_clashes: Vec<CloudNode>,
    pub fs_clashes: Vec<FsNode>,
}

fn key(case: CaseSensitivity, name: &str) -> String {
    match case {
        CaseSensitivity::Sensitive => name.to_string(),
        CaseSensitivity::Insensitive => fold_case(name),
    }
}

/// Builds the row list for one directory. `fs_children` should already
/// have ignored entries filtered out by the caller.
pub fn build_rows(
    cache: &Cache,
    parent: SyncNodeId,
    cloud_children: Vec<CloudNode>,
    fs_children: Vec<FsNode>,
    case: CaseSensitivity,
) -> Vec<Triplet> {
    let mut rows: BTreeMap<String, Triplet> = BTreeMap::new();

    for cloud in cloud_children {
        let k = key(case, &cloud.name);
        let entry = rows.entry(k).or_insert_with(|| Triplet {
            name: cloud.name.clone(),
            ..Default::default()
        });
        if entry.cloud.is_none() {
            entry.name = cloud.name.clone();
            entry.cloud = Some(cloud);
        } else {
            entry.cloud_clashes.push(cloud);
        }
    }

    for fs in fs_children {
        let k = key(case, &fs.name);
        let entry = rows.entry(k).or_insert_with(|| Triplet {
            name: fs.name.clone(),
            ..Default::default()
        });
        if entry.fs.is_none() {
            if entry.cloud.is_none() {
                entry.name = fs.name.clone();
            }
            entry.fs = Some(fs);
        } else {
            entry.fs_clashes.push(fs);
        }
    }

    for child in cache.children(parent) {
        if let Some(node) = cache.get(child) {
            let k = key(case, &node.local_name);
            let entry = rows.entry(k).or_insert_with(|| Triplet {
                name: node.local_name.clone(),
                ..Default::default()
            });
            entry.sync = Some(child);
        }
    }

    rows.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_cache::NodeKind;

    #[test]
    fn merges_matching_names_across_all_three_sides() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let sync_child = cache.insert_child(root, "a.txt".into(), NodeKind::File).unwrap();

        let cloud = vec![CloudNode {
            handle: 1,
            parent_handle: None,
            kind: NodeKind::File,
            name: "a.txt".into(),
            fingerprint: None,
        }];
        let fs = vec![FsNode {
            name: "a.txt".into(),
            short_name: None,
            kind: treesync_scan::FsNodeKind::File,
            fsid: Some(1),
            fingerprint: None,
            blocked: false,
        }];

        let rows = build_rows(&cache, root, cloud, fs, CaseSensitivity::Sensitive);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.cloud.is_some());
        assert_eq!(row.sync, Some(sync_child));
        assert!(row.fs.is_some());
    }

    #[test]
    fn duplicate_cloud_name_becomes_a_clash() {
        let cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let cloud = vec![
            CloudNode {
                handle: 1,
                parent_handle: None,
                kind: NodeKind::File,
                name: "a.txt".into(),
                fingerprint: None,
            },
            CloudNode {
                handle: 2,
                parent_handle: None,
                kind: NodeKind::File,
                name: "a.txt".into(),
                fingerprint: None,
            },
        ];
        let rows = build_rows(&cache, root, cloud, Vec::new(), CaseSensitivity::Sensitive);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cloud_clashes.len(), 1);
    }

    #[test]
    fn case_insensitive_merge_folds_the_key() {
        let cache = Cache::new(CaseSensitivity::Insensitive);
        let root = cache.root();
        let cloud = vec![CloudNode {
            handle: 1,
            parent_handle: None,
            kind: NodeKind::File,
            name: "Report.TXT".into(),
            fingerprint: None,
        }];
        let fs = vec![FsNode {
            name: "report.txt".into(),
            short_name: None,
            kind: treesync_scan::FsNodeKind::File,
            fsid: Some(1),
            fingerprint: None,
            blocked: false,
        }];
        let rows = build_rows(&cache, root, cloud, fs, CaseSensitivity::Insensitive);
        assert_eq!(rows.len(), 1);
    }
}
