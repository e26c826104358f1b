//! Turns raw notification events into `scanAgain` marks on the sync-node
//! tree, absorbing self-inflicted events and debouncing bursty network
//! shares.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;
use treesync_cache::{Cache, PropagationState, SyncNodeId};
use treesync_config::DEBRIS_DIR_NAME;

use crate::event::{NotifyEvent, ScanRequirement};

const NETWORK_DEBOUNCE: Duration = Duration::from_secs(15);

struct NetworkBucket {
    events: Vec<NotifyEvent>,
    last_seen: Instant,
}

/// Consumes [`NotifyEvent`]s and applies them to a [`Cache`].
pub struct Coalescer {
    /// Per-node count of events a sync-originated write is still expected
    /// to produce; consumed silently instead of marking `scanAgain`.
    self_notify_counts: HashMap<SyncNodeId, u32>,
    /// Events from a network-share anchor, buffered until the anchor has
    /// been quiet for [`NETWORK_DEBOUNCE`].
    network_pending: HashMap<SyncNodeId, NetworkBucket>,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            self_notify_counts: HashMap::new(),
            network_pending: HashMap::new(),
        }
    }

    /// Registers that a sync-originated write to `node` will itself
    /// produce `count` notification events (e.g. one for create, one for
    /// the content write) that should not be mistaken for an external
    /// change.
    pub fn expect_self_notification(&mut self, node: SyncNodeId, count: u32) {
        *self.self_notify_counts.entry(node).or_insert(0) += count;
    }

    /// Feeds one event. Local events are applied immediately; network-
    /// share events are buffered for the debounce window.
    pub fn ingest(&mut self, cache: &mut Cache, event: NotifyEvent) {
        if under_debris_dir(&event.relative_path) {
            return;
        }
        if event.network_share {
            let bucket = self
                .network_pending
                .entry(event.anchor)
                .or_insert_with(|| NetworkBucket {
                    events: Vec::new(),
                    last_seen: Instant::now(),
                });
            bucket.last_seen = Instant::now();
            bucket.events.push(event);
            return;
        }
        self.apply(cache, event);
    }

    /// Applies any network-share buckets that have gone quiet long enough.
    /// Meant to be called once per orchestrator tick.
    pub fn flush_quiet_network_buckets(&mut self, cache: &mut Cache) {
        let now = Instant::now();
        let ready: Vec<SyncNodeId> = self
            .network_pending
            .iter()
            .filter(|(_, bucket)| now.duration_since(bucket.last_seen) >= NETWORK_DEBOUNCE)
            .map(|(anchor, _)| *anchor)
            .collect();
        for anchor in ready {
            if let Some(bucket) = self.network_pending.remove(&anchor) {
                for event in bucket.events {
                    self.apply(cache, event);
                }
            }
        }
    }

    fn apply(&mut self, cache: &mut Cache, event: NotifyEvent) {
        let (deepest, exact) = cache.resolve_descendant(event.anchor, &event.relative_path);

        if exact && event.requirement == ScanRequirement::SelfOnly {
            if let Some(count) = self.self_notify_counts.get_mut(&deepest) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        self.self_notify_counts.remove(&deepest);
                    }
                    trace!(?deepest, "absorbed self-notification");
                    return;
                }
            }
        }

        let level = if exact {
            PropagationState::Here
        } else {
            PropagationState::HereAndBelow
        };
        if let Some(node) = cache.get_mut(deepest) {
            node.flags.scan_again = node.flags.scan_again.join(level);
        }
        cache.propagate_up(deepest);
    }
}

fn under_debris_dir(relative_path: &[String]) -> bool {
    relative_path.first().is_some_and(|first| first == DEBRIS_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_cache::NodeKind;
    use treesync_path::CaseSensitivity;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_marks_here() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let file = cache.insert_child(root, "a.txt".into(), NodeKind::File).unwrap();

        let mut coalescer = Coalescer::new();
        coalescer.ingest(
            &mut cache,
            NotifyEvent {
                anchor: root,
                relative_path: path(&["a.txt"]),
                requirement: ScanRequirement::SelfOnly,
                network_share: false,
            },
        );

        assert_eq!(cache.get(file).unwrap().flags.scan_again, PropagationState::Here);
    }

    #[test]
    fn missing_descendant_marks_nearest_ancestor_here_and_below() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let dir = cache.insert_child(root, "dir".into(), NodeKind::Folder).unwrap();

        let mut coalescer = Coalescer::new();
        coalescer.ingest(
            &mut cache,
            NotifyEvent {
                anchor: root,
                relative_path: path(&["dir", "new.txt"]),
                requirement: ScanRequirement::SelfOnly,
                network_share: false,
            },
        );

        assert_eq!(
            cache.get(dir).unwrap().flags.scan_again,
            PropagationState::HereAndBelow
        );
    }

    #[test]
    fn self_notification_is_absorbed_without_marking_scan_again() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let file = cache.insert_child(root, "a.txt".into(), NodeKind::File).unwrap();

        let mut coalescer = Coalescer::new();
        coalescer.expect_self_notification(file, 1);
        coalescer.ingest(
            &mut cache,
            NotifyEvent {
                anchor: root,
                relative_path: path(&["a.txt"]),
                requirement: ScanRequirement::SelfOnly,
                network_share: false,
            },
        );

        assert_eq!(cache.get(file).unwrap().flags.scan_again, PropagationState::Resolved);
    }

    #[test]
    fn events_under_debris_dir_are_dropped() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();

        let mut coalescer = Coalescer::new();
        coalescer.ingest(
            &mut cache,
            NotifyEvent {
                anchor: root,
                relative_path: path(&[DEBRIS_DIR_NAME, "config.0"]),
                requirement: ScanRequirement::SelfOnly,
                network_share: false,
            },
        );

        assert_eq!(cache.get(root).unwrap().flags.scan_again, PropagationState::Resolved);
    }

    #[test]
    fn network_share_events_wait_for_the_debounce_window() {
        let mut cache = Cache::new(CaseSensitivity::Sensitive);
        let root = cache.root();
        let file = cache.insert_child(root, "a.txt".into(), NodeKind::File).unwrap();

        let mut coalescer = Coalescer::new();
        coalescer.ingest(
            &mut cache,
            NotifyEvent {
                anchor: root,
                relative_path: path(&["a.txt"]),
                requirement: ScanRequirement::SelfOnly,
                network_share: true,
            },
        );
        assert_eq!(cache.get(file).unwrap().flags.scan_again, PropagationState::Resolved);

        coalescer.flush_quiet_network_buckets(&mut cache);
        assert_eq!(cache.get(file).unwrap().flags.scan_again, PropagationState::Resolved);
    }
}
