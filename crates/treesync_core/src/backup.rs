//! Backup sync substate machine: `none` for a two-way sync, `mirror`/
//! `monitor` for a backup sync before and after its first clean pass.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackupSubstate {
    #[default]
    None,
    /// Local is authoritative; cloud divergence is silently overwritten.
    Mirror,
    /// A full pass has completed with nothing left to do; any further
    /// cloud-side divergence is now an error (`BackupModified`) rather
    /// than something to overwrite.
    Monitor,
}

impl BackupSubstate {
    pub fn is_backup(self) -> bool {
        matches!(self, BackupSubstate::Mirror | BackupSubstate::Monitor)
    }

    /// A backup sync in `mirror` is promoted to `monitor` once a pass
    /// completes with no remaining work. `none` and `monitor` are
    /// unaffected.
    pub fn promote_on_clean_pass(self) -> BackupSubstate {
        match self {
            BackupSubstate::Mirror => BackupSubstate::Monitor,
            other => other,
        }
    }

    /// Explicit user reset drops a backup sync back to `mirror`,
    /// re-authorizing local-overwrites-cloud behavior.
    pub fn reset(self) -> BackupSubstate {
        match self {
            BackupSubstate::Monitor | BackupSubstate::Mirror => BackupSubstate::Mirror,
            BackupSubstate::None => BackupSubstate::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_promotes_to_monitor_after_a_clean_pass() {
        assert_eq!(
            BackupSubstate::Mirror.promote_on_clean_pass(),
            BackupSubstate::Monitor
        );
    }

    #[test]
    fn monitor_and_none_are_unaffected_by_a_clean_pass() {
        assert_eq!(
            BackupSubstate::Monitor.promote_on_clean_pass(),
            BackupSubstate::Monitor
        );
        assert_eq!(BackupSubstate::None.promote_on_clean_pass(), BackupSubstate::None);
    }

    #[test]
    fn reset_returns_a_backup_sync_to_mirror() {
        assert_eq!(BackupSubstate::Monitor.reset(), BackupSubstate::Mirror);
    }
}
