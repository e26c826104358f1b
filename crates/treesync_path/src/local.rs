//! Local, platform-native path values.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{fold_case, ComponentCursor};

/// Declares how two local names should be compared for equality, as
/// reported by the filesystem type the sync root lives on (e.g. APFS
/// case-insensitive, ext4 case-sensitive, exFAT case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

/// An owned local path paired with the case policy of the filesystem it
/// was observed on. Two `LocalPathBuf`s are compared under their own
/// declared policy — there is no global answer to "are these names equal"
/// without knowing which filesystem they came from.
#[derive(Debug, Clone)]
pub struct LocalPathBuf {
    inner: PathBuf,
    case: CaseSensitivity,
}

impl LocalPathBuf {
    pub fn new(inner: impl Into<PathBuf>, case: CaseSensitivity) -> Self {
        Self {
            inner: inner.into(),
            case,
        }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    pub fn as_path(&self) -> &Path {
        &self.inner
    }

    pub fn as_local_path(&self) -> LocalPath<'_> {
        LocalPath {
            inner: &self.inner,
            case: self.case,
        }
    }

    /// Appends a single path component, inserting the platform separator.
    pub fn join(&self, component: &str) -> LocalPathBuf {
        LocalPathBuf {
            inner: self.inner.join(component),
            case: self.case,
        }
    }

    /// The final path component, if any (e.g. the entry name shown in a
    /// directory listing).
    pub fn leaf(&self) -> Option<&str> {
        self.inner.file_name().and_then(|n| n.to_str())
    }

    pub fn components(&self) -> ComponentCursor<'_> {
        // `to_str` is lossy-free here because sync roots are required to be
        // representable as UTF-8 display strings; non-UTF-8 components are
        // surfaced as scan blocks upstream, not path-cursor panics.
        ComponentCursor::new(self.inner.to_str().unwrap_or(""), std::path::MAIN_SEPARATOR)
    }

    /// True if `self` is `other` or a descendant of `other`.
    pub fn is_prefix_of(&self, other: &LocalPathBuf) -> bool {
        let mut mine = self.components();
        let mut theirs = other.components();
        loop {
            match (mine.next(), theirs.next()) {
                (None, _) => return true,
                (Some(_), None) => return false,
                (Some(a), Some(b)) => {
                    if !self.names_equal(a, b) {
                        return false;
                    }
                }
            }
        }
    }

    pub fn names_equal(&self, a: &str, b: &str) -> bool {
        match self.case {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => fold_case(a) == fold_case(b),
        }
    }

    /// Round-trips to a display string using the platform's native form.
    pub fn to_display_string(&self) -> String {
        self.inner.display().to_string()
    }

    /// Parses a display string back into a `LocalPathBuf` under the given
    /// case policy.
    pub fn from_display_string(s: &str, case: CaseSensitivity) -> Self {
        Self::new(PathBuf::from(s), case)
    }
}

impl fmt::Display for LocalPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Borrowed counterpart of [`LocalPathBuf`].
#[derive(Debug, Clone, Copy)]
pub struct LocalPath<'a> {
    inner: &'a Path,
    case: CaseSensitivity,
}

impl<'a> LocalPath<'a> {
    pub fn as_path(&self) -> &'a Path {
        self.inner
    }

    pub fn to_owned_buf(&self) -> LocalPathBuf {
        LocalPathBuf::new(self.inner.to_path_buf(), self.case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str, case: CaseSensitivity) -> LocalPathBuf {
        LocalPathBuf::new(PathBuf::from(s), case)
    }

    #[test]
    fn prefix_containment_respects_case_policy() {
        let root = p("/sync/root", CaseSensitivity::Insensitive);
        let child = p("/sync/root/Docs/Notes.txt", CaseSensitivity::Insensitive);
        assert!(root.is_prefix_of(&child));

        let root_cs = p("/sync/root", CaseSensitivity::Sensitive);
        let child_cs = p("/SYNC/root/file", CaseSensitivity::Sensitive);
        assert!(!root_cs.is_prefix_of(&child_cs));
    }

    #[test]
    fn leaf_extracts_final_component() {
        let path = p("/a/b/c.txt", CaseSensitivity::Sensitive);
        assert_eq!(path.leaf(), Some("c.txt"));
    }

    #[test]
    fn round_trip_through_display_string() {
        let path = p("/a/b/c", CaseSensitivity::Sensitive);
        let s = path.to_display_string();
        let back = LocalPathBuf::from_display_string(&s, CaseSensitivity::Sensitive);
        assert_eq!(path.to_display_string(), back.to_display_string());
    }
}
