//! Remote (cloud-side) path values: always UTF-8, always forward-slash,
//! always compared case-insensitively to match cloud semantics.

use std::fmt;

use crate::{fold_case, ComponentCursor};

/// Borrowed view of a remote path.
#[derive(Debug, Clone, Copy)]
pub struct RemotePath<'a>(&'a str);

impl<'a> RemotePath<'a> {
    pub fn new(s: &'a str) -> Self {
        Self(s.trim_end_matches('/'))
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    pub fn to_owned_buf(&self) -> RemotePathBuf {
        RemotePathBuf(self.0.to_string())
    }
}

/// Owned remote path: a `/`-joined sequence of UTF-8 segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RemotePathBuf(String);

impl RemotePathBuf {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.trim_end_matches('/').to_string())
    }

    pub fn as_remote_path(&self) -> RemotePath<'_> {
        RemotePath(&self.0)
    }

    /// Appends a single path component with a `/` separator.
    pub fn join(&self, component: &str) -> RemotePathBuf {
        if self.0.is_empty() {
            RemotePathBuf(component.to_string())
        } else {
            RemotePathBuf(format!("{}/{}", self.0, component))
        }
    }

    pub fn leaf(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    pub fn components(&self) -> ComponentCursor<'_> {
        ComponentCursor::new(&self.0, '/')
    }

    /// True if `self` is `other` or a remote ancestor of `other`. Always
    /// case-insensitive — the cloud folds case on local-side keys.
    pub fn is_prefix_of(&self, other: &RemotePathBuf) -> bool {
        let mut mine = self.components();
        let mut theirs = other.components();
        loop {
            match (mine.next(), theirs.next()) {
                (None, _) => return true,
                (Some(_), None) => return false,
                (Some(a), Some(b)) => {
                    if fold_case(a) != fold_case(b) {
                        return false;
                    }
                }
            }
        }
    }

    pub fn names_equal(a: &str, b: &str) -> bool {
        fold_case(a) == fold_case(b)
    }

    pub fn to_display_string(&self) -> String {
        format!("/{}", self.0)
    }

    pub fn from_display_string(s: &str) -> Self {
        Self::from_str(s.trim_start_matches('/'))
    }
}

impl fmt::Display for RemotePathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leaf() {
        let root = RemotePathBuf::root();
        let docs = root.join("Docs");
        let file = docs.join("notes.txt");
        assert_eq!(file.to_display_string(), "/Docs/notes.txt");
        assert_eq!(file.leaf(), Some("notes.txt"));
    }

    #[test]
    fn prefix_is_case_insensitive() {
        let root = RemotePathBuf::from_str("Docs");
        let child = RemotePathBuf::from_str("docs/Notes.txt");
        assert!(root.is_prefix_of(&child));
    }

    #[test]
    fn round_trip_through_display_string() {
        let path = RemotePathBuf::from_str("a/b/c");
        let s = path.to_display_string();
        let back = RemotePathBuf::from_display_string(&s);
        assert_eq!(path, back);
    }
}
