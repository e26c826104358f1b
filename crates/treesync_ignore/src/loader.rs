//! Loads a `.treesyncignore` file from disk, reloading only when its
//! content fingerprint (mtime + length) changes, and retaining the
//! previously loaded chain if a reload fails to parse.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::chain::FilterChain;
use crate::parse::parse_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    mtime: Option<SystemTime>,
    len: u64,
}

/// An ignore file that reloads itself on demand, keyed on a cheap
/// metadata fingerprint rather than re-parsing on every directory visit.
pub struct IgnoreFileLoader {
    path: PathBuf,
    fingerprint: Option<Fingerprint>,
    chain: FilterChain,
}

impl IgnoreFileLoader {
    pub fn new(directory: &Path) -> Self {
        Self {
            path: directory.join(".treesyncignore"),
            fingerprint: None,
            chain: FilterChain::empty(),
        }
    }

    /// Re-reads the file if it changed since the last successful load.
    /// Parse failures are logged and the previously loaded chain is kept.
    pub fn refresh(&mut self) {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => {
                // No ignore file: an empty chain, but only reset once —
                // don't thrash if it's absent every call.
                if self.fingerprint.is_some() {
                    self.fingerprint = None;
                    self.chain = FilterChain::empty();
                }
                return;
            }
        };
        let fingerprint = Fingerprint {
            mtime: metadata.modified().ok(),
            len: metadata.len(),
        };
        if Some(fingerprint) == self.fingerprint {
            return;
        }
        match fs::read_to_string(&self.path) {
            Ok(contents) => match parse_file(&contents) {
                Ok(directives) => {
                    self.chain = FilterChain::from_directives(directives);
                    self.fingerprint = Some(fingerprint);
                }
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "ignore file failed to parse, keeping previous chain");
                }
            },
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignore file failed to read, keeping previous chain");
            }
        }
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }
}
