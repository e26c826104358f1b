//! Two-slot atomic read/write of the encrypted [`Document`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::crypto::{self, Keys};
use crate::document::Document;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no readable config slot found")]
    NoValidSlot,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads/writes the encrypted two-slot config for one sync-config
/// directory (`<drive-root>/.treesyncbackup/`).
pub struct ConfigStore {
    dir: PathBuf,
    keys: Keys,
    /// The slot a read most recently came from, so the next write targets
    /// the other one.
    last_read_slot: Option<u8>,
}

impl ConfigStore {
    pub fn new(drive_root: &Path, keys: Keys) -> Self {
        Self {
            dir: drive_root.join(crate::DEBRIS_DIR_NAME),
            keys,
            last_read_slot: None,
        }
    }

    fn slot_path(&self, slot: u8) -> PathBuf {
        self.dir.join(format!("{}.{}", self.keys.filename_tag_hex(), slot))
    }

    /// Loads both slots, newest modification time first (ties broken by
    /// higher slot index), and returns the first one that verifies and
    /// deserializes.
    pub fn load(&mut self) -> Result<Document, StoreError> {
        let mut candidates: Vec<(u8, SystemTime)> = Vec::new();
        for slot in [0u8, 1u8] {
            if let Ok(metadata) = fs::metadata(self.slot_path(slot)) {
                let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                candidates.push((slot, mtime));
            }
        }
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

        for (slot, _) in &candidates {
            match self.try_read_slot(*slot) {
                Ok(doc) => {
                    self.last_read_slot = Some(*slot);
                    return Ok(doc);
                }
                Err(err) => {
                    warn!(slot, error = %err, "config slot failed to verify, trying next");
                }
            }
        }
        Err(StoreError::NoValidSlot)
    }

    fn try_read_slot(&self, slot: u8) -> Result<Document, String> {
        let bytes = fs::read(self.slot_path(slot)).map_err(|e| e.to_string())?;
        let plaintext = crypto::open(&bytes, &self.keys).map_err(|e| e.to_string())?;
        serde_json::from_slice(&plaintext).map_err(|e| e.to_string())
    }

    /// Writes `doc` to the slot other than the one most recently read,
    /// then removes the other slot. If nothing has been read yet (first
    /// write ever), targets slot 0.
    pub fn store(&mut self, doc: &Document) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let target_slot = match self.last_read_slot {
            Some(0) => 1,
            Some(_) => 0,
            None => 0,
        };
        let other_slot = 1 - target_slot;

        let plaintext = serde_json::to_vec(doc)?;
        let envelope = crypto::seal(&plaintext, &self.keys);
        fs::write(self.slot_path(target_slot), &envelope)?;

        // Only now remove the previous slot — if the process crashes
        // between the write above and this remove, both slots still exist
        // and the next load() call simply picks the one it just wrote.
        let _ = fs::remove_file(self.slot_path(other_slot));

        info!(slot = target_slot, "config store flushed");
        self.last_read_slot = Some(target_slot);
        Ok(())
    }
}
