//! The JSON schema persisted inside the encrypted envelope.

use serde::{Deserialize, Serialize};

/// Top-level persisted document: `{ "sy": [ <entry>* ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub sy: Vec<Entry>,
}

/// One configured sync. Field names are deliberately short, stable keys —
/// this is a wire/disk format, not a Rust API, so it is versioned by
/// convention rather than renamed when the in-memory model changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    /// Stable identifier for this sync.
    pub id: String,
    /// Source (local) path, base64-encoded.
    pub sp: String,
    /// Display name, base64-encoded.
    pub n: String,
    /// Target (remote) path, base64-encoded.
    pub tp: String,
    /// Last-known local fingerprint of the sync root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fp: Option<Fingerprint>,
    /// Target cloud handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub th: Option<u64>,
    /// Last error code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le: Option<String>,
    /// Last warning code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lw: Option<String>,
    /// Sync type (two-way, up-only, backup, ...), stored as a small string
    /// tag rather than an enum so unknown future types round-trip losslessly.
    pub st: String,
    /// Whether the sync is currently enabled.
    pub en: bool,
    /// Backup substate (`none` / `mirror` / `monitor`), present only for
    /// backup-type syncs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bs: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime: i64,
    pub checksum: [u32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let doc = Document {
            sy: vec![Entry {
                id: "sync-1".into(),
                sp: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "/home/me"),
                n: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "My Sync"),
                tp: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "/Cloud"),
                fp: Some(Fingerprint {
                    size: 10,
                    mtime: 1234,
                    checksum: [1, 2, 3, 4],
                }),
                th: Some(99),
                le: None,
                lw: None,
                st: "two-way".into(),
                en: true,
                bs: None,
            }],
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
