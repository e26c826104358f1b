//! Encrypted, two-slot atomic sync-configuration store.
//!
//! The on-disk format is `<prefix>.0` / `<prefix>.1` under the sync's
//! `.treesyncbackup` directory, each holding AES-128-CBC/PKCS7 ciphertext of
//! the JSON document, followed by a 16-byte IV, followed by a 32-byte
//! HMAC-SHA-256 over `ciphertext || iv`. Reads try both slots, newest
//! modification time first, and accept the first one that verifies and
//! decrypts. Writes always target the slot that was *not* just read, then
//! remove the other — so a crash mid-write never leaves both slots bad.

mod crypto;
mod document;
mod store;

/// Name of the per-sync local debris directory (holds the two config slots
/// and other engine-owned scratch state). Never reconciled; filesystem
/// events under it are dropped before they reach the reconciler.
pub const DEBRIS_DIR_NAME: &str = ".treesyncbackup";

pub use crypto::{open, seal, EnvelopeError, Keys, KeysError};
pub use document::{Document, Entry};
pub use store::{ConfigStore, StoreError};
