//! A small shared pool of scanner worker threads that turn a directory
//! into typed [`FsNode`] entries. Workers block on file opens and
//! directory iteration; the orchestrator never does this I/O itself (see
//! the concurrency model) — it enqueues a [`ScanRequest`] and is notified
//! through the request's completion channel when the worker is done.

mod fingerprint;
mod node;
mod pool;
mod worker;

pub use fingerprint::Fingerprint;
pub use node::{FsNode, FsNodeKind};
pub use pool::{ScanOutcome, ScanRequest, ScannerPool};
