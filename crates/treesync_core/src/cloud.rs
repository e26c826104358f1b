//! The cloud-side view of the tree and the trait boundary to the network
//! client. The client's own RPC plumbing, retry policy, and transfer
//! pipeline are an explicit non-goal; this crate only consumes the
//! operations it needs.

use std::path::Path;

use treesync_cache::NodeKind;
use treesync_scan::Fingerprint;

/// A snapshot of one cloud-side entry, as last reported by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudNode {
    pub handle: u64,
    pub parent_handle: Option<u64>,
    pub kind: NodeKind,
    pub name: String,
    pub fingerprint: Option<Fingerprint>,
}

/// The operations the reconciler needs from the cloud RPC/transfer client.
/// A production implementation dispatches these asynchronously and
/// delivers completions as messages on the orchestrator's inbox (see the
/// concurrency model); this trait presents them as ordinary blocking calls
/// so the reconciler's control flow reads top-to-bottom and a test double
/// can implement it trivially. The blocking is the client's to absorb, not
/// the reconciler's concern.
pub trait NetworkClient {
    fn lookup_cloud_node(&self, handle: u64) -> Option<CloudNode>;
    fn lookup_cloud_children(&self, parent: u64) -> Vec<CloudNode>;
    fn move_node(&mut self, from: u64, to_parent: u64, new_name: &str) -> Result<(), String>;
    fn set_name(&mut self, handle: u64, name: &str) -> Result<(), String>;
    fn move_to_debris(&mut self, handle: u64, in_share: bool) -> Result<(), String>;
    fn start_upload(
        &mut self,
        local_path: &Path,
        parent_handle: u64,
        name: &str,
        fingerprint: Fingerprint,
    ) -> Result<u64, String>;
    fn start_download(&mut self, handle: u64, staging_path: &Path) -> Result<(), String>;
}
