//! The scanner thread pool: a handful of workers shared across every sync,
//! pulling requests off a single queue.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::node::FsNode;
use crate::worker;

/// Result of one scan, delivered to whatever the caller passed as the
/// completion callback — the "waiter cookie" the orchestrator uses to wake
/// up when a scan it is waiting on finishes.
pub struct ScanOutcome {
    pub dir: PathBuf,
    pub entries: std::io::Result<Vec<FsNode>>,
}

/// One unit of scan work: a target directory, whether to follow symlinks,
/// the previously known children (for fingerprint reuse), and a completion
/// callback run on the worker thread once the scan finishes.
pub struct ScanRequest {
    pub dir: PathBuf,
    pub follow_symlinks: bool,
    pub prior_children: HashMap<String, FsNode>,
    pub on_complete: Box<dyn FnOnce(ScanOutcome) + Send>,
}

enum Job {
    Scan(ScanRequest),
    Shutdown,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
}

/// A small pool of worker threads shared across all syncs (default: one).
pub struct ScannerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ScannerPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        });

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("treesync-scan-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn scanner worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueues a scan request. Workers dequeue and process it, invoking
    /// `on_complete` when done.
    pub fn submit(&self, request: ScanRequest) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Job::Scan(request));
        self.shared.condvar.notify_one();
    }
}

impl Drop for ScannerPool {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            for _ in &self.workers {
                queue.push_back(Job::Shutdown);
            }
            self.shared.condvar.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            while queue.is_empty() {
                queue = shared.condvar.wait(queue).unwrap();
            }
            queue.pop_front().unwrap()
        };

        match job {
            Job::Shutdown => {
                debug!("scanner worker shutting down");
                return;
            }
            Job::Scan(request) => {
                let entries = worker::scan_directory(
                    &request.dir,
                    request.follow_symlinks,
                    &request.prior_children,
                );
                if let Err(ref err) = entries {
                    warn!(dir = %request.dir.display(), error = %err, "scan failed");
                }
                (request.on_complete)(ScanOutcome {
                    dir: request.dir,
                    entries,
                });
            }
        }
    }
}
