//! Per-job scratch directories.
//!
//! Every conversion gets its own directory under the temp root, named so
//! that two jobs allocated in the same instant can never collide. Release
//! is idempotent and runs on drop, so the directory disappears on every
//! exit path: success, failure, or panic.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConvertError;

pub struct WorkspaceManager {
    root: PathBuf,
    seq: AtomicU64,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the scratch directory for one job, including any missing
    /// parents of the temp root itself.
    pub fn allocate(&self, job_id: &Uuid) -> Result<Workspace, ConvertError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let dir = self.root.join(scratch_dir_name(job_id, nanos, seq));

        // `in/` keeps caller-named inputs apart from derived outputs, so a
        // payload named like an intermediate file cannot clobber it.
        std::fs::create_dir_all(dir.join("in"))
            .map_err(|e| ConvertError::Staging(format!("failed to create workspace: {e}")))?;

        debug!("Allocated workspace {:?}", dir);
        Ok(Workspace {
            dir,
            released: AtomicBool::new(false),
        })
    }
}

/// Pure naming function: job id plus a high-resolution timestamp plus a
/// process-local monotonic counter. The counter alone keeps names unique
/// when two allocations land on the same timestamp.
fn scratch_dir_name(job_id: &Uuid, nanos: u128, seq: u64) -> String {
    format!("job-{job_id}-{nanos:x}-{seq}")
}

pub struct Workspace {
    dir: PathBuf,
    released: AtomicBool,
}

impl Workspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for staging a caller-supplied file. Only the final path
    /// component of `file_name` is used, so untrusted names cannot escape
    /// the workspace.
    pub fn stage_path(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        self.dir.join("in").join(name)
    }

    /// Remove the workspace and everything in it. Safe to call more than
    /// once; a workspace that already vanished is not an error.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Released workspace {:?}", self.dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release workspace {:?}: {}", self.dir, e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
