//! Build sandbox lifecycle
//!
//! The sandbox (`masterdir`) is the ephemeral root the build tool works in.
//! Only one may exist at a time. [`SandboxManager::create`] hands out an
//! owned [`Sandbox`] handle; the root is destroyed when the handle is
//! removed or dropped, so every exit path of its owner releases it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::defaults::{SANDBOX_DIR, SANDBOX_MARKER};
use crate::error::SandboxError;
use crate::infra::mount::{MountBackend, MountKind};
use crate::infra::xbps_src::BuildTool;

/// Creates and tracks the single build sandbox of a package collection
#[derive(Debug, Clone)]
pub struct SandboxManager {
    tool: BuildTool,
    backend: Arc<dyn MountBackend>,
    active: Arc<AtomicBool>,
}

impl SandboxManager {
    /// Create a manager for the collection the build tool runs in
    pub fn new(tool: BuildTool, backend: Arc<dyn MountBackend>) -> Self {
        Self {
            tool,
            backend,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Location of the sandbox root
    pub fn path(&self) -> PathBuf {
        self.tool.collection().join(SANDBOX_DIR)
    }

    /// Whether a sandbox handle is currently alive
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Create and bootstrap a sandbox for the host architecture
    ///
    /// Leftovers of an earlier run are removed first. If mounting or
    /// bootstrapping fails, the partial sandbox is removed before returning.
    pub async fn create(
        &self,
        kind: MountKind,
        size: Option<&str>,
    ) -> Result<Sandbox, SandboxError> {
        let path = self.path();
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(SandboxError::AlreadyActive { path });
        }

        let mut sandbox = Sandbox {
            path,
            kind,
            size: size.map(str::to_string),
            mounted: false,
            backend: Arc::clone(&self.backend),
            slot: Arc::clone(&self.active),
        };

        if sandbox.path.exists() {
            warn!("Removing stale sandbox at {}", sandbox.path.display());
            remove_root(self.backend.as_ref(), &sandbox.path)?;
        }

        debug!(
            "Creating {} sandbox at {} for {}",
            kind,
            sandbox.path.display(),
            self.tool.host_arch()
        );
        sandbox.prepare()?;
        self.tool.bootstrap().await?;
        Ok(sandbox)
    }

    /// Remove whatever sandbox root is on disk
    ///
    /// Succeeds when there is nothing to remove. Refuses while a handle is
    /// alive, as that handle owns the root.
    pub fn remove_stale(&self) -> Result<(), SandboxError> {
        let path = self.path();
        if self.is_active() {
            return Err(SandboxError::AlreadyActive { path });
        }
        remove_root(self.backend.as_ref(), &path)
    }
}

/// An acquired build sandbox
#[derive(Debug)]
pub struct Sandbox {
    path: PathBuf,
    kind: MountKind,
    size: Option<String>,
    mounted: bool,
    backend: Arc<dyn MountBackend>,
    slot: Arc<AtomicBool>,
}

impl Sandbox {
    /// Root directory of the sandbox
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the root holds a bootstrapped system
    pub fn is_bootstrapped(&self) -> bool {
        self.path.join(SANDBOX_MARKER).exists()
    }

    /// Create the root directory and mount its backing filesystem
    fn prepare(&mut self) -> Result<(), SandboxError> {
        std::fs::create_dir_all(&self.path).map_err(|e| SandboxError::Prepare {
            path: self.path.clone(),
            error: e.to_string(),
        })?;

        if self.kind.is_memory_backed() {
            self.backend
                .mount(self.kind, &self.path, self.size.as_deref())?;
            self.mounted = true;
        }
        Ok(())
    }

    /// Unmount and delete the root, keeping the handle
    fn release(&mut self) -> Result<(), SandboxError> {
        if self.mounted {
            self.backend.unmount(&self.path)?;
            self.mounted = false;
        }
        remove_dir(&self.path)
    }

    /// Recreate the root from scratch and bootstrap it again
    pub(crate) async fn rebuild(&mut self, tool: &BuildTool) -> Result<(), SandboxError> {
        self.release()?;
        self.prepare()?;
        tool.bootstrap().await?;
        Ok(())
    }

    /// Destroy the root after a failure, logging rather than returning errors
    pub fn teardown(&mut self) {
        if let Err(e) = self.release() {
            error!("Failed to clean up sandbox at {}: {e}", self.path.display());
        }
    }

    /// Destroy the sandbox
    pub fn remove(mut self) -> Result<(), SandboxError> {
        self.release()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.mounted || self.path.exists() {
            self.teardown();
        }
        self.slot.store(false, Ordering::SeqCst);
    }
}

/// Unmount `path` if something is mounted there, then delete it
fn remove_root(backend: &dyn MountBackend, path: &Path) -> Result<(), SandboxError> {
    if is_mount_point(path) {
        backend.unmount(path)?;
    }
    remove_dir(path)
}

fn remove_dir(path: &Path) -> Result<(), SandboxError> {
    // symlink_metadata so a dangling link still counts as present
    let removed = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return Ok(()),
    };
    removed.map_err(|e| SandboxError::Remove {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Whether `path` is on a different device than its parent
#[cfg(unix)]
fn is_mount_point(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(parent) = path.parent() else {
        return false;
    };
    match (std::fs::symlink_metadata(path), std::fs::metadata(parent)) {
        (Ok(own), Ok(up)) => own.is_dir() && own.dev() != up.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_mount_point(_path: &Path) -> bool {
    false
}
