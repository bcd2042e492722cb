use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ExecutorError;

pub const SCRATCH_PREFIX: &str = "cwe-harness";

/// A per-execution working directory, removed when closed or dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    released: bool,
}

impl ScratchDir {
    pub async fn create(root: &Path) -> Result<Self, ExecutorError> {
        let scratch_err = |source| ExecutorError::Scratch { root: root.to_path_buf(), source };
        tokio::fs::create_dir_all(root).await.map_err(scratch_err)?;
        let path = root.join(scratch_name(std::process::id()));
        tokio::fs::create_dir(&path).await.map_err(scratch_err)?;
        // Canonical so `{workdir}` and argv[0] are stable absolute paths.
        let path = tokio::fs::canonicalize(&path).await.map_err(scratch_err)?;
        debug!(scratch = %path.display(), "Scratch directory created");
        Ok(Self { path, released: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting failure instead of swallowing it.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.released = true;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || remove_tree(&path))
            .await
            .map_err(std::io::Error::other)?
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_tree(&self.path) {
                warn!(scratch = %self.path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

pub fn scratch_name(pid: u32) -> String {
    format!("{}-{}-{}", SCRATCH_PREFIX, pid, Uuid::new_v4().simple())
}

/// Pid embedded in a scratch directory name.
pub fn owner_pid(name: &str) -> Option<i32> {
    name.strip_prefix(SCRATCH_PREFIX)?
        .strip_prefix('-')?
        .split('-')
        .next()?
        .parse()
        .ok()
}

fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // Exists but belongs to someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Remove scratch directories left behind by harness processes that no longer exist.
/// Returns how many were removed.
pub fn sweep_orphans(root: &Path) -> usize {
    let pattern = format!(
        "{}/{}-*",
        glob::Pattern::escape(&root.to_string_lossy()),
        SCRATCH_PREFIX
    );
    let entries = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Invalid orphan sweep pattern");
            return 0;
        }
    };

    let me = std::process::id() as i32;
    let mut removed = 0;
    for path in entries.flatten() {
        let Some(pid) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(owner_pid)
        else {
            continue;
        };
        if pid == me || process_alive(pid) || !path.is_dir() {
            continue;
        }
        match remove_tree(&path) {
            Ok(()) => {
                debug!(scratch = %path.display(), pid, "Removed orphaned scratch directory");
                removed += 1;
            }
            Err(e) => warn!(scratch = %path.display(), error = %e, "Failed to remove orphaned scratch directory"),
        }
    }
    if removed > 0 {
        info!(removed, root = %root.display(), "Swept orphaned scratch directories");
    }
    removed
}

/// `remove_dir_all`, retried once after restoring write permission on
/// directories an example may have locked down.
fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) => {
            make_writable_recursive(path);
            std::fs::remove_dir_all(path)
        }
    }
}

fn make_writable_recursive(path: &Path) {
    let Ok(md) = std::fs::symlink_metadata(path) else {
        return;
    };
    if md.file_type().is_dir() {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}
