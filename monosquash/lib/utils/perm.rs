use std::{
    collections::HashMap,
    fs::{self, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use getset::Getters;

use crate::SquashResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Temporarily opens up directories for writing and puts their modes back afterwards.
///
/// Layers may ship read-only directories (`0555`) that later layers still add to or white out of.
/// The guard records each directory's original mode before adding owner write and search bits, and
/// restores the recorded modes in reverse order when it is dropped.
#[derive(Debug, Default, Getters)]
#[getset(get = "pub with_prefix")]
pub struct PermissionGuard {
    /// Original modes of the paths this guard changed
    original_modes: HashMap<PathBuf, u32>,

    /// Changed paths, in the order they were changed
    modified_paths: Vec<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PermissionGuard {
    /// Creates a guard that tracks nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds owner write and search bits to `path` until the guard is dropped.
    ///
    /// Missing paths, anything that is not a directory and directories that are already writable
    /// are left alone.
    pub fn make_writable(&mut self, path: impl AsRef<Path>) -> SquashResult<()> {
        let path = path.as_ref();
        if self.original_modes.contains_key(path) {
            return Ok(());
        }

        let Ok(metadata) = fs::symlink_metadata(path) else {
            return Ok(());
        };

        if !metadata.is_dir() {
            return Ok(());
        }

        let mode = metadata.permissions().mode();
        let wx_mode = mode | 0o300;
        if wx_mode == mode {
            return Ok(());
        }

        fs::set_permissions(path, Permissions::from_mode(wx_mode))?;
        self.original_modes.insert(path.to_path_buf(), mode);
        self.modified_paths.push(path.to_path_buf());

        tracing::debug!(
            "Made {} writable ({:#o} -> {:#o})",
            path.display(),
            mode & 0o7777,
            wx_mode & 0o7777
        );

        Ok(())
    }

    /// Makes the closest existing ancestor of `path` writable, stopping at `root`.
    ///
    /// This is the directory a new entry at `path` gets created in, directly or through freshly
    /// created intermediate directories.
    pub fn make_parent_writable(
        &mut self,
        root: impl AsRef<Path>,
        path: impl AsRef<Path>,
    ) -> SquashResult<()> {
        let root = root.as_ref();
        let mut current = path.as_ref().parent();

        while let Some(dir) = current {
            if !dir.starts_with(root) {
                break;
            }

            if fs::symlink_metadata(dir).is_ok() {
                return self.make_writable(dir);
            }

            current = dir.parent();
        }

        Ok(())
    }

    /// Stops tracking `path`, so its current mode is kept when the guard is dropped.
    pub fn forget(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if self.original_modes.remove(path).is_some() {
            self.modified_paths.retain(|modified| modified != path);
        }
    }

    /// Puts back the recorded modes, most recent change first.
    fn restore_all(&mut self) -> SquashResult<()> {
        while let Some(path) = self.modified_paths.pop() {
            let Some(mode) = self.original_modes.remove(&path) else {
                continue;
            };

            // Deleted or replaced in the meantime
            let Ok(metadata) = fs::symlink_metadata(&path) else {
                continue;
            };

            if !metadata.is_dir() {
                continue;
            }

            fs::set_permissions(&path, Permissions::from_mode(mode))?;
            tracing::debug!("Restored {} to {:#o}", path.display(), mode & 0o7777);
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for PermissionGuard {
    fn drop(&mut self) {
        if !self.modified_paths.is_empty() {
            if let Err(e) = self.restore_all() {
                tracing::warn!("Failed to restore directory permissions: {}", e);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
