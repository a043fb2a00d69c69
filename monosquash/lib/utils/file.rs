use std::{
    fs::{self as std_fs, Permissions},
    io,
    os::unix::fs::PermissionsExt,
    path::Path,
};

use tokio::fs;
use walkdir::WalkDir;

use crate::SquashResult;

use super::PermissionGuard;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Deletes `path` if it exists and recreates it as an empty directory.
pub async fn init_empty_dir(path: impl AsRef<Path>) -> SquashResult<()> {
    let path = path.as_ref();
    if remove_path(path).await? {
        tracing::debug!("Cleared existing directory {}", path.display());
    }

    fs::create_dir_all(path).await?;
    Ok(())
}

/// Removes whatever lives at `path` without following symlinks.
///
/// Directories are removed with all their descendants. Returns `false` if nothing was there.
pub async fn remove_path(path: impl AsRef<Path>) -> SquashResult<bool> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || remove_path_blocking(&path)).await?
}

/// Blocking form of [`remove_path`].
///
/// Read-only directories do not stop the removal: the parent and every directory inside the
/// removed tree are opened up first, and the parent gets its mode back afterwards.
pub fn remove_path_blocking(path: impl AsRef<Path>) -> SquashResult<bool> {
    let path = path.as_ref();
    let metadata = match std_fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let mut guard = PermissionGuard::new();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        guard.make_writable(parent)?;
    }

    if metadata.is_dir() {
        open_dir_tree(path)?;
        std_fs::remove_dir_all(path)?;
    } else {
        std_fs::remove_file(path)?;
    }

    Ok(true)
}

/// Sums the byte lengths of all regular files under `root`.
///
/// Symlinks are not followed and contribute nothing.
pub fn regular_files_size(root: impl AsRef<Path>) -> SquashResult<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root.as_ref()).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }

    Ok(total)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Gives the owner full access to `dir` and every directory below it, top down.
fn open_dir_tree(dir: &Path) -> io::Result<()> {
    let mode = std_fs::symlink_metadata(dir)?.permissions().mode();
    if mode & 0o700 != 0o700 {
        std_fs::set_permissions(dir, Permissions::from_mode(mode | 0o700))?;
    }

    for entry in std_fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            open_dir_tree(&entry.path())?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
