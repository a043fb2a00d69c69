use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tar::{Archive, Builder, EntryType};
use walkdir::WalkDir;

use crate::{
    utils::{self, PermissionGuard},
    SquashError, SquashResult,
};

use super::ArchiveCodec;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// PAX record prefix under which extended attributes are stored.
const PAX_XATTR_PREFIX: &str = "SCHILY.xattr.";

/// Host SELinux label, never carried into the image.
const SELINUX_XATTR: &str = "security.selinux";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`ArchiveCodec`] for plain tar archives.
///
/// Gzip-compressed input (`docker save | gzip`) is detected and decompressed transparently.
/// Archives are always written uncompressed.
///
/// Extraction keeps modes and timestamps. Owners and extended attributes (file capabilities
/// among them) are restored too when running as root, which is the only case the kernel lets us
/// set them; packing records whatever owners and attributes the files carry on disk.
///
/// The blocking tar work runs on tokio's blocking pool. With a timeout set, an operation that runs
/// past it is told to stop and the call fails with [`SquashError::ArchiveTimeout`].
#[derive(Debug, Clone, Default)]
pub struct TarCodec {
    timeout: Option<Duration>,
}

/// Wraps the archive stream of a blocking operation and fails it once the operation is cancelled.
///
/// Every read and write checks the flag, so cancellation also interrupts the copy of a single large
/// entry.
struct Cancellable<'a, T> {
    inner: T,
    cancelled: &'a AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TarCodec {
    /// Creates a codec without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec that cancels any single operation running longer than `timeout`.
    ///
    /// The call returns as soon as the deadline passes. The blocking worker notices the
    /// cancellation at its next read from the archive or write to it, which happens every few
    /// kilobytes even inside a large entry. Whatever it had written to disk by then is left in
    /// place.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Runs `task` on the blocking pool, enforcing the configured deadline.
    async fn run_blocking<T, F>(&self, operation: String, task: F) -> SquashResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicBool) -> SquashResult<T> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = tokio::task::spawn_blocking(move || task(&*flag));

        let Some(timeout) = self.timeout else {
            return handle.await?;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                tracing::error!("{} timed out after {:?}, cancelling", operation, timeout);
                Err(SquashError::ArchiveTimeout { operation, timeout })
            }
        }
    }
}

impl<'a, T> Cancellable<'a, T> {
    fn new(inner: T, cancelled: &'a AtomicBool) -> Self {
        Self { inner, cancelled }
    }

    fn into_inner(self) -> T {
        self.inner
    }

    fn check(&self) -> io::Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(io::Error::other("operation cancelled"));
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: Read> Read for Cancellable<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<T: Write> Write for Cancellable<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[async_trait]
impl ArchiveCodec for TarCodec {
    async fn extract(&self, archive: &Path, dest: &Path) -> SquashResult<Vec<PathBuf>> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let operation = format!("extracting {}", archive.display());

        tracing::debug!("Extracting {} into {}", archive.display(), dest.display());
        self.run_blocking(operation, move |cancelled| {
            extract_blocking(&archive, &dest, cancelled)
        })
        .await
    }

    async fn pack(&self, src: &Path, archive: &Path) -> SquashResult<()> {
        let src = src.to_path_buf();
        let archive = archive.to_path_buf();
        let operation = format!("packing {}", src.display());

        tracing::debug!("Packing {} into {}", src.display(), archive.display());
        self.run_blocking(operation, move |cancelled| {
            pack_blocking(&src, &archive, cancelled)
        })
        .await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn extract_blocking(
    archive_path: &Path,
    dest: &Path,
    cancelled: &AtomicBool,
) -> SquashResult<Vec<PathBuf>> {
    let extract_error = |e: io::Error| {
        SquashError::ExternalTool(format!(
            "failed to extract {} into {}: {e}",
            archive_path.display(),
            dest.display()
        ))
    };

    fs::create_dir_all(dest)?;

    let as_root = running_as_root();
    let reader = Cancellable::new(
        open_archive(archive_path).map_err(extract_error)?,
        cancelled,
    );

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_preserve_ownerships(as_root);
    archive.set_unpack_xattrs(as_root);
    archive.set_overwrite(true);

    let mut written = Vec::new();
    let mut directories = Vec::new();
    let mut guard = PermissionGuard::new();

    for entry in archive.entries().map_err(extract_error)? {
        check_cancelled(cancelled, archive_path)?;

        let mut entry = entry.map_err(extract_error)?;
        let raw_path = entry.path().map_err(extract_error)?.into_owned();
        let Some(relative) = normalize_entry_path(&raw_path) else {
            tracing::warn!(
                "Skipping entry {} escaping the destination",
                raw_path.display()
            );
            continue;
        };

        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&relative);
        let entry_type = entry.header().entry_type();
        guard.make_parent_writable(dest, &target)?;
        clear_conflicting_entry(&target, entry_type)?;

        if entry_type.is_dir() {
            directories.push((relative, entry));
            continue;
        }

        if entry.unpack_in(dest).map_err(extract_error)? {
            written.push(relative);
        }
    }

    drop(guard);

    // Deepest first, so a directory's own mode is set after everything inside it.
    directories.sort_by(|(a, _), (b, _)| b.cmp(a));

    let mut guard = PermissionGuard::new();
    for (relative, mut entry) in directories {
        check_cancelled(cancelled, archive_path)?;

        let target = dest.join(&relative);
        guard.make_parent_writable(dest, &target)?;
        if entry.unpack_in(dest).map_err(extract_error)? {
            guard.forget(&target);
            written.push(relative);
        }
    }

    Ok(written)
}

fn pack_blocking(src: &Path, archive_path: &Path, cancelled: &AtomicBool) -> SquashResult<()> {
    let pack_error = |e: io::Error| {
        SquashError::ExternalTool(format!(
            "failed to pack {} into {}: {e}",
            src.display(),
            archive_path.display()
        ))
    };

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(archive_path).map_err(pack_error)?;
    let mut builder = Builder::new(Cancellable::new(BufWriter::new(file), cancelled));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        check_cancelled(cancelled, src)?;

        let entry = entry.map_err(|e| pack_error(e.into()))?;
        if entry.path() == archive_path {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(SquashError::custom)?;

        if !entry.path_is_symlink() {
            let xattrs = read_xattrs(entry.path());
            if !xattrs.is_empty() {
                let records = xattrs
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_slice()));
                builder.append_pax_extensions(records).map_err(pack_error)?;
            }
        }

        builder
            .append_path_with_name(entry.path(), relative)
            .map_err(pack_error)?;
    }

    let mut writer = builder.into_inner().map_err(pack_error)?.into_inner();
    writer.flush().map_err(pack_error)?;

    Ok(())
}

/// Opens an archive for reading, looking through gzip compression if present.
fn open_archive(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let mut reader = BufReader::new(File::open(path)?);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    if is_gzip {
        tracing::debug!("Detected gzip compression on {}", path.display());
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Strips `.` and root components from an entry path. Returns `None` if it climbs out with `..`.
fn normalize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }

    Some(normalized)
}

/// Makes room for an incoming entry whose kind differs from what is already at `target`.
///
/// A directory entry replaces a non-directory; any other entry replaces a directory.
fn clear_conflicting_entry(target: &Path, entry_type: EntryType) -> SquashResult<()> {
    let Ok(existing) = fs::symlink_metadata(target) else {
        return Ok(());
    };

    match (entry_type.is_dir(), existing.is_dir()) {
        (true, false) => {
            tracing::debug!("Replacing {} with a directory", target.display());
            fs::remove_file(target)?;
        }
        (false, true) => {
            tracing::debug!("Replacing directory {}", target.display());
            utils::remove_path_blocking(target)?;
        }
        _ => {}
    }

    Ok(())
}

/// Returns the extended attributes of `path` as PAX records. Unsupported filesystems yield none.
fn read_xattrs(path: &Path) -> Vec<(String, Vec<u8>)> {
    let Ok(names) = xattr::list(path) else {
        return Vec::new();
    };

    names
        .filter_map(|name| {
            let name = name.to_str()?.to_string();
            if name == SELINUX_XATTR {
                return None;
            }

            let value = xattr::get(path, &name).ok().flatten()?;
            Some((format!("{PAX_XATTR_PREFIX}{name}"), value))
        })
        .collect()
}

fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn check_cancelled(cancelled: &AtomicBool, path: &Path) -> SquashResult<()> {
    if cancelled.load(Ordering::SeqCst) {
        return Err(SquashError::ExternalTool(format!(
            "operation on {} was cancelled",
            path.display()
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
