//! Archive extraction and packing.
//!
//! The flattening engine never touches an archive format directly. It goes through
//! [`ArchiveCodec`], which [`TarCodec`] implements natively with the `tar` crate.

mod tar;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::SquashResult;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use self::tar::*;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Extracts archives into directories and packs directories into archives.
///
/// Both operations run to completion before returning. Failures surface as
/// [`SquashError::ExternalTool`](crate::SquashError::ExternalTool), or
/// [`SquashError::ArchiveTimeout`](crate::SquashError::ArchiveTimeout) when a deadline expires.
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Extracts `archive` on top of `dest`, creating `dest` if needed.
    ///
    /// Entries replace whatever already lives at their path, except that a directory entry merges
    /// into an existing directory. Modes, timestamps and, where the process may set them, owners
    /// and extended attributes are kept. Directory metadata is applied after everything else, so a
    /// read-only directory can still be filled by its own layer or by later ones.
    ///
    /// Returns the relative paths of the entries written. Non-directories come first, in archive
    /// order, followed by directories, deepest first.
    async fn extract(&self, archive: &Path, dest: &Path) -> SquashResult<Vec<PathBuf>>;

    /// Packs the contents of `src` into a new archive at `archive`, with entry names relative to
    /// `src`.
    async fn pack(&self, src: &Path, archive: &Path) -> SquashResult<()>;
}
