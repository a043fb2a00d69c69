use std::{
    collections::HashSet,
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use getset::Getters;
use tokio::fs;
use walkdir::WalkDir;

use crate::{
    archive::ArchiveCodec,
    image::{layer_archive_path, LayerChain},
    utils::{self, WHITEOUT_OPAQUE, WHITEOUT_PREFIX},
    SquashError, SquashResult,
};

use super::{FlattenEvent, FlattenObserver};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Replays layer archives on top of each other into a single working tree.
pub struct LayerMerger<'a> {
    codec: &'a dyn ArchiveCodec,
    observer: &'a dyn FlattenObserver,
}

/// The filesystem state accumulated by a merge.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct WorkingTree {
    /// The directory holding the merged filesystem.
    root: PathBuf,

    /// Number of layers replayed into it.
    layers_applied: usize,

    /// Number of whiteout markers consumed, regular and opaque.
    whiteouts_applied: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl WorkingTree {
    /// Describes a tree at `root` that `layers_applied` layers were replayed into.
    pub fn new(root: PathBuf, layers_applied: usize, whiteouts_applied: usize) -> Self {
        Self {
            root,
            layers_applied,
            whiteouts_applied,
        }
    }
}

impl<'a> LayerMerger<'a> {
    /// Creates a merger extracting with `codec` and reporting to `observer`.
    pub fn new(codec: &'a dyn ArchiveCodec, observer: &'a dyn FlattenObserver) -> Self {
        Self { codec, observer }
    }

    /// Replays every layer of `chain`, root first, into `working_dir`.
    ///
    /// `working_dir` is emptied first. For each layer the archive is extracted in full, then the
    /// whiteout markers it brought are consumed:
    /// - `.wh..wh..opq` in directory `D` removes everything in `D` that this layer did not write.
    /// - `.wh.<name>` removes the sibling `<name>`, recursively if it is a directory. A missing
    ///   sibling is not an error.
    ///
    /// Markers are themselves removed, so the final tree holds none.
    pub async fn merge(
        &self,
        image_dir: impl AsRef<Path>,
        chain: &LayerChain,
        working_dir: impl AsRef<Path>,
    ) -> SquashResult<WorkingTree> {
        let image_dir = image_dir.as_ref();
        let root = working_dir.as_ref().to_path_buf();
        utils::init_empty_dir(&root).await?;

        let mut whiteouts_applied = 0;
        for (index, layer) in chain.iter().enumerate() {
            self.observer.on_event(&FlattenEvent::ApplyingLayer {
                index,
                total: chain.len(),
                layer: layer.clone(),
            });

            let archive = layer_archive_path(image_dir, layer);
            if !fs::try_exists(&archive).await? {
                return Err(SquashError::MalformedImage(format!(
                    "layer {layer} has no filesystem archive at {}",
                    archive.display()
                )));
            }

            let written = self.codec.extract(&archive, &root).await?;
            whiteouts_applied += self.apply_whiteouts(&root, &written).await?;

            self.observer.on_event(&FlattenEvent::LayerApplied {
                layer: layer.clone(),
            });
        }

        Ok(WorkingTree::new(root, chain.len(), whiteouts_applied))
    }

    /// Consumes every whiteout marker in the tree. `written` holds the paths the layer just
    /// extracted, relative to `root`.
    async fn apply_whiteouts(&self, root: &Path, written: &[PathBuf]) -> SquashResult<usize> {
        let markers = find_whiteouts(root).await?;
        let (opaque, regular): (Vec<_>, Vec<_>) = markers
            .into_iter()
            .partition(|marker| marker.file_name() == Some(OsStr::new(WHITEOUT_OPAQUE)));

        let written = written.iter().cloned().collect::<HashSet<_>>();
        let mut applied = 0;

        for marker in opaque {
            let Some(dir) = marker.parent() else {
                continue;
            };

            let removed = clear_opaque_dir(root, dir, &written).await?;
            utils::remove_path(&marker).await?;
            applied += 1;

            self.observer.on_event(&FlattenEvent::OpaqueWhiteoutApplied {
                dir: relative_to(root, dir),
                removed,
            });
        }

        for marker in regular {
            let Some(target) = whiteout_target(&marker) else {
                tracing::warn!("Ignoring whiteout marker {} with no target", marker.display());
                utils::remove_path(&marker).await?;
                continue;
            };

            utils::remove_path(&marker).await?;
            let removed = utils::remove_path(&target).await?;
            applied += 1;

            self.observer.on_event(&FlattenEvent::WhiteoutApplied {
                marker: relative_to(root, &marker),
                removed,
            });
        }

        Ok(applied)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Lists every path under `root` whose name starts with the whiteout prefix.
async fn find_whiteouts(root: &Path) -> SquashResult<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut markers = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if is_whiteout(entry.file_name()) {
                markers.push(entry.into_path());
            }
        }

        Ok(markers)
    })
    .await?
}

fn is_whiteout(name: &OsStr) -> bool {
    name.as_bytes().starts_with(WHITEOUT_PREFIX.as_bytes())
}

/// Returns the sibling a regular marker hides, or `None` for a bare `.wh.`.
fn whiteout_target(marker: &Path) -> Option<PathBuf> {
    let name = marker.file_name()?.as_bytes();
    let hidden = name.strip_prefix(WHITEOUT_PREFIX.as_bytes())?;
    if hidden.is_empty() {
        return None;
    }

    Some(marker.with_file_name(OsStr::from_bytes(hidden)))
}

/// Removes everything under `dir` that the current layer did not write.
///
/// Directories that are, or contain, entries of the current layer are kept and descended into.
/// Returns the number of entries removed.
async fn clear_opaque_dir(
    root: &Path,
    dir: &Path,
    written: &HashSet<PathBuf>,
) -> SquashResult<usize> {
    let mut removed = 0;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = relative_to(root, &path);

            let from_layer = written.contains(&relative);
            let holds_layer_entries = written
                .iter()
                .any(|w| w != &relative && w.starts_with(&relative));

            if from_layer || holds_layer_entries {
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                }
                continue;
            }

            utils::remove_path(&path).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
