use std::path::PathBuf;

use crate::image::LayerChain;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A progress notification emitted while flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenEvent {
    /// The input archive is being unpacked.
    UnpackingImage {
        /// The input archive.
        archive: PathBuf,

        /// Where it is unpacked.
        dest: PathBuf,
    },

    /// The layer order has been worked out.
    ChainResolved {
        /// The layers, root first.
        chain: LayerChain,
    },

    /// A layer is about to be extracted onto the working tree.
    ApplyingLayer {
        /// Zero-based position in the chain.
        index: usize,

        /// Number of layers in the chain.
        total: usize,

        /// The layer id.
        layer: String,
    },

    /// A regular whiteout marker was consumed.
    WhiteoutApplied {
        /// The marker, relative to the working tree.
        marker: PathBuf,

        /// Whether the path it names existed and was removed.
        removed: bool,
    },

    /// An opaque whiteout marker was consumed.
    OpaqueWhiteoutApplied {
        /// The directory it applies to, relative to the working tree.
        dir: PathBuf,

        /// Number of lower-layer entries removed from it.
        removed: usize,
    },

    /// A layer has been fully applied.
    LayerApplied {
        /// The layer id.
        layer: String,
    },

    /// The merged filesystem size has been computed.
    SizeComputed {
        /// Total bytes of regular files.
        bytes: u64,
    },

    /// The merged working tree is being packed into the new layer archive.
    PackingLayer {
        /// The archive being written.
        archive: PathBuf,
    },

    /// The new layer id has been minted.
    LayerIdMinted {
        /// The id.
        id: String,
    },

    /// The output image tree is being packed into the final archive.
    PackingImage {
        /// The archive being written.
        archive: PathBuf,
    },

    /// The scratch directory is being removed.
    CleaningUp {
        /// The scratch directory.
        dir: PathBuf,
    },

    /// The flattened image is complete.
    Finished {
        /// The new layer id.
        id: String,

        /// The final output location.
        output: PathBuf,
    },
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Receives progress notifications from the flattening pipeline.
pub trait FlattenObserver: Send + Sync {
    /// Called for every event, in pipeline order.
    fn on_event(&self, event: &FlattenEvent);
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FlattenObserver for TracingObserver {
    fn on_event(&self, event: &FlattenEvent) {
        match event {
            FlattenEvent::UnpackingImage { archive, dest } => {
                tracing::info!("Unpacking image {} into {}", archive.display(), dest.display())
            }
            FlattenEvent::ChainResolved { chain } => {
                tracing::info!("Computed layer chain order ({} layers)", chain.len());
                for layer in chain.iter() {
                    tracing::info!("  {}", layer);
                }
            }
            FlattenEvent::ApplyingLayer {
                index,
                total,
                layer,
            } => tracing::info!("Writing layer {}/{}: {}", index + 1, total, layer),
            FlattenEvent::WhiteoutApplied { marker, removed } => {
                tracing::debug!("Whiteout {} (removed: {})", marker.display(), removed)
            }
            FlattenEvent::OpaqueWhiteoutApplied { dir, removed } => {
                tracing::debug!(
                    "Opaque whiteout on {} removed {} entries",
                    dir.display(),
                    removed
                )
            }
            FlattenEvent::LayerApplied { layer } => tracing::debug!("Applied layer {}", layer),
            FlattenEvent::SizeComputed { bytes } => {
                tracing::info!("Filesystem data size: {} bytes", bytes)
            }
            FlattenEvent::PackingLayer { archive } => {
                tracing::info!("Packing combined layers into {}", archive.display())
            }
            FlattenEvent::LayerIdMinted { id } => tracing::info!("New layer id: {}", id),
            FlattenEvent::PackingImage { archive } => {
                tracing::info!("Packing final image into {}", archive.display())
            }
            FlattenEvent::CleaningUp { dir } => tracing::info!("Cleaning up {}", dir.display()),
            FlattenEvent::Finished { id, output } => {
                tracing::info!("Flattened image {} written to {}", id, output.display())
            }
        }
    }
}

impl FlattenObserver for NoopObserver {
    fn on_event(&self, _event: &FlattenEvent) {}
}
