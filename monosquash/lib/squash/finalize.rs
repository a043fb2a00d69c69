use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use getset::Getters;
use tokio::fs;

use crate::{
    archive::ArchiveCodec,
    config::{NameVersion, DEFAULT_LAYER_SCHEMA_VERSION},
    image::{LayerRecord, Repositories},
    utils::{
        self, LAYER_JSON_FILENAME, LAYER_TAR_FILENAME, LAYER_VERSION_FILENAME,
        REPOSITORIES_FILENAME,
    },
    SquashResult,
};

use super::{FlattenEvent, FlattenObserver, LayerIdGenerator, WorkingTree};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Turns a merged working tree into a one-layer image tree.
pub struct ImageFinalizer<'a> {
    codec: &'a dyn ArchiveCodec,
    id_generator: &'a dyn LayerIdGenerator,
    observer: &'a dyn FlattenObserver,
}

/// The layer produced by a flatten.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MergedLayer {
    /// The new layer id.
    id: String,

    /// The metadata record written for it.
    record: LayerRecord,

    /// `<output_dir>/<id>`.
    layer_dir: PathBuf,

    /// Total bytes of regular files in the layer.
    size: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> ImageFinalizer<'a> {
    /// Creates a finalizer.
    pub fn new(
        codec: &'a dyn ArchiveCodec,
        id_generator: &'a dyn LayerIdGenerator,
        observer: &'a dyn FlattenObserver,
    ) -> Self {
        Self {
            codec,
            id_generator,
            observer,
        }
    }

    /// Writes the image tree at `output_dir`:
    ///
    /// ```text
    /// <output_dir>/
    /// ├── repositories        {"<name>": {"<version>": "<id>"}}
    /// └── <id>/
    ///     ├── json            leaf record without parent and container
    ///     ├── layer.tar       the packed working tree
    ///     └── VERSION         "1.0"
    /// ```
    ///
    /// `leaf` is the record of the chain's top layer. Its unknown fields carry over; `id`, `Size`
    /// and `created` are replaced. `output_dir` is emptied first.
    pub async fn finalize(
        &self,
        tree: &WorkingTree,
        leaf: LayerRecord,
        name_version: &NameVersion,
        output_dir: impl AsRef<Path>,
    ) -> SquashResult<MergedLayer> {
        let output_dir = output_dir.as_ref();

        let root = tree.get_root().clone();
        let size = tokio::task::spawn_blocking(move || utils::regular_files_size(root)).await??;
        self.observer.on_event(&FlattenEvent::SizeComputed { bytes: size });

        utils::init_empty_dir(output_dir).await?;

        // Pack first, the content digest strategy needs the archive before the id exists
        let staged_archive = output_dir.join(LAYER_TAR_FILENAME);
        self.observer.on_event(&FlattenEvent::PackingLayer {
            archive: staged_archive.clone(),
        });
        self.codec.pack(tree.get_root(), &staged_archive).await?;

        let id = self.id_generator.generate(&staged_archive).await?;
        self.observer
            .on_event(&FlattenEvent::LayerIdMinted { id: id.clone() });

        let layer_dir = output_dir.join(&id);
        fs::create_dir_all(&layer_dir).await?;
        fs::rename(&staged_archive, layer_dir.join(LAYER_TAR_FILENAME)).await?;

        let record = rewrite_record(leaf, &id, size);
        record.save(layer_dir.join(LAYER_JSON_FILENAME)).await?;
        fs::write(
            layer_dir.join(LAYER_VERSION_FILENAME),
            DEFAULT_LAYER_SCHEMA_VERSION,
        )
        .await?;

        Repositories::single(name_version, &id)
            .save(output_dir.join(REPOSITORIES_FILENAME))
            .await?;

        Ok(MergedLayer {
            id,
            record,
            layer_dir,
            size,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn rewrite_record(mut record: LayerRecord, id: &str, size: u64) -> LayerRecord {
    record.id = id.to_string();
    record.parent = None;
    record.container = None;
    record.size = Some(size);
    record.created = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true));
    record
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
