use std::path::Path;

use crate::{
    archive::ArchiveCodec, config::NameVersion, image::LayerRecord, SquashError, SquashResult,
};

use super::{
    FlattenObserver, ImageFinalizer, LayerChainResolver, LayerIdGenerator, LayerMerger, MergedLayer,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Flattens an unpacked image tree into a one-layer image tree.
///
/// Runs [`LayerChainResolver`], [`LayerMerger`] and [`ImageFinalizer`] in turn, sharing one codec,
/// one id generator and one observer between them.
pub struct Flattener<'a> {
    codec: &'a dyn ArchiveCodec,
    id_generator: &'a dyn LayerIdGenerator,
    observer: &'a dyn FlattenObserver,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> Flattener<'a> {
    /// Creates a flattener.
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

    /// Reads the image tree at `input_dir`, merges its layers in `working_dir` and writes the
    /// flattened tree to `output_dir`.
    ///
    /// `working_dir` and `output_dir` are emptied before use. `input_dir` is only read.
    pub async fn flatten(
        &self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        name_version: &NameVersion,
        working_dir: impl AsRef<Path>,
    ) -> SquashResult<MergedLayer> {
        let input_dir = input_dir.as_ref();

        let chain = LayerChainResolver::new(self.observer)
            .resolve(input_dir)
            .await?;
        let leaf = chain
            .leaf()
            .ok_or_else(|| SquashError::MalformedImage("image has no layers".to_string()))?;
        let leaf = LayerRecord::load(input_dir, leaf).await?;

        let tree = LayerMerger::new(self.codec, self.observer)
            .merge(input_dir, &chain, working_dir)
            .await?;

        ImageFinalizer::new(self.codec, self.id_generator, self.observer)
            .finalize(&tree, leaf, name_version, output_dir)
            .await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tokio::fs;

    use crate::{
        archive::TarCodec,
        squash::{
            fixtures::{self, Entry},
            FlattenEvent, NoopObserver, RandomLayerId,
        },
    };

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_flatten_two_layers_with_whiteout() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let input = temp.path().join("inputImage");
        let work = temp.path().join("combinedLayersData");
        let output = temp.path().join("outputImage");

        fixtures::write_layer(&input, "layer1", None, &[Entry::File("a.txt", "1")]).await?;
        fixtures::write_layer(
            &input,
            "layer2",
            Some("layer1"),
            &[Entry::File("b.txt", "2"), Entry::Whiteout("a.txt")],
        )
        .await?;
        fixtures::write_repositories(&input, "base", "old", "layer2").await?;

        let name_version = "myimage:1.0".parse::<NameVersion>()?;
        let observer = fixtures::RecordingObserver::default();
        let layer = Flattener::new(&TarCodec::new(), &RandomLayerId, &observer)
            .flatten(&input, &output, &name_version, &work)
            .await?;

        assert_eq!(*layer.get_size(), 1);
        assert_eq!(layer.get_record().parent, None);
        assert_eq!(layer.get_record().container, None);

        let repositories: Value =
            serde_json::from_str(&fs::read_to_string(output.join("repositories")).await?)?;
        assert_eq!(repositories, json!({ "myimage": { "1.0": layer.get_id() } }));

        let unpacked = temp.path().join("unpacked");
        TarCodec::new()
            .extract(&layer.get_layer_dir().join("layer.tar"), &unpacked)
            .await?;
        assert_eq!(fixtures::list_tree(&unpacked), vec!["b.txt"]);

        // The input tree is left as it was
        assert!(input.join("layer1").join("layer.tar").exists());
        assert!(input.join("layer2").join("json").exists());

        let events = observer.events();
        assert!(matches!(events.first(), Some(FlattenEvent::ChainResolved { .. })));
        let applied = events
            .iter()
            .filter_map(|event| match event {
                FlattenEvent::LayerApplied { layer } => Some(layer.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(applied, vec!["layer1", "layer2"]);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_flatten_keeps_leaf_metadata() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let input = temp.path().join("in");

        fixtures::write_layer(&input, "base", None, &[Entry::File("x", "xx")]).await?;
        fixtures::write_layer(&input, "top", Some("base"), &[]).await?;
        fixtures::write_repositories(&input, "app", "1", "top").await?;

        let name_version = "app:flat".parse::<NameVersion>()?;
        let layer = Flattener::new(&TarCodec::new(), &RandomLayerId, &NoopObserver)
            .flatten(&input, temp.path().join("out"), &name_version, temp.path().join("work"))
            .await?;

        let record = layer.get_record();
        assert_eq!(record.size, Some(2));
        assert_eq!(record.extra.get("os"), Some(&json!("linux")));
        assert_eq!(
            record.extra.get("container_config"),
            Some(&json!({ "Cmd": ["/bin/sh", "-c", "#(nop)"] }))
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_flatten_cyclic_image_fails_before_merging() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let input = temp.path().join("in");
        let work = temp.path().join("work");

        fixtures::write_layer(&input, "a", Some("b"), &[]).await?;
        fixtures::write_layer(&input, "b", Some("a"), &[]).await?;
        fixtures::write_repositories(&input, "app", "1", "b").await?;

        let name_version = "app:flat".parse::<NameVersion>()?;
        let result = Flattener::new(&TarCodec::new(), &RandomLayerId, &NoopObserver)
            .flatten(&input, temp.path().join("out"), &name_version, &work)
            .await;

        assert!(matches!(result, Err(SquashError::CyclicChain { .. })));
        assert!(!work.exists());
        Ok(())
    }
}
