use tokio::fs;

use crate::{
    archive::ArchiveCodec,
    config::FlattenConfig,
    utils::{
        self, INPUT_IMAGE_SUBDIR, MERGED_LAYER_SUBDIR, OUTPUT_IMAGE_SUBDIR, STAGED_IMAGE_FILENAME,
    },
    SquashError, SquashResult,
};

use super::{FlattenEvent, FlattenObserver, Flattener, MergedLayer};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Flattens the `docker save` archive at the config's input into a one-layer archive at its output.
///
/// Work happens in the config's scratch directory:
///
/// ```text
/// <output stem>_temp/
/// ├── inputImage/           the unpacked input archive
/// ├── combinedLayersData/   the merged filesystem
/// ├── outputImage/          the flattened image tree
/// └── image.tar             the packed output, before it is moved into place
/// ```
///
/// The output path is only ever replaced by a complete archive. On success the scratch directory is
/// removed unless `keep_temp` is set; on failure it is left behind for inspection.
pub async fn run(
    config: &FlattenConfig,
    codec: &dyn ArchiveCodec,
    observer: &dyn FlattenObserver,
) -> SquashResult<MergedLayer> {
    let input = config.get_input();
    let output = config.get_output();

    if !fs::try_exists(input).await? {
        return Err(SquashError::MalformedImage(format!(
            "input image {} does not exist",
            input.display()
        )));
    }

    let scratch = config.scratch_dir();
    let input_dir = scratch.join(INPUT_IMAGE_SUBDIR);
    let working_dir = scratch.join(MERGED_LAYER_SUBDIR);
    let output_dir = scratch.join(OUTPUT_IMAGE_SUBDIR);
    let staged_image = scratch.join(STAGED_IMAGE_FILENAME);

    utils::init_empty_dir(&scratch).await?;
    utils::init_empty_dir(&input_dir).await?;

    observer.on_event(&FlattenEvent::UnpackingImage {
        archive: input.clone(),
        dest: input_dir.clone(),
    });
    codec.extract(input, &input_dir).await?;

    let id_generator = config.get_id_strategy().generator();
    let layer = Flattener::new(codec, id_generator.as_ref(), observer)
        .flatten(&input_dir, &output_dir, config.get_name_version(), &working_dir)
        .await?;

    observer.on_event(&FlattenEvent::PackingImage {
        archive: staged_image.clone(),
    });
    codec.pack(&output_dir, &staged_image).await?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(&staged_image, output).await?;

    if !*config.get_keep_temp() {
        observer.on_event(&FlattenEvent::CleaningUp {
            dir: scratch.clone(),
        });
        utils::remove_path(&scratch).await?;
    }

    observer.on_event(&FlattenEvent::Finished {
        id: layer.get_id().clone(),
        output: output.clone(),
    });

    Ok(layer)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::{json, Value};
    use tempfile::tempdir;

    use crate::{
        archive::TarCodec,
        config::LayerIdStrategy,
        squash::{
            fixtures::{self, Entry},
            NoopObserver,
        },
    };

    use super::*;

    /// Builds a `docker save` style archive at `archive` from a two-layer image.
    async fn write_image_archive(root: &Path, archive: &Path) -> anyhow::Result<()> {
        let image = root.join("source");
        fixtures::write_layer(&image, "layer1", None, &[Entry::File("a.txt", "1")]).await?;
        fixtures::write_layer(
            &image,
            "layer2",
            Some("layer1"),
            &[Entry::File("b.txt", "2"), Entry::Whiteout("a.txt")],
        )
        .await?;
        fixtures::write_repositories(&image, "base", "old", "layer2").await?;

        TarCodec::new().pack(&image, archive).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_run_produces_flattened_archive_and_cleans_up() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let input = temp.path().join("image.tar");
        let output = temp.path().join("flat.tar");
        write_image_archive(temp.path(), &input).await?;

        let config = FlattenConfig::builder()
            .input(&input)
            .output(&output)
            .name_version("myimage:1.0".parse()?)
            .build();
        let layer = run(&config, &TarCodec::new(), &NoopObserver).await?;

        assert!(output.is_file());
        assert!(!temp.path().join("flat_temp").exists());

        let unpacked = temp.path().join("unpacked");
        TarCodec::new().extract(&output, &unpacked).await?;

        let id = layer.get_id();
        assert_eq!(
            fixtures::list_tree(&unpacked),
            vec![
                format!("{id}/"),
                format!("{id}/VERSION"),
                format!("{id}/json"),
                format!("{id}/layer.tar"),
                "repositories".to_string(),
            ]
        );

        let repositories: Value =
            serde_json::from_str(&fs::read_to_string(unpacked.join("repositories")).await?)?;
        assert_eq!(repositories, json!({ "myimage": { "1.0": id } }));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_run_keep_temp_leaves_scratch_dir() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let input = temp.path().join("image.tar");
        let output = temp.path().join("flat.tar");
        write_image_archive(temp.path(), &input).await?;

        let config = FlattenConfig::builder()
            .input(&input)
            .output(&output)
            .name_version("myimage:1.0".parse()?)
            .id_strategy(LayerIdStrategy::ContentDigest)
            .keep_temp(true)
            .build();
        run(&config, &TarCodec::new(), &NoopObserver).await?;

        let scratch = temp.path().join("flat_temp");
        assert!(scratch.join(INPUT_IMAGE_SUBDIR).join("repositories").is_file());
        assert!(scratch.join(MERGED_LAYER_SUBDIR).join("b.txt").is_file());
        assert!(scratch.join(OUTPUT_IMAGE_SUBDIR).join("repositories").is_file());
        assert!(!scratch.join(STAGED_IMAGE_FILENAME).exists());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_run_failure_keeps_existing_output() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let image = temp.path().join("source");
        let input = temp.path().join("image.tar");
        let output = temp.path().join("flat.tar");

        fixtures::write_layer(&image, "a", Some("b"), &[]).await?;
        fixtures::write_layer(&image, "b", Some("a"), &[]).await?;
        fixtures::write_repositories(&image, "app", "1", "b").await?;
        TarCodec::new().pack(&image, &input).await?;
        fs::write(&output, "previous").await?;

        let config = FlattenConfig::builder()
            .input(&input)
            .output(&output)
            .name_version("app:flat".parse()?)
            .build();
        let result = run(&config, &TarCodec::new(), &NoopObserver).await;

        assert!(matches!(result, Err(SquashError::CyclicChain { .. })));
        assert_eq!(fs::read_to_string(&output).await?, "previous");
        assert!(temp.path().join("flat_temp").exists());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_run_missing_input_is_malformed() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let config = FlattenConfig::builder()
            .input(temp.path().join("missing.tar"))
            .output(temp.path().join("flat.tar"))
            .name_version("app:flat".parse()?)
            .build();

        let result = run(&config, &TarCodec::new(), &NoopObserver).await;

        assert!(matches!(result, Err(SquashError::MalformedImage(_))));
        assert!(!temp.path().join("flat_temp").exists());
        Ok(())
    }
}
