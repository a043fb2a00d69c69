use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{NameVersion, DEFAULT_SCRATCH_DIR_SUFFIX};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How the flattened layer's identifier is minted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LayerIdStrategy {
    /// 256 random bits.
    #[default]
    Random,

    /// The SHA-256 digest of the packed layer archive.
    #[value(name = "content")]
    ContentDigest,
}

/// Everything a single flatten run needs.
///
/// ## Examples
///
/// ```
/// use std::time::Duration;
/// use monosquash::config::{FlattenConfig, LayerIdStrategy};
///
/// let config = FlattenConfig::builder()
///     .input("/images/app.tar")
///     .output("/images/app-flat.tar")
///     .name_version("app:flat".parse().unwrap())
///     .timeout(Duration::from_secs(300))
///     .build();
///
/// assert_eq!(*config.get_id_strategy(), LayerIdStrategy::Random);
/// assert_eq!(config.scratch_dir().to_str(), Some("/images/app-flat_temp"));
/// ```
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct FlattenConfig {
    /// The `docker save` archive to flatten.
    #[builder(setter(into))]
    input: PathBuf,

    /// Where the flattened image archive is written.
    #[builder(setter(into))]
    output: PathBuf,

    /// The name and version the flattened image is tagged with.
    name_version: NameVersion,

    /// Deadline applied to each archive operation.
    #[builder(default, setter(into))]
    timeout: Option<Duration>,

    /// How the new layer id is minted.
    #[builder(default)]
    id_strategy: LayerIdStrategy,

    /// Keep the scratch directory after a successful run.
    #[builder(default)]
    keep_temp: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FlattenConfig {
    /// Returns the scratch directory used by the run: `<output dir>/<output stem>_temp`.
    pub fn scratch_dir(&self) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.output
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{stem}{DEFAULT_SCRATCH_DIR_SUFFIX}"))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
