use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::config::{FlattenConfig, LayerIdStrategy, NameVersion};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Flattens a multi-layer `docker save` image into a single-layer image
#[derive(Debug, Parser)]
#[command(name = "monosquash", author, about, version, styles=styles::styles())]
pub struct MonosquashArgs {
    /// The `docker save` archive to flatten
    #[arg(short, long, value_name = "PATH")]
    pub image: PathBuf,

    /// Where to write the flattened archive
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Name and version to tag the flattened image with
    #[arg(short, long, value_name = "NAME:VERSION")]
    pub name: NameVersion,

    /// Cancel any archive operation running longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// How the new layer id is minted
    #[arg(long, value_enum, default_value_t = LayerIdStrategy::Random)]
    pub layer_id: LayerIdStrategy,

    /// Keep the scratch directory after a successful run
    #[arg(long)]
    pub keep_temp: bool,

    /// Enable verbose logging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl MonosquashArgs {
    /// Returns the configuration for the run these arguments describe.
    pub fn to_config(&self) -> FlattenConfig {
        FlattenConfig::builder()
            .input(self.image.clone())
            .output(self.output.clone())
            .name_version(self.name.clone())
            .timeout(self.timeout())
            .id_strategy(self.layer_id)
            .keep_temp(self.keep_temp)
            .build()
    }

    /// Returns the archive deadline, if one was given.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
