//! `monosquash` flattens a multi-layer `docker save` image into an image with a single layer.
//!
//! # Overview
//!
//! A legacy `docker save` archive holds one directory per layer, each with a metadata record, a
//! filesystem delta and a schema version, plus a `repositories` file naming the top layer. Layers
//! point at their parents, so the image is a chain that has to be replayed from the bottom up.
//!
//! monosquash:
//! - Resolves the layer chain from the tagged leaf down to the root
//! - Replays every layer onto one working tree, honouring `.wh.` and `.wh..wh..opq` whiteouts
//! - Packs the result as a single layer with a fresh id and no parent
//! - Tags the new image with a caller-supplied `name:version`
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use monosquash::{
//!     archive::TarCodec,
//!     config::FlattenConfig,
//!     squash::{self, TracingObserver},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FlattenConfig::builder()
//!         .input("/images/app.tar")
//!         .output("/images/app-flat.tar")
//!         .name_version("app:flat".parse()?)
//!         .build();
//!
//!     let layer = squash::run(&config, &TarCodec::new(), &TracingObserver).await?;
//!     println!("flattened into layer {}", layer.get_id());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`archive`] - Tar extraction and packing
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Run configuration and `name:version` parsing
//! - [`image`] - The on-disk image tree: repositories, layer records, layer chains
//! - [`squash`] - Chain resolution, layer merging and image finalization
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod archive;
pub mod cli;
pub mod config;
pub mod image;
pub mod squash;
pub mod utils;

pub use error::*;
