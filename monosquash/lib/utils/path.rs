//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The file at the root of an image tree that maps `name -> version -> layer id`.
pub const REPOSITORIES_FILENAME: &str = "repositories";

/// The per-layer metadata record.
pub const LAYER_JSON_FILENAME: &str = "json";

/// The per-layer filesystem archive.
pub const LAYER_TAR_FILENAME: &str = "layer.tar";

/// The per-layer schema version marker.
pub const LAYER_VERSION_FILENAME: &str = "VERSION";

/// The sub directory of the scratch directory holding the unpacked input image.
pub const INPUT_IMAGE_SUBDIR: &str = "inputImage";

/// The sub directory of the scratch directory holding the merged filesystem.
pub const MERGED_LAYER_SUBDIR: &str = "combinedLayersData";

/// The sub directory of the scratch directory holding the assembled output image.
pub const OUTPUT_IMAGE_SUBDIR: &str = "outputImage";

/// The archive the output image is packed into before it is renamed onto the real output path.
pub const STAGED_IMAGE_FILENAME: &str = "image.tar";

/// The file name prefix marking a whiteout.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// The marker that hides everything lower layers placed in its directory.
pub const WHITEOUT_OPAQUE: &str = ".wh..wh..opq";
