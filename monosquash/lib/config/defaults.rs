//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The schema version written to every layer's `VERSION` file.
pub const DEFAULT_LAYER_SCHEMA_VERSION: &str = "1.0";

/// Appended to the output archive's stem to name the scratch directory next to it.
pub const DEFAULT_SCRATCH_DIR_SUFFIX: &str = "_temp";

/// The tracing filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "monosquash=info";
