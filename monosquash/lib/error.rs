use std::{
    error::Error,
    fmt::{self, Display},
    time::Duration,
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a monosquash-related operation.
pub type SquashResult<T> = Result<T, SquashError>;

/// An error that occurred while flattening an image.
///
/// Every variant is fatal to the run that raised it. Nothing is retried.
#[derive(pretty_error_debug::Debug, Error)]
pub enum SquashError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The image tree does not have the expected layout: the `repositories` pointer is missing or
    /// ambiguous, or a layer directory lacks a readable metadata record or archive.
    #[error("malformed image: {0}")]
    MalformedImage(String),

    /// A layer's parent pointer leads back to a layer already visited.
    #[error("cyclic layer chain: layer {layer} is revisited after {chain:?}")]
    CyclicChain {
        /// The layer that was reached twice.
        layer: String,

        /// The layers visited before the repeat, leaf first.
        chain: Vec<String>,
    },

    /// The output image name does not match `<name>:<version>`.
    #[error("invalid name:version pair '{0}'")]
    InvalidNameVersion(String),

    /// An archive operation failed.
    #[error("archive operation failed: {0}")]
    ExternalTool(String),

    /// An archive operation ran past its deadline and was cancelled.
    #[error("{operation} timed out after {timeout:?}")]
    ArchiveTimeout {
        /// The operation that was cancelled.
        operation: String,

        /// The deadline that expired.
        timeout: Duration,
    },

    /// A blocking task could not be joined.
    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SquashError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> SquashError {
        SquashError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `SquashResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> SquashResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
