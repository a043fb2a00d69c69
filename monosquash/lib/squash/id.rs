use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::{fs::File, io::AsyncReadExt};

use crate::{config::LayerIdStrategy, SquashResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const DIGEST_READ_BUFFER_SIZE: usize = 64 * 1024;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Mints 256 random bits, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLayerId;

/// Uses the SHA-256 digest of the packed layer archive, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDigestLayerId;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Mints the identifier of the flattened layer.
///
/// Implementations must return 64 lowercase hex characters.
#[async_trait]
pub trait LayerIdGenerator: Send + Sync {
    /// Returns an id for the layer whose packed filesystem archive is at `layer_archive`.
    async fn generate(&self, layer_archive: &Path) -> SquashResult<String>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerIdStrategy {
    /// Returns the generator implementing this strategy.
    pub fn generator(&self) -> Box<dyn LayerIdGenerator> {
        match self {
            LayerIdStrategy::Random => Box::new(RandomLayerId),
            LayerIdStrategy::ContentDigest => Box::new(ContentDigestLayerId),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl LayerIdGenerator for RandomLayerId {
    async fn generate(&self, _layer_archive: &Path) -> SquashResult<String> {
        Ok(hex::encode(rand::random::<[u8; 32]>()))
    }
}

#[async_trait]
impl LayerIdGenerator for ContentDigestLayerId {
    async fn generate(&self, layer_archive: &Path) -> SquashResult<String> {
        let mut file = File::open(layer_archive).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0; DIGEST_READ_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
