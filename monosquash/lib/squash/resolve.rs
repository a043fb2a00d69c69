use std::{collections::HashSet, path::Path};

use crate::{
    image::{LayerChain, LayerRecord, Repositories},
    SquashError, SquashResult,
};

use super::{FlattenEvent, FlattenObserver};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Works out the order layers must be replayed in.
pub struct LayerChainResolver<'a> {
    observer: &'a dyn FlattenObserver,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> LayerChainResolver<'a> {
    /// Creates a resolver reporting to `observer`.
    pub fn new(observer: &'a dyn FlattenObserver) -> Self {
        Self { observer }
    }

    /// Returns the layers of the image tree at `image_dir`, root first.
    ///
    /// Starts at the leaf named by `repositories` and follows `parent` pointers until a layer has
    /// none. The directory listing order of the tree plays no part.
    ///
    /// ## Errors
    /// - [`SquashError::MalformedImage`] if `repositories` is missing or does not name exactly one
    ///   `name:version`, if a layer id is not a plain directory name, or if a layer's metadata can
    ///   not be read.
    /// - [`SquashError::CyclicChain`] if a parent pointer leads back to a visited layer.
    pub async fn resolve(&self, image_dir: impl AsRef<Path>) -> SquashResult<LayerChain> {
        let image_dir = image_dir.as_ref();
        let repositories = Repositories::load(image_dir).await?;

        let mut next = Some(repositories.leaf_layer()?.to_string());
        let mut visited = HashSet::new();
        let mut walked = Vec::new();

        while let Some(layer) = next {
            validate_layer_id(&layer)?;
            if !visited.insert(layer.clone()) {
                return Err(SquashError::CyclicChain {
                    layer,
                    chain: walked,
                });
            }

            let record = LayerRecord::load(image_dir, &layer).await?;
            next = record.parent.filter(|parent| !parent.is_empty());
            walked.push(layer);
        }

        let chain = LayerChain::from_leaf_first(walked);
        self.observer.on_event(&FlattenEvent::ChainResolved {
            chain: chain.clone(),
        });

        Ok(chain)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Layer ids double as directory names, so they must not reach outside the image tree.
fn validate_layer_id(layer: &str) -> SquashResult<()> {
    if layer.is_empty() || layer == "." || layer == ".." || layer.contains(['/', '\\']) {
        return Err(SquashError::MalformedImage(format!(
            "invalid layer id '{layer}'"
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
