use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{config::NameVersion, utils::REPOSITORIES_FILENAME, SquashError, SquashResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The `repositories` pointer file: image name to version tag to leaf layer id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Repositories(BTreeMap<String, BTreeMap<String, String>>);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Repositories {
    /// Creates a pointer with a single `name -> version -> layer_id` entry.
    pub fn single(name_version: &NameVersion, layer_id: impl Into<String>) -> Self {
        let versions = BTreeMap::from([(name_version.get_version().to_string(), layer_id.into())]);
        Self(BTreeMap::from([(
            name_version.get_name().to_string(),
            versions,
        )]))
    }

    /// Reads the `repositories` file at the root of the image tree at `image_dir`.
    pub async fn load(image_dir: impl AsRef<Path>) -> SquashResult<Self> {
        let path = image_dir.as_ref().join(REPOSITORIES_FILENAME);
        let contents = fs::read_to_string(&path).await.map_err(|e| {
            SquashError::MalformedImage(format!(
                "failed to read repository pointer {}: {e}",
                path.display()
            ))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            SquashError::MalformedImage(format!(
                "failed to parse repository pointer {}: {e}",
                path.display()
            ))
        })
    }

    /// Writes the pointer as pretty-printed JSON to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> SquashResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(SquashError::custom)?;
        fs::write(path, contents).await?;
        Ok(())
    }

    /// Returns the single leaf layer id this pointer names.
    ///
    /// ## Errors
    /// Returns [`SquashError::MalformedImage`] unless there is exactly one name with exactly one
    /// version.
    pub fn leaf_layer(&self) -> SquashResult<&str> {
        let mut names = self.0.iter();
        let (name, versions) = match (names.next(), names.next()) {
            (Some(entry), None) => entry,
            (None, _) => {
                return Err(SquashError::MalformedImage(
                    "repository pointer names no image".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(SquashError::MalformedImage(format!(
                    "repository pointer names {} images, expected exactly one",
                    self.0.len()
                )))
            }
        };

        let mut tags = versions.iter();
        match (tags.next(), tags.next()) {
            (Some((_, layer_id)), None) => Ok(layer_id.as_str()),
            (None, _) => Err(SquashError::MalformedImage(format!(
                "repository pointer has no version for image {name}"
            ))),
            (Some(_), Some(_)) => Err(SquashError::MalformedImage(format!(
                "repository pointer has {} versions for image {name}, expected exactly one",
                versions.len()
            ))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
