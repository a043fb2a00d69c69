use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use crate::{
    utils::{LAYER_JSON_FILENAME, LAYER_TAR_FILENAME},
    SquashError, SquashResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A layer's `json` metadata record.
///
/// Only the fields the flattener rewrites are typed. Everything else is kept in `extra` and written
/// back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// The layer id, which is also the name of the layer's directory.
    pub id: String,

    /// The layer below this one. `None` for the root layer; a JSON `null` reads the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// The container the layer was committed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Value>,

    /// When the layer was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// The size of the layer's filesystem data in bytes.
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Every other field of the record.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerRecord {
    /// Reads the metadata record of layer `id` from the image tree at `image_dir`.
    pub async fn load(image_dir: impl AsRef<Path>, id: &str) -> SquashResult<Self> {
        let path = image_dir.as_ref().join(id).join(LAYER_JSON_FILENAME);
        let contents = fs::read_to_string(&path).await.map_err(|e| {
            SquashError::MalformedImage(format!(
                "failed to read metadata for layer {id} at {}: {e}",
                path.display()
            ))
        })?;

        let record: Self = serde_json::from_str(&contents).map_err(|e| {
            SquashError::MalformedImage(format!(
                "failed to parse metadata for layer {id} at {}: {e}",
                path.display()
            ))
        })?;

        if record.id != id {
            tracing::warn!(
                "Layer directory {} holds a record with id {}",
                id,
                record.id
            );
        }

        Ok(record)
    }

    /// Writes the record as pretty-printed JSON to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> SquashResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(SquashError::custom)?;
        fs::write(path, contents).await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path of layer `id`'s filesystem archive inside the image tree at `image_dir`.
pub fn layer_archive_path(image_dir: impl AsRef<Path>, id: &str) -> PathBuf {
    image_dir.as_ref().join(id).join(LAYER_TAR_FILENAME)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_layer_record_preserves_unknown_fields() -> anyhow::Result<()> {
        let raw = json!({
            "id": "bbb",
            "parent": "aaa",
            "container": "c0ffee",
            "created": "2015-06-01T12:00:00Z",
            "Size": 42,
            "os": "linux",
            "config": { "Cmd": ["/bin/sh"] }
        });

        let record: LayerRecord = serde_json::from_value(raw.clone())?;
        assert_eq!(record.id, "bbb");
        assert_eq!(record.parent.as_deref(), Some("aaa"));
        assert_eq!(record.size, Some(42));
        assert_eq!(record.extra.get("os"), Some(&json!("linux")));

        assert_eq!(serde_json::to_value(&record)?, raw);
        Ok(())
    }

    #[test]
    fn test_layer_record_null_parent_is_root() -> anyhow::Result<()> {
        let record: LayerRecord = serde_json::from_value(json!({ "id": "aaa", "parent": null }))?;
        assert_eq!(record.parent, None);

        let record: LayerRecord = serde_json::from_value(json!({ "id": "aaa" }))?;
        assert_eq!(record.parent, None);

        // Absent optional fields stay absent when written back
        let value = serde_json::to_value(&record)?;
        assert_eq!(value, json!({ "id": "aaa" }));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_record_load_errors_are_malformed_image() -> anyhow::Result<()> {
        let temp = tempdir()?;

        let result = LayerRecord::load(temp.path(), "missing").await;
        assert!(matches!(result, Err(SquashError::MalformedImage(_))));

        fs::create_dir(temp.path().join("broken")).await?;
        fs::write(temp.path().join("broken").join(LAYER_JSON_FILENAME), "{ not json").await?;
        let result = LayerRecord::load(temp.path(), "broken").await;
        assert!(matches!(result, Err(SquashError::MalformedImage(_))));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_record_save_then_load() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let layer_dir = temp.path().join("abc");
        fs::create_dir(&layer_dir).await?;

        let record: LayerRecord =
            serde_json::from_value(json!({ "id": "abc", "architecture": "amd64" }))?;
        record.save(layer_dir.join(LAYER_JSON_FILENAME)).await?;

        assert_eq!(LayerRecord::load(temp.path(), "abc").await?, record);
        Ok(())
    }
}
