use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SquashError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static NAME_VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?<name>.+):(?<version>[^:]+)$").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The `name:version` pair the flattened image is published under.
///
/// The version is everything after the last colon and can not itself contain one, so registry
/// hosts with ports survive in the name (`localhost:5000/app:1.0` has name `localhost:5000/app`).
///
/// ## Examples
///
/// ```
/// use monosquash::config::NameVersion;
///
/// let pair = "myimage:1.0".parse::<NameVersion>().unwrap();
/// assert_eq!(pair.get_name(), "myimage");
/// assert_eq!(pair.get_version(), "1.0");
///
/// assert!("badname".parse::<NameVersion>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameVersion {
    name: String,
    version: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NameVersion {
    /// Returns the image name.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Returns the image version.
    pub fn get_version(&self) -> &str {
        &self.version
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for NameVersion {
    type Err = SquashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = NAME_VERSION_REGEX
            .captures(s)
            .ok_or_else(|| SquashError::InvalidNameVersion(s.to_string()))?;

        Ok(Self {
            name: captures["name"].to_string(),
            version: captures["version"].to_string(),
        })
    }
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl Serialize for NameVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NameVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_version_from_str() {
        let pair = "myimage:1.0".parse::<NameVersion>().unwrap();
        assert_eq!(pair.get_name(), "myimage");
        assert_eq!(pair.get_version(), "1.0");

        // The last colon separates the version
        let pair = "localhost:5000/team/app:latest"
            .parse::<NameVersion>()
            .unwrap();
        assert_eq!(pair.get_name(), "localhost:5000/team/app");
        assert_eq!(pair.get_version(), "latest");
    }

    #[test]
    fn test_name_version_rejects_invalid_input() {
        for input in ["badname", "", ":", "name:", ":1.0"] {
            match input.parse::<NameVersion>() {
                Err(SquashError::InvalidNameVersion(value)) => assert_eq!(value, input),
                other => panic!("expected InvalidNameVersion for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_name_version_display_and_serde() -> anyhow::Result<()> {
        let pair = "myimage:1.0".parse::<NameVersion>()?;
        assert_eq!(pair.to_string(), "myimage:1.0");

        let json = serde_json::to_string(&pair)?;
        assert_eq!(json, "\"myimage:1.0\"");
        assert_eq!(serde_json::from_str::<NameVersion>(&json)?, pair);
        assert!(serde_json::from_str::<NameVersion>("\"badname\"").is_err());

        Ok(())
    }
}
