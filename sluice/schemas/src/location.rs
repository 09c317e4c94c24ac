//! Location type that handles both file paths and URLs

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// A location that can be either a file path or a URL
///
/// Plain paths are converted to `file://` URLs during deserialization, relative
/// paths are resolved against the current directory.
///
/// # Examples
///
/// ```
/// use sluice_schemas::Location;
///
/// let file_location: Location = "/tmp/data.csv".try_into().unwrap();
/// assert_eq!(file_location.scheme(), "file");
///
/// let rel_location: Location = "./data.csv".try_into().unwrap();
/// assert!(rel_location.local_path().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[cfg_attr(
    feature = "schema_gen",
    schemars(
        with = "String",
        description = "A file path or file:// URL. Examples: '/tmp/data.csv', './data.csv', 'file:///tmp/data.csv'"
    )
)]
pub struct Location(pub Url);

impl Location {
    /// Local filesystem path for `file://` locations
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.0.scheme() {
            "file" => self.0.to_file_path().ok(),
            _ => None,
        }
    }
}

impl TryFrom<&str> for Location {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        // Windows drive letters parse as a one letter scheme
        if let Ok(url) = Url::parse(s) {
            if url.scheme().len() > 1 {
                return Ok(Location(url));
            }
        }

        let path = Path::new(s);
        let url = if path.is_absolute() {
            Url::from_file_path(path)
        } else {
            let current_dir = std::env::current_dir()
                .map_err(|e| format!("Cannot get current directory: {e}"))?;
            Url::from_file_path(current_dir.join(path))
        }
        .map_err(|_| format!("Invalid path: {s}"))?;

        Ok(Location(url))
    }
}

impl TryFrom<String> for Location {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Location::try_from(s.as_str())
    }
}

impl TryFrom<&Path> for Location {
    type Error = String;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let path = path
            .to_str()
            .ok_or_else(|| format!("Path is not valid UTF-8: {}", path.display()))?;
        Location::try_from(path)
    }
}

impl From<Url> for Location {
    fn from(url: Url) -> Self {
        Location(url)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Location::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<Url> for Location {
    fn as_ref(&self) -> &Url {
        &self.0
    }
}

impl std::ops::Deref for Location {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_file_path() {
        let location: Location = "/tmp/data.csv".try_into().unwrap();
        assert_eq!(location.scheme(), "file");
        assert!(location.path().ends_with("/tmp/data.csv"));
        assert_eq!(location.local_path(), Some(PathBuf::from("/tmp/data.csv")));
    }

    #[test]
    fn test_relative_file_path() {
        let location: Location = "./data.csv".try_into().unwrap();
        assert_eq!(location.scheme(), "file");
        assert!(location.path().ends_with("/data.csv"));
    }

    #[test]
    fn test_remote_url_has_no_local_path() {
        let location: Location = "https://example.com/data.csv".try_into().unwrap();
        assert_eq!(location.scheme(), "https");
        assert!(location.local_path().is_none());
    }

    #[test]
    fn test_yaml_deserialization() {
        let yaml = r#"
location: "./data/input.csv"
"#;

        #[derive(serde::Deserialize)]
        struct Config {
            location: Location,
        }

        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.location.scheme(), "file");
        assert!(config.location.path().ends_with("/data/input.csv"));
    }
}
