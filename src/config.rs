//! Engine configuration, loaded from YAML

use crate::graph::{CacheKey, DEFAULT_EVENT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine settings. Every field is optional in the YAML form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key the coordinator reads and writes
    pub cache_key: String,
    /// Prefix of placeholder ids given to created entities
    pub temp_id_prefix: String,
    /// Buffered cache events per subscriber
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_key: "graph".to_string(),
            temp_id_prefix: "temp-".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.cache_key.as_str())
    }

    /// True if `id` looks like a placeholder this engine issued
    pub fn is_temp_id(&self, id: &str) -> bool {
        id.starts_with(&self.temp_id_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("temp_id_prefix: \"pending-\"\n").unwrap();
        assert_eq!(config.temp_id_prefix, "pending-");
        assert_eq!(config.cache_key, "graph");
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.is_temp_id("pending-42"));
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_key: about-last-night\nlog_level: debug").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.cache_key().as_str(), "about-last-night");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_yaml_file("/nonexistent/optigraph.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        assert!(matches!(
            EngineConfig::from_yaml_str("event_capacity: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
