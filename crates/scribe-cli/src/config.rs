//! Console configuration file

use anyhow::{Context, Result};
use scribe_core::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `scribe.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub log_level: Option<String>,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; in-memory only when unset
    pub db: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.engine.channel_capacity, 256);
    }

    #[test]
    fn test_load_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[engine]
channel_capacity = 32
export_base_url = "https://docs.example.com/api/documents"

[storage]
db = "/var/lib/scribe/scribe.db"
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.engine.channel_capacity, 32);
        assert_eq!(config.engine.max_content_bytes, scribe_core::config::DEFAULT_MAX_CONTENT_BYTES);
        assert_eq!(config.storage.db, Some(PathBuf::from("/var/lib/scribe/scribe.db")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_unknown_types_rejected() {
        assert!(FileConfig::parse("[engine]\nchannel_capacity = \"lots\"").is_err());
    }
}
