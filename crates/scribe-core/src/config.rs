//! Engine configuration

use serde::{Deserialize, Serialize};

/// Maximum document content size in bytes (16MB default)
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 16 * 1024 * 1024;

/// Events buffered per session before new ones are dropped
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for a [`CollaborationService`](crate::CollaborationService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-session event buffer
    pub channel_capacity: usize,
    /// Largest accepted document content
    pub max_content_bytes: usize,
    /// Prefix for export locators, e.g. `/api/documents`
    pub export_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            export_base_url: "/api/documents".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "channel_capacity": 8 }"#).unwrap();
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.max_content_bytes, DEFAULT_MAX_CONTENT_BYTES);
        assert_eq!(config.export_base_url, "/api/documents");
    }
}
