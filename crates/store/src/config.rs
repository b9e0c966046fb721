//! Store configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{BackendPolicy, SlotStoreConfig};

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level store configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite chunk index; in-memory when unset
    pub index_path: Option<PathBuf>,

    /// Physical slot storage location
    #[serde(default)]
    pub backend: SlotStoreConfig,

    /// Slot sizing and fee policy
    #[serde(default)]
    pub policy: BackendPolicy,

    /// Writer identity mixed into generated blob keys
    #[serde(default = "StoreConfig::default_writer")]
    pub writer: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            backend: SlotStoreConfig::default(),
            policy: BackendPolicy::default(),
            writer: Self::default_writer(),
        }
    }
}

impl StoreConfig {
    fn default_writer() -> String {
        "local".to_string()
    }

    /// Load a configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::prelude::*;

    #[test]
    fn test_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert!(config.index_path.is_none());
        assert!(matches!(config.backend, SlotStoreConfig::Memory));
        assert_eq!(config.writer, "local");
    }

    #[test]
    fn test_parse_local_backend() {
        let config: StoreConfig = toml::from_str(
            r#"
            index_path = "/var/lib/silo/index.db"
            writer = "node-a"

            [backend]
            type = "local"
            path = "/var/lib/silo/slots"

            [policy]
            upfront_payment = 25
            "#,
        )
        .unwrap();

        assert_eq!(
            config.index_path.as_deref(),
            Some(Path::new("/var/lib/silo/index.db"))
        );
        assert!(matches!(config.backend, SlotStoreConfig::Local { .. }));
        assert_eq!(config.policy.upfront_payment, Credits::new(25));
        assert_eq!(config.writer, "node-a");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silo.toml");
        tokio::fs::write(&path, "writer = \"from-file\"\n")
            .await
            .unwrap();

        let config = StoreConfig::load(&path).await.unwrap();
        assert_eq!(config.writer, "from-file");
    }
}
