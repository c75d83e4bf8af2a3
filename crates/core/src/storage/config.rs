//! Storage configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the export artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding stored objects.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Base URL prepended to signed download links.
    #[serde(default = "default_base_url")]
    pub public_base_url: String,

    /// Secret used to sign download URLs.
    #[serde(default = "default_signing_secret")]
    pub url_signing_secret: String,

    /// How long a signed download link stays valid, in seconds.
    #[serde(default = "default_download_ttl")]
    pub download_ttl_secs: u64,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./data/exports")
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_signing_secret() -> String {
    "change-me".to_string()
}

fn default_download_ttl() -> u64 {
    86_400
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            public_base_url: default_base_url(),
            url_signing_secret: default_signing_secret(),
            download_ttl_secs: default_download_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.download_ttl_secs, 86_400);
        assert_eq!(config.root_dir, PathBuf::from("./data/exports"));
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            root_dir = "/var/lib/slidecast/exports"
            download_ttl_secs = 3600
        "#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/var/lib/slidecast/exports"));
        assert_eq!(config.download_ttl_secs, 3600);
        assert_eq!(config.public_base_url, "http://localhost:3000");
    }
}
