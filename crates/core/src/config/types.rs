use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::encoder::EncoderConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::PipelineConfig;
use crate::presentation::{BillingApiConfig, PresentationApiConfig};
use crate::renderer::RendererConfig;
use crate::storage::StorageConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Document store the manifests come from. Required.
    pub presentation_api: PresentationApiConfig,
    /// Points ledger debited on submission. Required.
    pub billing_api: BillingApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    3000
}

/// Job database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("slidecast.db")
}

/// Audit trail configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Audit records live in their own database so heavy job churn
    /// never contends with the job store.
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    /// Size of the in-flight event channel.
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: default_audit_path(),
            buffer_size: default_audit_buffer(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("slidecast-audit.db")
}

fn default_audit_buffer() -> usize {
    256
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
    pub renderer: RendererConfig,
    pub encoder: EncoderConfig,
    pub storage: SanitizedStorageConfig,
    pub pipeline: PipelineConfig,
    pub orchestrator: OrchestratorConfig,
    pub presentation_api: PresentationApiConfig,
    pub billing_api: BillingApiConfig,
}

/// Sanitized storage config (signing secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub root_dir: PathBuf,
    pub public_base_url: String,
    pub signing_secret_configured: bool,
    pub download_ttl_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            audit: config.audit.clone(),
            renderer: config.renderer.clone(),
            encoder: config.encoder.clone(),
            storage: SanitizedStorageConfig {
                root_dir: config.storage.root_dir.clone(),
                public_base_url: config.storage.public_base_url.clone(),
                signing_secret_configured: !config.storage.url_signing_secret.is_empty(),
                download_ttl_secs: config.storage.download_ttl_secs,
            },
            pipeline: config.pipeline.clone(),
            orchestrator: config.orchestrator.clone(),
            presentation_api: config.presentation_api.clone(),
            billing_api: config.billing_api.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
[presentation_api]
url = "http://docs.local"

[billing_api]
url = "http://ledger.local"
"#
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.presentation_api.url, "http://docs.local");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.orchestrator.worker_count, 3);
    }

    #[test]
    fn test_deserialize_with_overrides() {
        let toml = r#"
[presentation_api]
url = "http://docs.local"

[billing_api]
url = "http://ledger.local"

[server]
host = "127.0.0.1"
port = 9000

[orchestrator]
worker_count = 8

[encoder]
crossfade_secs = 0.25
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.orchestrator.worker_count, 8);
        assert_eq!(config.encoder.crossfade_secs, 0.25);
    }

    #[test]
    fn test_deserialize_missing_presentation_api_fails() {
        let toml = r#"
[billing_api]
url = "http://ledger.local"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_default_database() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "slidecast.db");
        assert_eq!(config.audit.path.to_str().unwrap(), "slidecast-audit.db");
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_sanitized_config_hides_signing_secret() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert!(sanitized.storage.signing_secret_configured);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains(&config.storage.url_signing_secret));
    }
}
