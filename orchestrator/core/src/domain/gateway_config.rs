// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a spec gateway instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP listener settings
// - Token signing secret and default token lifetime
// - Orchestration store (PostgreSQL or in-memory)
// - Spec engine endpoint and timeouts
// - Logging and metrics settings
//
// The configuration is loaded once at startup and treated as immutable
// afterwards; components receive the values they need at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub spec_engine: SpecEngineConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Lifetime of tokens issued by the login endpoint
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. In-memory storage is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecEngineConfig {
    /// Base URL of the engine (http/https); the stream endpoint is derived
    /// from it (ws/wss).
    #[serde(default = "default_spec_engine_url")]
    pub url: String,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Upper bound on a single upstream stream read before the bridge gives
    /// up on the session.
    #[serde(default = "default_stream_read_timeout", with = "humantime_serde")]
    pub stream_read_timeout: Duration,

    #[serde(default = "default_completion_poll_interval", with = "humantime_serde")]
    pub completion_poll_interval: Duration,

    /// How long a dispatched proposal may wait for a terminal engine state
    /// before it is marked failed.
    #[serde(default = "default_completion_timeout", with = "humantime_serde")]
    pub completion_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Prometheus exporter port; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_max_connections() -> u32 {
    5
}

fn default_spec_engine_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_stream_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_completion_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl: default_token_ttl(),
        }
    }
}

impl Default for SpecEngineConfig {
    fn default() -> Self {
        Self {
            url: default_spec_engine_url(),
            request_timeout: default_request_timeout(),
            stream_read_timeout: default_stream_read_timeout(),
            completion_poll_interval: default_completion_poll_interval(),
            completion_timeout: default_completion_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "spec-gateway".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

/// Resolve a secret value, expanding the `env:VAR_NAME` form.
pub fn resolve_secret(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None if value.is_empty() => None,
        None => Some(value.to_string()),
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. SPEC_GATEWAY_CONFIG environment variable
    /// 2. ./spec-gateway.yaml (working directory)
    /// 3. ~/.spec-gateway/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SPEC_GATEWAY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./spec-gateway.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".spec-gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SPEC_GATEWAY_JWT_SECRET") {
            tracing::info!("Environment override: SPEC_GATEWAY_JWT_SECRET");
            self.spec.auth.jwt_secret = Some(val);
        }

        if let Ok(val) = std::env::var("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL");
            self.spec.database.url = Some(val);
        }

        if let Ok(val) = std::env::var("SPEC_ENGINE_URL") {
            tracing::info!("Environment override: SPEC_ENGINE_URL={}", val);
            self.spec.spec_engine.url = val;
        }

        if let Ok(val) = std::env::var("SPEC_GATEWAY_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: SPEC_GATEWAY_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SPEC_GATEWAY_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// The signing secret after `env:` resolution, if any.
    pub fn signing_secret(&self) -> Option<String> {
        self.spec.auth.jwt_secret.as_deref().and_then(resolve_secret)
    }

    pub fn storage_backend(&self) -> crate::domain::repository::StorageBackend {
        use crate::domain::repository::{PostgresConfig, StorageBackend};
        match self.spec.database.url.as_deref().and_then(resolve_secret) {
            Some(connection_string) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string,
                max_connections: self.spec.database.max_connections,
            }),
            None => StorageBackend::InMemory,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let engine = &self.spec.spec_engine;
        let parsed = url::Url::parse(&engine.url)
            .map_err(|e| anyhow::anyhow!("spec.spec_engine.url '{}' is invalid: {}", engine.url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("spec.spec_engine.url must use http or https, got '{}'", parsed.scheme());
        }

        for (name, value) in [
            ("request_timeout", engine.request_timeout),
            ("stream_read_timeout", engine.stream_read_timeout),
            ("completion_poll_interval", engine.completion_poll_interval),
            ("completion_timeout", engine.completion_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("spec.spec_engine.{} must be greater than zero", name);
            }
        }

        if self.spec.auth.token_ttl.is_zero() {
            anyhow::bail!("spec.auth.token_ttl must be greater than zero");
        }

        if !matches!(self.spec.observability.log_format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "spec.observability.log_format must be 'compact' or 'json', got '{}'",
                self.spec.observability.log_format
            );
        }

        if self.signing_secret().is_none() {
            tracing::warn!("No token signing secret configured; login and token validation will fail");
        }

        Ok(())
    }
}
