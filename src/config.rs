//! Configuration management for edgeinfer
//!
//! Settings are loaded from environment variables with sensible defaults and can
//! be overridden programmatically before the SDK is constructed.
//!
//! # Environment Variables
//!
//! - `EDGEINFER_API_KEY`: API key exchanged for a session token - **required for initialize()**
//! - `EDGEINFER_API_URL`: Backend base URL - default: "https://api.edgeinfer.dev"
//! - `EDGEINFER_REQUEST_TIMEOUT`: Timeout for auxiliary HTTP calls in seconds - default: "10"
//! - `EDGEINFER_LOG_LEVEL`: Logging level - default: "info"
//! - `EDGEINFER_TELEMETRY`: Enable telemetry batching (true|false) - default: "true"
//! - `EDGEINFER_DEFAULT_MODEL`: Model used when RAG needs an implicit load - default: "quantum-1.7b"
//! - `EDGEINFER_DATA_DIR`: Where the device identity is persisted
//!
//! ## Cloud Fallback
//! - `EDGEINFER_FALLBACK_PROVIDER`: openai|bedrock
//! - `EDGEINFER_FALLBACK_API_KEY`, `EDGEINFER_FALLBACK_MODEL`, `EDGEINFER_FALLBACK_REGION`
//! - `EDGEINFER_FALLBACK_ENDPOINT`: Provider base URL override (proxies, gateways)

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.edgeinfer.dev";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TELEMETRY_ENABLED: bool = true;
pub const DEFAULT_MODEL: &str = "quantum-1.7b";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not specified. Set EDGEINFER_API_KEY or call with_api_key()")]
    MissingApiKey,

    #[error("Invalid fallback provider: {0}. Valid options: openai, bedrock")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Cloud provider used when local inference fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackProvider {
    OpenAI,
    Bedrock,
}

impl FallbackProvider {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "openai" => Ok(FallbackProvider::OpenAI),
            "bedrock" => Ok(FallbackProvider::Bedrock),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackProvider::OpenAI => "openai",
            FallbackProvider::Bedrock => "bedrock",
        }
    }
}

/// Target for the cloud fallback path. Immutable once the SDK is built.
#[derive(Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub provider: FallbackProvider,
    pub api_key: String,
    pub model: String,
    pub region: Option<String>,
    /// Replaces the provider's public base URL
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl FallbackConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: FallbackProvider::OpenAI,
            api_key: api_key.into(),
            model: model.into(),
            region: None,
            endpoint: None,
        }
    }

    pub fn bedrock(
        api_key: impl Into<String>,
        model: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            provider: FallbackProvider::Bedrock,
            api_key: api_key.into(),
            model: model.into(),
            region: Some(region.into()),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    fn from_env() -> Option<Self> {
        let provider = env::var("EDGEINFER_FALLBACK_PROVIDER").ok()?;
        let provider = FallbackProvider::parse(&provider).ok()?;
        let api_key = env::var("EDGEINFER_FALLBACK_API_KEY").ok()?;
        let model = env::var("EDGEINFER_FALLBACK_MODEL").ok()?;
        let region = env::var("EDGEINFER_FALLBACK_REGION").ok();
        let endpoint = env::var("EDGEINFER_FALLBACK_ENDPOINT")
            .ok()
            .map(|e| e.trim_end_matches('/').to_string());

        Some(Self {
            provider,
            api_key,
            model,
            region,
            endpoint,
        })
    }
}

impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub telemetry_enabled: bool,
    pub default_model: String,
    pub data_dir: PathBuf,
    pub fallback: Option<FallbackConfig>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        let api_key = env::var("EDGEINFER_API_KEY").ok().filter(|k| !k.is_empty());

        let api_url = env::var("EDGEINFER_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let request_timeout_secs = env::var("EDGEINFER_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let log_level = env::var("EDGEINFER_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let telemetry_enabled = env::var("EDGEINFER_TELEMETRY")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(DEFAULT_TELEMETRY_ENABLED);

        let default_model =
            env::var("EDGEINFER_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let data_dir = env::var("EDGEINFER_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("edgeinfer")))
            .unwrap_or_else(|| env::temp_dir().join("edgeinfer"));

        Self {
            api_key,
            api_url,
            request_timeout_secs,
            log_level,
            telemetry_enabled,
            default_model,
            data_dir,
            fallback: FallbackConfig::from_env(),
        }
    }
}

impl SdkConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::ValidationFailed(format!(
                "API URL must start with http:// or https:// (got '{}')",
                self.api_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 5 minutes".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if let Some(fallback) = &self.fallback {
            if fallback.api_key.is_empty() || fallback.model.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Fallback requires both an API key and a model".to_string(),
                ));
            }
            if fallback.provider == FallbackProvider::Bedrock && fallback.region.is_none() {
                return Err(ConfigError::ValidationFailed(
                    "Bedrock fallback requires a region".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

impl fmt::Display for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "edgeinfer configuration:")?;
        writeln!(f, "  API URL: {}", self.api_url)?;
        writeln!(
            f,
            "  API Key: {}",
            if self.api_key.is_some() { "set" } else { "not set" }
        )?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Telemetry: {}", self.telemetry_enabled)?;
        writeln!(f, "  Default Model: {}", self.default_model)?;
        writeln!(f, "  Data Dir: {}", self.data_dir.display())?;
        if let Some(fallback) = &self.fallback {
            writeln!(
                f,
                "  Fallback: {} ({})",
                fallback.provider.as_str(),
                fallback.model
            )?;
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
