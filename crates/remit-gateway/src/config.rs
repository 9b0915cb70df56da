//! Configuration for the ACH gateway and tax API clients.

use url::Url;
use zeroize::Zeroizing;

/// Remitian deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemitianEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl RemitianEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox-api.remitian.com/v1",
            Self::Production => "https://api.remitian.com/v1",
        }
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Configuration for [`RemitianClient`](crate::RemitianClient).
#[derive(Clone)]
pub struct AchGatewayConfig {
    /// Base URL including the `/v1` prefix.
    pub base_url: Url,
    /// Bearer API key.
    pub api_key: Zeroizing<String>,
    pub environment: RemitianEnvironment,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AchGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchGatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AchGatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `REMITIAN_API_KEY` (required)
    /// - `REMITIAN_ENVIRONMENT` (`sandbox` | `production`, default: `sandbox`)
    /// - `REMITIAN_BASE_URL` (overrides the environment's base URL)
    /// - `REMITIAN_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("REMITIAN_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey("REMITIAN_API_KEY"))?;
        let environment = match std::env::var("REMITIAN_ENVIRONMENT") {
            Ok(raw) => RemitianEnvironment::parse(&raw)?,
            Err(_) => RemitianEnvironment::default(),
        };
        Ok(Self {
            base_url: env_url("REMITIAN_BASE_URL", environment.base_url())?,
            api_key: Zeroizing::new(api_key),
            environment,
            timeout_secs: env_secs("REMITIAN_TIMEOUT_SECS", 30),
        })
    }

    /// Configuration pointing at a local mock server.
    pub fn local_mock(uri: &str, api_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(uri)
                .map_err(|e| ConfigError::InvalidUrl("mock".to_string(), e.to_string()))?,
            api_key: Zeroizing::new(api_key.to_string()),
            environment: RemitianEnvironment::Sandbox,
            timeout_secs: 5,
        })
    }
}

/// Configuration for [`TaxJarClient`](crate::TaxJarClient).
#[derive(Clone)]
pub struct TaxApiConfig {
    pub base_url: Url,
    /// Used when a tenant's tax configuration carries no key of its own.
    pub default_api_key: Option<Zeroizing<String>>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for TaxApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxApiConfig")
            .field("base_url", &self.base_url)
            .field(
                "default_api_key",
                &self.default_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TaxApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `TAXJAR_API_URL` (default: `https://api.taxjar.com`)
    /// - `TAXJAR_API_KEY` (optional)
    /// - `TAXJAR_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_url("TAXJAR_API_URL", "https://api.taxjar.com")?,
            default_api_key: std::env::var("TAXJAR_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(Zeroizing::new),
            timeout_secs: env_secs("TAXJAR_TIMEOUT_SECS", 10),
        })
    }

    pub fn local_mock(uri: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(uri)
                .map_err(|e| ConfigError::InvalidUrl("mock".to_string(), e.to_string()))?,
            default_api_key: None,
            timeout_secs: 5,
        })
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_secs(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingApiKey(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("REMITIAN_ENVIRONMENT must be sandbox or production, got {0:?}")]
    InvalidEnvironment(String),
}
