//! Runtime configuration: authentication strategy, endpoints, API versions,
//! timeouts and retry behaviour.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AzureError, AzureErrorKind, AzureResult};
use crate::types::{ARM_BASE, AUTHORITY_HOST, IMDS_ENDPOINT};

pub const ENV_AUTH_METHOD: &str = "AZURE_AUTH_METHOD";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const ENV_ENABLE_INTERACTIVE: &str = "AZURE_ENABLE_INTERACTIVE";
pub const ENV_QUERY_TIMEOUT: &str = "AZURE_STORAGE_INSIGHTS_TIMEOUT_SECS";

/// Upper bound for the per-query deadline (one day).
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 86_400;

// ── Secret ──────────────────────────────────────────────────────────────

/// String that never shows up in `Debug` output or serialized config.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

// ── Auth strategy ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Service principal from env → managed identity → CLI → interactive.
    #[default]
    Default,
    Cli,
    ManagedIdentity,
    ServicePrincipal,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Cli => "cli",
            Self::ManagedIdentity => "managed_identity",
            Self::ServicePrincipal => "service_principal",
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthStrategy {
    type Err = AzureError;

    fn from_str(s: &str) -> AzureResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "cli" => Ok(Self::Cli),
            "managed_identity" | "msi" => Ok(Self::ManagedIdentity),
            "service_principal" => Ok(Self::ServicePrincipal),
            other => Err(AzureError::authentication(
                other,
                "unknown authentication method (expected default, cli, managed_identity or service_principal)",
            )),
        }
    }
}

// ── Retry ───────────────────────────────────────────────────────────────

/// Bounded exponential backoff with full jitter for throttled/transient calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, first one included (default: 3).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Upper bound of the delay before retry number `attempt` (0-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> u64 {
        let exponential = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        exponential.min(self.max_backoff_ms)
    }

    /// Full jitter: uniform in `0..=ceiling`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = self.backoff_ceiling(attempt);
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=capped))
    }
}

// ── API versions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiVersions {
    pub storage: String,
    pub metrics: String,
    pub metric_definitions: String,
    pub diagnostic_settings: String,
    pub network: String,
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            storage: "2023-05-01".into(),
            metrics: "2023-10-01".into(),
            metric_definitions: "2018-01-01".into(),
            diagnostic_settings: "2021-05-01-preview".into(),
            network: "2024-01-01".into(),
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub auth_strategy: AuthStrategy,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    /// User-assigned identity to request tokens for.
    pub managed_identity_client_id: Option<String>,
    /// Allow the device-code flow as the last resort of the default chain.
    pub enable_interactive: bool,
    pub arm_base_url: String,
    pub authority_host: String,
    pub imds_endpoint: String,
    /// Executable used for the CLI strategy.
    pub az_cli_path: String,
    pub api_versions: ApiVersions,
    pub http_timeout_secs: u64,
    /// Overall deadline for one query, sub-calls included.
    pub query_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            auth_strategy: AuthStrategy::Default,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            managed_identity_client_id: None,
            enable_interactive: false,
            arm_base_url: ARM_BASE.into(),
            authority_host: AUTHORITY_HOST.into(),
            imds_endpoint: IMDS_ENDPOINT.into(),
            az_cli_path: "az".into(),
            api_versions: ApiVersions::default(),
            http_timeout_secs: 30,
            query_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl InsightsConfig {
    /// Defaults overlaid with the `AZURE_*` environment variables.
    pub fn from_env() -> AzureResult<Self> {
        let mut config = Self::default();

        if let Some(method) = env_var(ENV_AUTH_METHOD) {
            config.auth_strategy = method.parse()?;
        }
        config.tenant_id = env_var(ENV_TENANT_ID);
        config.client_id = env_var(ENV_CLIENT_ID);
        config.client_secret = env_var(ENV_CLIENT_SECRET).map(Secret::new);
        config.enable_interactive = env_var(ENV_ENABLE_INTERACTIVE)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if let Some(raw) = env_var(ENV_QUERY_TIMEOUT) {
            config.query_timeout_secs = raw.parse().map_err(|_| {
                AzureError::validation(ENV_QUERY_TIMEOUT, format!("'{raw}' is not a number of seconds"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Tenant, client id and secret are all present.
    pub fn has_service_principal(&self) -> bool {
        let present = |v: Option<&str>| v.map(|s| !s.is_empty()).unwrap_or(false);
        present(self.tenant_id.as_deref())
            && present(self.client_id.as_deref())
            && present(self.client_secret.as_ref().map(Secret::expose))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn validate(&self) -> AzureResult<()> {
        for (field, value) in [
            ("arm_base_url", &self.arm_base_url),
            ("authority_host", &self.authority_host),
            ("imds_endpoint", &self.imds_endpoint),
        ] {
            url::Url::parse(value)
                .map_err(|e| AzureError::validation(field, format!("'{value}': {e}")))?;
        }
        if self.query_timeout_secs == 0 || self.query_timeout_secs > MAX_QUERY_TIMEOUT_SECS {
            return Err(AzureError::validation(
                "query_timeout_secs",
                format!("must be between 1 and {MAX_QUERY_TIMEOUT_SECS}"),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(AzureError::validation("http_timeout_secs", "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AzureError::validation("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(AzureError::new(
                AzureErrorKind::Validation,
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
