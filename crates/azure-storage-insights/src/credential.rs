//! Credential resolution and bearer-token caching.
//!
//! A [`CredentialResolver`] turns the configured [`AuthStrategy`] into a
//! shared [`Credential`] once per process (or per explicit reconfiguration).
//! The credential caches one token per scope and refreshes it under a
//! single-flight gate, so a burst of concurrent requests on an expired token
//! performs exactly one token request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

use crate::auth::{self, ManagedIdentityEndpoint};
use crate::config::{AuthStrategy, InsightsConfig, Secret};
use crate::error::{AzureError, AzureResult};
use crate::types::AzureToken;

/// Public client id of the Azure CLI, used for the device-code flow.
pub const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// IMDS probe budget inside the default chain, where a missing metadata
/// endpoint must not stall the fallbacks.
const CHAIN_IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Token sources ───────────────────────────────────────────────────────

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken>;
}

pub struct ServicePrincipalSource {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: Secret,
}

#[async_trait]
impl TokenSource for ServicePrincipalSource {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken> {
        auth::acquire_client_credentials_token(
            &self.http,
            &self.authority_host,
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
            scope,
        )
        .await
    }
}

pub struct ManagedIdentitySource {
    http: Client,
    endpoint: ManagedIdentityEndpoint,
    client_id: Option<String>,
    probe_timeout: Option<Duration>,
}

#[async_trait]
impl TokenSource for ManagedIdentitySource {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken> {
        auth::acquire_managed_identity_token(
            &self.http,
            &self.endpoint,
            self.client_id.as_deref(),
            scope,
            self.probe_timeout,
        )
        .await
    }
}

pub struct CliSource {
    az_path: String,
    tenant_id: Option<String>,
}

#[async_trait]
impl TokenSource for CliSource {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken> {
        auth::acquire_cli_token(&self.az_path, self.tenant_id.as_deref(), scope).await
    }
}

pub struct DeviceCodeSource {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
}

#[async_trait]
impl TokenSource for DeviceCodeSource {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken> {
        let device = auth::request_device_code(
            &self.http,
            &self.authority_host,
            &self.tenant_id,
            &self.client_id,
            scope,
        )
        .await?;
        // the prompt has to reach a human; the host decides where logs go
        warn!(
            "{}",
            device.message.clone().unwrap_or_else(|| format!(
                "To sign in, open {} and enter the code {}",
                device.verification_uri, device.user_code
            ))
        );
        auth::poll_device_code(
            &self.http,
            &self.authority_host,
            &self.tenant_id,
            &self.client_id,
            &device,
        )
        .await
    }
}

/// Tries each member in order and reports every failed attempt.
pub struct ChainSource {
    members: Vec<(&'static str, Box<dyn TokenSource>)>,
}

impl ChainSource {
    pub fn new(members: Vec<(&'static str, Box<dyn TokenSource>)>) -> Self {
        Self { members }
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait]
impl TokenSource for ChainSource {
    async fn fetch_token(&self, scope: &str) -> AzureResult<AzureToken> {
        let mut attempts = Vec::with_capacity(self.members.len());
        for (name, source) in &self.members {
            match source.fetch_token(scope).await {
                Ok(token) => {
                    info!("Default credential chain: using {}", name);
                    return Ok(token);
                }
                Err(e) => {
                    debug!("Default credential chain: {} unavailable: {}", name, e.message);
                    attempts.push(json!({ "strategy": name, "message": e.message }));
                }
            }
        }
        let tried: Vec<&str> = self.member_names();
        Err(AzureError::authentication(
            AuthStrategy::Default.as_str(),
            format!("no credential in the chain succeeded (tried {})", tried.join(", ")),
        )
        .with_details(json!({ "strategy": "default", "attempts": attempts })))
    }
}

// ── Credential ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Cli,
    ManagedIdentity,
    ServicePrincipal,
    DefaultChain,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cli => "cli",
            Self::ManagedIdentity => "managed_identity",
            Self::ServicePrincipal => "service_principal",
            Self::DefaultChain => "default_chain",
        })
    }
}

/// Token-producing capability shared by every request of the process.
pub struct Credential {
    kind: CredentialKind,
    tenant_id: Option<String>,
    client_id: Option<String>,
    source: Box<dyn TokenSource>,
    tokens: RwLock<HashMap<String, AzureToken>>,
    refresh_gate: Mutex<()>,
}

impl Credential {
    pub fn new(kind: CredentialKind, source: Box<dyn TokenSource>) -> Self {
        Self {
            kind,
            tenant_id: None,
            client_id: None,
            source,
            tokens: RwLock::new(HashMap::new()),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn with_identity(mut self, tenant_id: Option<String>, client_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self.client_id = client_id;
        self
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    async fn cached(&self, scope: &str) -> Option<String> {
        self.tokens
            .read()
            .await
            .get(scope)
            .filter(|t| !t.is_expired() && !t.access_token.is_empty())
            .map(|t| t.access_token.expose().to_string())
    }

    /// A valid bearer token for `scope`, refreshed at most once concurrently.
    pub async fn access_token(&self, scope: &str) -> AzureResult<String> {
        if let Some(token) = self.cached(scope).await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // a caller ahead of us may have refreshed while we waited
        if let Some(token) = self.cached(scope).await {
            return Ok(token);
        }

        debug!("Refreshing {} token for {}", self.kind, scope);
        let token = self.source.fetch_token(scope).await?;
        let value = token.access_token.expose().to_string();
        self.tokens.write().await.insert(scope.to_string(), token);
        Ok(value)
    }

    /// Drop cached tokens; the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        self.tokens.write().await.clear();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

// ── Construction ────────────────────────────────────────────────────────

fn service_principal_source(config: &InsightsConfig, http: &Client) -> AzureResult<ServicePrincipalSource> {
    if !config.has_service_principal() {
        let missing: Vec<&str> = [
            ("AZURE_TENANT_ID", config.tenant_id.is_some()),
            ("AZURE_CLIENT_ID", config.client_id.is_some()),
            ("AZURE_CLIENT_SECRET", config.client_secret.as_ref().map(|s| !s.is_empty()).unwrap_or(false)),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
        return Err(AzureError::authentication(
            AuthStrategy::ServicePrincipal.as_str(),
            format!("missing {}", missing.join(", ")),
        ));
    }
    Ok(ServicePrincipalSource {
        http: http.clone(),
        authority_host: config.authority_host.clone(),
        tenant_id: config.tenant_id.clone().unwrap_or_default(),
        client_id: config.client_id.clone().unwrap_or_default(),
        client_secret: config.client_secret.clone().unwrap_or_default(),
    })
}

fn managed_identity_source(
    config: &InsightsConfig,
    http: &Client,
    probe_timeout: Option<Duration>,
) -> ManagedIdentitySource {
    ManagedIdentitySource {
        http: http.clone(),
        endpoint: ManagedIdentityEndpoint::detect(&config.imds_endpoint),
        client_id: config.managed_identity_client_id.clone(),
        probe_timeout,
    }
}

fn cli_source(config: &InsightsConfig) -> CliSource {
    CliSource {
        az_path: config.az_cli_path.clone(),
        tenant_id: config.tenant_id.clone(),
    }
}

/// Build the credential for `config.auth_strategy`. Performs no network I/O.
/// Service principal (when configured), managed identity, Azure CLI, then
/// device code when interactive sign-in is enabled.
pub fn default_chain(config: &InsightsConfig, http: &Client) -> AzureResult<ChainSource> {
    let mut members: Vec<(&'static str, Box<dyn TokenSource>)> = Vec::new();
    if config.has_service_principal() {
        members.push(("service_principal", Box::new(service_principal_source(config, http)?)));
    }
    members.push((
        "managed_identity",
        Box::new(managed_identity_source(config, http, Some(CHAIN_IMDS_PROBE_TIMEOUT))),
    ));
    members.push(("cli", Box::new(cli_source(config))));
    if config.enable_interactive {
        members.push((
            "interactive",
            Box::new(DeviceCodeSource {
                http: http.clone(),
                authority_host: config.authority_host.clone(),
                tenant_id: config
                    .tenant_id
                    .clone()
                    .unwrap_or_else(|| "organizations".into()),
                client_id: AZURE_CLI_CLIENT_ID.into(),
            }),
        ));
    }
    Ok(ChainSource::new(members))
}

pub fn build_credential(config: &InsightsConfig, http: &Client) -> AzureResult<Credential> {
    let identity = (config.tenant_id.clone(), config.client_id.clone());
    let credential = match config.auth_strategy {
        AuthStrategy::ServicePrincipal => Credential::new(
            CredentialKind::ServicePrincipal,
            Box::new(service_principal_source(config, http)?),
        ),
        AuthStrategy::ManagedIdentity => Credential::new(
            CredentialKind::ManagedIdentity,
            Box::new(managed_identity_source(config, http, None)),
        ),
        AuthStrategy::Cli => Credential::new(CredentialKind::Cli, Box::new(cli_source(config))),
        AuthStrategy::Default => Credential::new(
            CredentialKind::DefaultChain,
            Box::new(default_chain(config, http)?),
        ),
    };
    Ok(credential.with_identity(identity.0, identity.1))
}

// ── Resolver ────────────────────────────────────────────────────────────

struct ResolverState {
    config: InsightsConfig,
    credential: Option<Arc<Credential>>,
}

/// Lazily builds and caches the process credential.
pub struct CredentialResolver {
    http: Client,
    state: Mutex<ResolverState>,
}

impl CredentialResolver {
    pub fn new(config: InsightsConfig, http: Client) -> Self {
        Self {
            http,
            state: Mutex::new(ResolverState {
                config,
                credential: None,
            }),
        }
    }

    /// Resolver pre-seeded with an already built credential.
    pub fn with_credential(config: InsightsConfig, http: Client, credential: Arc<Credential>) -> Self {
        Self {
            http,
            state: Mutex::new(ResolverState {
                config,
                credential: Some(credential),
            }),
        }
    }

    pub async fn strategy(&self) -> AuthStrategy {
        self.state.lock().await.config.auth_strategy
    }

    /// The cached credential, building it on first use. Failures are not
    /// cached, so the next call tries again.
    pub async fn resolve(&self) -> AzureResult<Arc<Credential>> {
        let mut state = self.state.lock().await;
        if let Some(credential) = &state.credential {
            return Ok(Arc::clone(credential));
        }
        let credential = Arc::new(build_credential(&state.config, &self.http)?);
        info!(
            "Resolved {} credential for strategy '{}'",
            credential.kind(),
            state.config.auth_strategy
        );
        state.credential = Some(Arc::clone(&credential));
        Ok(credential)
    }

    /// Switch strategy and drop the cached credential.
    pub async fn reconfigure(&self, strategy: AuthStrategy) {
        let mut state = self.state.lock().await;
        info!(
            "Authentication strategy changed: {} → {}",
            state.config.auth_strategy, strategy
        );
        state.config.auth_strategy = strategy;
        state.credential = None;
    }
}
