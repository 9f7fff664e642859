//! In-memory management surfaces and fixtures for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::{InsightsConfig, Secret};
use crate::credential::{Credential, CredentialKind, CredentialResolver, TokenSource};
use crate::error::{AzureError, AzureResult};
use crate::factory::{ClientFactory, ManagementClients, MonitorApi, NetworkApi, StorageApi};
use crate::service::StorageInsights;
use crate::types::{
    AzureToken, RawBlobServiceProperties, RawDeletedAccount, RawDiagnosticSetting,
    RawMetricDefinition, RawMetricResponse, RawNetworkInterface, RawNetworkRuleSet,
    RawPrivateDnsZoneGroup, RawPrivateEndpoint, RawPrivateEndpointConnection, RawStorageAccount,
    RawStorageAccountKey,
};
use crate::validation;

pub const SUB: &str = "00000000-0000-0000-0000-000000000001";

/// Always hands out the same long-lived token.
pub struct StaticTokenSource {
    token: String,
    calls: AtomicUsize,
}

impl StaticTokenSource {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self, _scope: &str) -> AzureResult<AzureToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AzureToken {
            access_token: Secret::new(self.token.clone()),
            token_type: "Bearer".into(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        })
    }
}

pub fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture must deserialize")
}

pub fn raw_account(name: &str, resource_group: &str, location: &str) -> RawStorageAccount {
    from_json(json!({
        "id": format!("/subscriptions/{SUB}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}"),
        "name": name,
        "location": location,
        "kind": "StorageV2",
        "sku": { "name": "Standard_LRS", "tier": "Standard" },
        "properties": {
            "provisioningState": "Succeeded",
            "creationTime": "2024-01-15T10:00:00Z",
            "statusOfPrimary": "available",
            "accessTier": "Hot",
            "supportsHttpsTrafficOnly": true,
            "allowBlobPublicAccess": false,
            "keyCreationTime": { "key1": "2024-01-15T10:00:00Z", "key2": "2024-01-15T10:00:00Z" }
        }
    }))
}

pub fn not_found(what: &str) -> AzureError {
    AzureError::from_status(
        404,
        &json!({ "error": { "code": "ResourceNotFound", "message": format!("{what} was not found") } }).to_string(),
    )
}

pub fn throttled() -> AzureError {
    AzureError::from_status(
        429,
        &json!({ "error": { "code": "TooManyRequests", "message": "Rate limit exceeded" } }).to_string(),
    )
}

pub fn forbidden() -> AzureError {
    AzureError::from_status(
        403,
        &json!({ "error": { "code": "AuthorizationFailed", "message": "no read access" } }).to_string(),
    )
}

/// Per-operation delays and a log of every call made.
#[derive(Default)]
pub struct CallLog {
    delays: HashMap<&'static str, Duration>,
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    async fn step(&self, op: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op.to_string());
        }
        if let Some(delay) = self.delays.get(op) {
            tokio::time::sleep(*delay).await;
        }
    }

    pub fn delay(&mut self, op: &'static str, delay: Duration) {
        self.delays.insert(op, delay);
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| c.as_str() == op).count())
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

pub struct FakeStorage {
    pub accounts: AzureResult<Vec<RawStorageAccount>>,
    pub deleted: AzureResult<Vec<RawDeletedAccount>>,
    pub properties: AzureResult<RawStorageAccount>,
    pub network_rules: AzureResult<Option<RawNetworkRuleSet>>,
    pub blob_service: AzureResult<Option<RawBlobServiceProperties>>,
    pub endpoints: AzureResult<Vec<RawPrivateEndpointConnection>>,
    pub keys: AzureResult<Vec<RawStorageAccountKey>>,
    pub log: CallLog,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            accounts: Ok(Vec::new()),
            deleted: Ok(Vec::new()),
            properties: Ok(raw_account("acct1", "rg1", "eastus")),
            network_rules: Ok(None),
            blob_service: Ok(None),
            endpoints: Ok(Vec::new()),
            keys: Ok(Vec::new()),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl StorageApi for FakeStorage {
    async fn list_accounts(&self, _resource_group: Option<&str>) -> AzureResult<Vec<RawStorageAccount>> {
        self.log.step("list_accounts").await;
        self.accounts.clone()
    }

    async fn list_deleted_accounts(&self) -> AzureResult<Vec<RawDeletedAccount>> {
        self.log.step("list_deleted_accounts").await;
        self.deleted.clone()
    }

    async fn get_properties(&self, _rg: &str, _name: &str) -> AzureResult<RawStorageAccount> {
        self.log.step("get_properties").await;
        self.properties.clone()
    }

    async fn get_network_rule_set(&self, _rg: &str, _name: &str) -> AzureResult<Option<RawNetworkRuleSet>> {
        self.log.step("get_network_rule_set").await;
        self.network_rules.clone()
    }

    async fn get_blob_service_properties(
        &self,
        _rg: &str,
        _name: &str,
    ) -> AzureResult<Option<RawBlobServiceProperties>> {
        self.log.step("get_blob_service_properties").await;
        self.blob_service.clone()
    }

    async fn list_private_endpoint_connections(
        &self,
        _rg: &str,
        _name: &str,
    ) -> AzureResult<Vec<RawPrivateEndpointConnection>> {
        self.log.step("list_private_endpoint_connections").await;
        self.endpoints.clone()
    }

    async fn list_keys(&self, _rg: &str, _name: &str) -> AzureResult<Vec<RawStorageAccountKey>> {
        self.log.step("list_keys").await;
        self.keys.clone()
    }
}

pub struct FakeMonitor {
    pub definitions: AzureResult<Vec<RawMetricDefinition>>,
    /// Keyed by metric name; missing names answer with an empty response.
    pub metrics: HashMap<String, AzureResult<RawMetricResponse>>,
    pub diagnostics: AzureResult<Vec<RawDiagnosticSetting>>,
    /// Per-metric delays.
    pub metric_delays: HashMap<String, Duration>,
    pub log: CallLog,
}

impl Default for FakeMonitor {
    fn default() -> Self {
        Self {
            definitions: Ok(Vec::new()),
            metrics: HashMap::new(),
            diagnostics: Ok(Vec::new()),
            metric_delays: HashMap::new(),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl MonitorApi for FakeMonitor {
    async fn list_metric_definitions(&self, _resource_id: &str) -> AzureResult<Vec<RawMetricDefinition>> {
        self.log.step("list_metric_definitions").await;
        self.definitions.clone()
    }

    async fn query_metric(
        &self,
        _resource_id: &str,
        metric: &str,
        _timespan: &str,
        _interval: &str,
        _aggregation: &str,
    ) -> AzureResult<RawMetricResponse> {
        self.log.step("query_metric").await;
        if let Some(delay) = self.metric_delays.get(metric) {
            tokio::time::sleep(*delay).await;
        }
        self.metrics
            .get(metric)
            .cloned()
            .unwrap_or_else(|| Ok(RawMetricResponse::default()))
    }

    async fn list_diagnostic_settings(&self, _resource_id: &str) -> AzureResult<Vec<RawDiagnosticSetting>> {
        self.log.step("list_diagnostic_settings").await;
        self.diagnostics.clone()
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    /// Keyed by full resource id; missing ids answer NotFound.
    pub endpoints: HashMap<String, AzureResult<RawPrivateEndpoint>>,
    pub interfaces: HashMap<String, AzureResult<RawNetworkInterface>>,
    pub dns_zone_groups: HashMap<String, AzureResult<Vec<RawPrivateDnsZoneGroup>>>,
    pub log: CallLog,
}

fn lookup<T: Clone>(map: &HashMap<String, AzureResult<T>>, id: &str) -> AzureResult<T> {
    map.get(id).cloned().unwrap_or_else(|| Err(not_found(id)))
}

#[async_trait]
impl NetworkApi for FakeNetwork {
    async fn get_private_endpoint(&self, resource_id: &str) -> AzureResult<RawPrivateEndpoint> {
        self.log.step("get_private_endpoint").await;
        lookup(&self.endpoints, resource_id)
    }

    async fn get_network_interface(&self, resource_id: &str) -> AzureResult<RawNetworkInterface> {
        self.log.step("get_network_interface").await;
        lookup(&self.interfaces, resource_id)
    }

    async fn list_private_dns_zone_groups(&self, private_endpoint_id: &str) -> AzureResult<Vec<RawPrivateDnsZoneGroup>> {
        self.log.step("list_private_dns_zone_groups").await;
        lookup(&self.dns_zone_groups, private_endpoint_id)
    }
}

pub struct FakeFactory {
    pub storage: Arc<FakeStorage>,
    pub monitor: Arc<FakeMonitor>,
    pub network: Arc<FakeNetwork>,
}

impl FakeFactory {
    pub fn new(storage: FakeStorage, monitor: FakeMonitor, network: FakeNetwork) -> Self {
        Self {
            storage: Arc::new(storage),
            monitor: Arc::new(monitor),
            network: Arc::new(network),
        }
    }

    /// Total calls across all three surfaces.
    pub fn calls(&self) -> usize {
        self.storage.log.total() + self.monitor.log.total() + self.network.log.total()
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, _credential: Arc<Credential>, subscription_id: &str) -> AzureResult<ManagementClients> {
        validation::validate_subscription_id(subscription_id)?;
        Ok(ManagementClients {
            subscription_id: subscription_id.to_string(),
            storage: self.storage.clone(),
            monitor: self.monitor.clone(),
            network: self.network.clone(),
        })
    }
}

/// Service wired to `factory` with a static credential.
pub fn insights(factory: Arc<FakeFactory>, query_timeout: Duration) -> StorageInsights {
    let credential = Arc::new(Credential::new(
        CredentialKind::Cli,
        Box::new(StaticTokenSource::new("test-token")),
    ));
    let resolver = Arc::new(CredentialResolver::with_credential(
        InsightsConfig::default(),
        Client::new(),
        credential,
    ));
    StorageInsights::with_parts(resolver, factory, query_timeout)
}
