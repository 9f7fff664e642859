//! Per-subscription management clients.
//!
//! The orchestrator only talks to the three read-only surfaces below; the
//! [`ClientFactory`] binds them to a credential and a subscription.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::client::ArmClient;
use crate::config::{ApiVersions, InsightsConfig, RetryConfig};
use crate::credential::Credential;
use crate::error::AzureResult;
use crate::monitor::MonitorClient;
use crate::networking::NetworkClient;
use crate::storage::StorageClient;
use crate::types::{
    RawBlobServiceProperties, RawDeletedAccount, RawDiagnosticSetting, RawMetricDefinition,
    RawMetricResponse, RawNetworkInterface, RawNetworkRuleSet, RawPrivateDnsZoneGroup,
    RawPrivateEndpoint, RawPrivateEndpointConnection, RawStorageAccount, RawStorageAccountKey,
};
use crate::validation;

/// Microsoft.Storage, scoped to one subscription.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Accounts in the subscription, or in `resource_group` when given.
    async fn list_accounts(&self, resource_group: Option<&str>) -> AzureResult<Vec<RawStorageAccount>>;
    async fn list_deleted_accounts(&self) -> AzureResult<Vec<RawDeletedAccount>>;
    async fn get_properties(&self, resource_group: &str, account_name: &str) -> AzureResult<RawStorageAccount>;
    /// `None` when the account reports no `networkAcls` at all.
    async fn get_network_rule_set(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Option<RawNetworkRuleSet>>;
    async fn get_blob_service_properties(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Option<RawBlobServiceProperties>>;
    async fn list_private_endpoint_connections(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Vec<RawPrivateEndpointConnection>>;
    /// Key metadata only; key values are discarded on decode.
    async fn list_keys(&self, resource_group: &str, account_name: &str) -> AzureResult<Vec<RawStorageAccountKey>>;
}

/// Microsoft.Insights for a single resource id.
#[async_trait]
pub trait MonitorApi: Send + Sync {
    async fn list_metric_definitions(&self, resource_id: &str) -> AzureResult<Vec<RawMetricDefinition>>;
    async fn query_metric(
        &self,
        resource_id: &str,
        metric: &str,
        timespan: &str,
        interval: &str,
        aggregation: &str,
    ) -> AzureResult<RawMetricResponse>;
    async fn list_diagnostic_settings(&self, resource_id: &str) -> AzureResult<Vec<RawDiagnosticSetting>>;
}

/// Microsoft.Network lookups by full resource id.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn get_private_endpoint(&self, resource_id: &str) -> AzureResult<RawPrivateEndpoint>;
    async fn get_network_interface(&self, resource_id: &str) -> AzureResult<RawNetworkInterface>;
    async fn list_private_dns_zone_groups(&self, private_endpoint_id: &str) -> AzureResult<Vec<RawPrivateDnsZoneGroup>>;
}

/// The three surfaces bound to one subscription.
#[derive(Clone)]
pub struct ManagementClients {
    pub subscription_id: String,
    pub storage: Arc<dyn StorageApi>,
    pub monitor: Arc<dyn MonitorApi>,
    pub network: Arc<dyn NetworkApi>,
}

impl ManagementClients {
    /// ARM id of a storage account in this subscription.
    pub fn account_resource_id(&self, resource_group: &str, account_name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.subscription_id, resource_group, account_name
        )
    }
}

impl fmt::Debug for ManagementClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementClients")
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}

pub trait ClientFactory: Send + Sync {
    /// Cheap and synchronous; performs no I/O.
    fn create(&self, credential: Arc<Credential>, subscription_id: &str) -> AzureResult<ManagementClients>;
}

/// Factory producing ARM-backed surfaces.
pub struct ArmClientFactory {
    http: Client,
    base_url: String,
    api_versions: ApiVersions,
    retry: RetryConfig,
}

impl ArmClientFactory {
    pub fn new(config: &InsightsConfig, http: Client) -> Self {
        Self {
            http,
            base_url: config.arm_base_url.clone(),
            api_versions: config.api_versions.clone(),
            retry: config.retry.clone(),
        }
    }
}

impl ClientFactory for ArmClientFactory {
    fn create(&self, credential: Arc<Credential>, subscription_id: &str) -> AzureResult<ManagementClients> {
        validation::validate_subscription_id(subscription_id)?;
        debug!("Creating management clients for subscription {}", subscription_id);

        let arm = Arc::new(ArmClient::new(
            self.http.clone(),
            credential,
            &self.base_url,
            self.retry.clone(),
        ));
        Ok(ManagementClients {
            subscription_id: subscription_id.to_string(),
            storage: Arc::new(StorageClient::new(
                arm.clone(),
                subscription_id,
                &self.api_versions.storage,
            )),
            monitor: Arc::new(MonitorClient::new(arm.clone(), &self.api_versions)),
            network: Arc::new(NetworkClient::new(arm, &self.api_versions.network)),
        })
    }
}
