//! Central service façade for the storage insight queries.
//!
//! Each query validates its inputs, resolves the shared credential, binds the
//! management surfaces to the requested subscription and fans out to the
//! provider. Mandatory calls fail the whole query; optional ones degrade a
//! single section and are reported as partial failures.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use log::{info, warn};
use reqwest::Client;
use tokio::time::Instant;

use crate::config::{AuthStrategy, InsightsConfig, MAX_QUERY_TIMEOUT_SECS};
use crate::credential::CredentialResolver;
use crate::envelope::{Outcome, RequestContext, ToolResult};
use crate::error::{AzureError, AzureResult};
use crate::factory::{ArmClientFactory, ClientFactory, ManagementClients};
use crate::fanout::{self, within, PartialFailures};
use crate::models::{
    AccountRequest, AggregationType, ListStorageAccountsRequest, NetworkInterfaceInfo, NetworkRules,
    PrivateEndpointConnection, PrivateEndpointList, StorageAccountDetails,
    StorageAccountDetailsRequest, StorageAccountList, StorageMetrics, StorageMetricsRequest,
    TimeRange,
};
use crate::normalize;
use crate::summary;
use crate::types::ARM_SCOPE;
use crate::validation;

/// Read-only Azure Storage insight queries.
pub struct StorageInsights {
    resolver: Arc<CredentialResolver>,
    factory: Arc<dyn ClientFactory>,
    query_timeout: Duration,
}

impl StorageInsights {
    pub fn new(config: InsightsConfig) -> AzureResult<Self> {
        config.validate()?;
        let http = Client::builder().timeout(config.http_timeout()).build()?;
        let factory = Arc::new(ArmClientFactory::new(&config, http.clone()));
        let query_timeout = config.query_timeout();
        Ok(Self {
            resolver: Arc::new(CredentialResolver::new(config, http)),
            factory,
            query_timeout,
        })
    }

    /// Configuration from the `AZURE_*` environment variables.
    pub fn from_env() -> AzureResult<Self> {
        Self::new(InsightsConfig::from_env()?)
    }

    pub fn with_parts(
        resolver: Arc<CredentialResolver>,
        factory: Arc<dyn ClientFactory>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            factory,
            query_timeout,
        }
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    // ── Auth ─────────────────────────────────────────────────────────

    pub async fn set_auth_strategy(&self, strategy: AuthStrategy) {
        self.resolver.reconfigure(strategy).await;
    }

    /// Acquire one ARM token; `false` instead of an error on failure.
    pub async fn test_authentication(&self) -> bool {
        let result = match self.resolver.resolve().await {
            Ok(credential) => credential.access_token(ARM_SCOPE).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                info!("Azure authentication test succeeded");
                true
            }
            Err(e) => {
                warn!("Azure authentication test failed: {}", e);
                false
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn deadline(&self) -> Instant {
        Instant::now() + self.query_timeout.min(Duration::from_secs(MAX_QUERY_TIMEOUT_SECS))
    }

    async fn clients(&self, subscription_id: &str) -> AzureResult<ManagementClients> {
        let credential = self.resolver.resolve().await?;
        self.factory.create(credential, subscription_id)
    }

    // ── Storage accounts ─────────────────────────────────────────────

    pub async fn list_storage_accounts(&self, req: &ListStorageAccountsRequest) -> ToolResult<StorageAccountList> {
        let ctx = RequestContext::new("list_storage_accounts");
        ctx.respond(self.run_list_storage_accounts(req).await)
    }

    async fn run_list_storage_accounts(&self, req: &ListStorageAccountsRequest) -> Outcome<StorageAccountList> {
        validation::validate_subscription_id(&req.subscription_id)?;
        if let Some(rg) = &req.resource_group {
            validation::validate_resource_group(rg)?;
        }

        let deadline = self.deadline();
        let clients = self.clients(&req.subscription_id).await?;
        let rg = req.resource_group.as_deref();

        let accounts = within(deadline, fanout::STORAGE_ACCOUNTS, clients.storage.list_accounts(rg));
        let deleted = async {
            if req.include_deleted {
                clients.storage.list_deleted_accounts().await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (accounts, deleted) = tokio::join!(accounts, within(deadline, fanout::DELETED_ACCOUNTS, deleted));
        let accounts = accounts?;

        let mut failures = PartialFailures::new();
        let mut summaries: Vec<_> = accounts.iter().map(normalize::account_summary).collect();
        if let Some(deleted) = failures.capture(fanout::DELETED_ACCOUNTS, deleted).flatten() {
            summaries.extend(
                deleted
                    .iter()
                    .map(normalize::deleted_account_summary)
                    .filter(|a| rg.map_or(true, |rg| a.resource_group.eq_ignore_ascii_case(rg))),
            );
        }
        let partials = failures.finish()?;

        let list = StorageAccountList {
            total_count: summaries.len(),
            storage_accounts: summaries,
        };
        let text = summary::with_partial_failures(summary::account_list(&list, rg), &partials);
        Ok((list, text, partials))
    }

    pub async fn get_storage_account_details(
        &self,
        req: &StorageAccountDetailsRequest,
    ) -> ToolResult<StorageAccountDetails> {
        let ctx = RequestContext::new("get_storage_account_details");
        ctx.respond(self.run_get_storage_account_details(req).await)
    }

    async fn run_get_storage_account_details(
        &self,
        req: &StorageAccountDetailsRequest,
    ) -> Outcome<StorageAccountDetails> {
        let (sub, rg, name) = (&req.subscription_id, &req.resource_group, &req.account_name);
        validation::validate_account_scope(sub, rg, name)?;

        let deadline = self.deadline();
        let clients = self.clients(sub).await?;
        let resource_id = clients.account_resource_id(rg, name);

        let raw = within(deadline, fanout::PROPERTIES, clients.storage.get_properties(rg, name)).await?;
        let kind = normalize::account_kind(&raw);

        let blob = async {
            if normalize::supports_blob_service(&kind) {
                clients.storage.get_blob_service_properties(rg, name).await
            } else {
                Ok(None)
            }
        };
        let keys = async {
            if req.include_keys {
                clients.storage.list_keys(rg, name).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (network, blob, endpoints, diagnostics, keys) = tokio::join!(
            within(deadline, fanout::NETWORK_RULES, clients.storage.get_network_rule_set(rg, name)),
            within(deadline, fanout::BLOB_SERVICE_PROPERTIES, blob),
            within(
                deadline,
                fanout::PRIVATE_ENDPOINTS,
                clients.storage.list_private_endpoint_connections(rg, name)
            ),
            within(
                deadline,
                fanout::DIAGNOSTIC_SETTINGS,
                clients.monitor.list_diagnostic_settings(&resource_id)
            ),
            within(deadline, fanout::ACCESS_POLICIES, keys),
        );

        let key_policy = raw.properties.as_ref().and_then(|p| p.key_policy.as_ref());
        let mut failures = PartialFailures::new();
        let details = StorageAccountDetails {
            basic_properties: normalize::basic_properties(&raw, sub, rg),
            security_settings: normalize::security_settings(&raw),
            network_configuration: failures.section(
                fanout::NETWORK_RULES,
                network.map(|acls| normalize::network_rules(acls.as_ref())),
            ),
            blob_service_properties: failures.section(
                fanout::BLOB_SERVICE_PROPERTIES,
                blob.map(|props| normalize::blob_service(props.as_ref(), &kind)),
            ),
            private_endpoints: failures.section(
                fanout::PRIVATE_ENDPOINTS,
                endpoints.map(|list| list.iter().map(normalize::private_endpoint_connection).collect()),
            ),
            access_policies: failures.section(
                fanout::ACCESS_POLICIES,
                keys.map(|keys| match keys {
                    Some(keys) => normalize::access_policies_from_keys(&keys, key_policy),
                    None => normalize::access_policies_from_account(&raw),
                }),
            ),
            diagnostic_settings: failures.section(
                fanout::DIAGNOSTIC_SETTINGS,
                diagnostics.map(|settings| normalize::diagnostic_settings(&settings)),
            ),
        };
        let partials = failures.finish()?;

        let text = summary::with_partial_failures(summary::account_details(&details), &partials);
        Ok((details, text, partials))
    }

    // ── Network ──────────────────────────────────────────────────────

    pub async fn get_network_rules(&self, req: &AccountRequest) -> ToolResult<NetworkRules> {
        let ctx = RequestContext::new("get_network_rules");
        ctx.respond(self.run_get_network_rules(req).await)
    }

    async fn run_get_network_rules(&self, req: &AccountRequest) -> Outcome<NetworkRules> {
        let (sub, rg, name) = (&req.subscription_id, &req.resource_group, &req.account_name);
        validation::validate_account_scope(sub, rg, name)?;

        let deadline = self.deadline();
        let clients = self.clients(sub).await?;
        let acls = within(deadline, fanout::NETWORK_RULES, clients.storage.get_network_rule_set(rg, name)).await?;

        let rules = normalize::network_rules(acls.as_ref());
        let text = summary::network_rules(&rules, name);
        Ok((rules, text, Vec::new()))
    }

    pub async fn get_private_endpoints(&self, req: &AccountRequest) -> ToolResult<PrivateEndpointList> {
        let ctx = RequestContext::new("get_private_endpoints");
        ctx.respond(self.run_get_private_endpoints(req).await)
    }

    async fn run_get_private_endpoints(&self, req: &AccountRequest) -> Outcome<PrivateEndpointList> {
        let (sub, rg, name) = (&req.subscription_id, &req.resource_group, &req.account_name);
        validation::validate_account_scope(sub, rg, name)?;

        let deadline = self.deadline();
        let clients = self.clients(sub).await?;
        let raw = within(
            deadline,
            fanout::PRIVATE_ENDPOINTS,
            clients.storage.list_private_endpoint_connections(rg, name),
        )
        .await?;

        let connections: Vec<PrivateEndpointConnection> =
            raw.iter().map(normalize::private_endpoint_connection).collect();
        let lookups = join_all(
            connections
                .iter()
                .map(|conn| enrich_endpoint(&clients, deadline, conn)),
        )
        .await;

        let mut failures = PartialFailures::new();
        let mut private_endpoints = Vec::with_capacity(connections.len());
        for (mut conn, lookup) in connections.into_iter().zip(lookups) {
            if let Some((nic, zones)) = lookup {
                conn.network_interface = failures
                    .capture(&fanout::endpoint_section(&conn.name, "network_interface"), nic)
                    .flatten();
                conn.dns_zones = failures
                    .capture(&fanout::endpoint_section(&conn.name, "dns_zones"), zones)
                    .unwrap_or_default();
            }
            private_endpoints.push(conn);
        }
        let partials = failures.finish()?;

        let list = PrivateEndpointList {
            total_count: private_endpoints.len(),
            private_endpoints,
        };
        let text = summary::with_partial_failures(summary::private_endpoints(&list, name), &partials);
        Ok((list, text, partials))
    }

    // ── Metrics ──────────────────────────────────────────────────────

    pub async fn get_storage_metrics(&self, req: &StorageMetricsRequest) -> ToolResult<StorageMetrics> {
        let ctx = RequestContext::new("get_storage_metrics");
        ctx.respond(self.run_get_storage_metrics(req).await)
    }

    async fn run_get_storage_metrics(&self, req: &StorageMetricsRequest) -> Outcome<StorageMetrics> {
        let (sub, rg, name) = (&req.subscription_id, &req.resource_group, &req.account_name);
        validation::validate_account_scope(sub, rg, name)?;
        let time_range: TimeRange = req.time_range.parse()?;
        let aggregation: AggregationType = req.aggregation_type.parse()?;
        validation::validate_interval(&req.interval)?;
        let metrics = distinct_metrics(&req.metrics)?;

        let (start, end) = time_range.window(Utc::now());
        let timespan = format!(
            "{}/{}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let deadline = self.deadline();
        let clients = self.clients(sub).await?;
        let resource_id = clients.account_resource_id(rg, name);

        let queries = join_all(metrics.iter().map(|metric| {
            within(
                deadline,
                fanout::metric_section(metric),
                clients
                    .monitor
                    .query_metric(&resource_id, metric, &timespan, &req.interval, aggregation.as_str()),
            )
        }));
        let definitions = within(
            deadline,
            fanout::AVAILABLE_METRICS,
            clients.monitor.list_metric_definitions(&resource_id),
        );
        let (results, definitions) = tokio::join!(queries, definitions);

        let mut failures = PartialFailures::new();
        let mut metrics_data = BTreeMap::new();
        let mut units = BTreeMap::new();
        let mut aggregated_summary = BTreeMap::new();
        for (metric, result) in metrics.iter().zip(results) {
            let Some(raw) = failures.capture(&fanout::metric_section(metric), result) else {
                continue;
            };
            let (points, unit) = normalize::metric_series(&raw, metric, aggregation);
            aggregated_summary.insert(metric.clone(), normalize::aggregate(&points, aggregation));
            if let Some(unit) = unit {
                units.insert(metric.clone(), unit);
            }
            metrics_data.insert(metric.clone(), points);
        }
        let available_metrics = failures.section(
            fanout::AVAILABLE_METRICS,
            definitions.map(|defs| defs.iter().map(normalize::metric_definition).collect()),
        );
        let partials = failures.finish()?;

        let data = StorageMetrics {
            account_name: name.clone(),
            time_range,
            start_time: start,
            end_time: end,
            aggregation_type: aggregation,
            interval: req.interval.clone(),
            metrics_data,
            units,
            aggregated_summary,
            available_metrics,
        };
        let text = summary::with_partial_failures(summary::metrics(&data, &metrics), &partials);
        Ok((data, text, partials))
    }
}

type EndpointLookup = (AzureResult<Option<NetworkInterfaceInfo>>, AzureResult<Vec<String>>);

/// NIC and DNS zones of one connection; `None` when it names no endpoint.
async fn enrich_endpoint(
    clients: &ManagementClients,
    deadline: Instant,
    conn: &PrivateEndpointConnection,
) -> Option<EndpointLookup> {
    let endpoint_id = conn.private_endpoint_id.as_deref()?;
    let zones = async {
        clients
            .network
            .list_private_dns_zone_groups(endpoint_id)
            .await
            .map(|groups| normalize::dns_zones(&groups))
    };

    Some(tokio::join!(
        within(
            deadline,
            fanout::endpoint_section(&conn.name, "network_interface"),
            endpoint_interface(clients, endpoint_id)
        ),
        within(deadline, fanout::endpoint_section(&conn.name, "dns_zones"), zones),
    ))
}

/// First NIC attached to the private endpoint.
async fn endpoint_interface(
    clients: &ManagementClients,
    endpoint_id: &str,
) -> AzureResult<Option<NetworkInterfaceInfo>> {
    let endpoint = clients.network.get_private_endpoint(endpoint_id).await?;
    let nic_id = endpoint
        .properties
        .and_then(|p| p.network_interfaces.into_iter().find_map(|n| n.id));
    let Some(nic_id) = nic_id else {
        return Ok(None);
    };
    let raw = clients.network.get_network_interface(&nic_id).await?;
    Ok(Some(normalize::network_interface_info(&raw)))
}

/// Validated metric names in request order, duplicates dropped.
fn distinct_metrics(requested: &[String]) -> AzureResult<Vec<String>> {
    if requested.is_empty() {
        return Err(AzureError::validation("metrics", "at least one metric name is required"));
    }
    let mut out: Vec<String> = Vec::with_capacity(requested.len());
    for metric in requested {
        validation::validate_metric_name(metric)?;
        if !out.contains(metric) {
            out.push(metric.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureErrorKind;
    use crate::models::{DefaultAction, FeatureState, Section};
    use crate::testing::*;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn details_request() -> StorageAccountDetailsRequest {
        StorageAccountDetailsRequest {
            subscription_id: SUB.into(),
            resource_group: "rg1".into(),
            account_name: "acct1".into(),
            include_keys: false,
        }
    }

    fn account_request() -> AccountRequest {
        AccountRequest {
            subscription_id: SUB.into(),
            resource_group: "rg1".into(),
            account_name: "acct1".into(),
        }
    }

    fn list_request(resource_group: Option<&str>, include_deleted: bool) -> ListStorageAccountsRequest {
        ListStorageAccountsRequest {
            subscription_id: SUB.into(),
            resource_group: resource_group.map(str::to_string),
            include_deleted,
        }
    }

    fn metric_response(name: &str, values: &[f64]) -> crate::types::RawMetricResponse {
        let data: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| json!({ "timeStamp": format!("2024-01-01T{:02}:00:00Z", i), "average": v }))
            .collect();
        from_json(json!({
            "value": [{ "name": { "value": name }, "unit": "Count", "timeseries": [{ "data": data }] }]
        }))
    }

    fn fixture(storage: FakeStorage, monitor: FakeMonitor, network: FakeNetwork) -> (Arc<FakeFactory>, StorageInsights) {
        let factory = Arc::new(FakeFactory::new(storage, monitor, network));
        let service = insights(factory.clone(), TIMEOUT);
        (factory, service)
    }

    // ── list ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn zero_accounts_is_success() {
        let (_, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let env = svc.list_storage_accounts(&list_request(None, false)).await.unwrap();
        assert_eq!(env.data.total_count, 0);
        assert!(env.data.storage_accounts.is_empty());
        assert_eq!(env.summary, "No storage accounts found in subscription");
        assert!(env.partial_failures.is_empty());
    }

    #[tokio::test]
    async fn lists_accounts_with_deleted() {
        let storage = FakeStorage {
            accounts: Ok(vec![
                raw_account("alpha", "rg1", "westus"),
                raw_account("beta", "rg1", "eastus"),
            ]),
            deleted: Ok(vec![from_json(json!({
                "name": "gone",
                "properties": {
                    "storageAccountResourceId": format!("/subscriptions/{SUB}/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/gone"),
                    "location": "westus",
                    "deletionTime": "2024-02-01T00:00:00Z"
                }
            }))]),
            ..Default::default()
        };
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.list_storage_accounts(&list_request(Some("rg1"), true)).await.unwrap();
        assert_eq!(env.data.total_count, 3);
        assert!(env.data.storage_accounts[2].deleted);
        assert!(env.summary.starts_with("Found 3 storage accounts in resource group 'rg1'"));
    }

    #[tokio::test]
    async fn deleted_listing_failure_is_partial() {
        let storage = FakeStorage {
            accounts: Ok(vec![raw_account("alpha", "rg1", "westus")]),
            deleted: Err(throttled()),
            ..Default::default()
        };
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.list_storage_accounts(&list_request(None, true)).await.unwrap();
        assert_eq!(env.data.total_count, 1);
        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(env.partial_failures[0].section, "deleted_accounts");
        assert_eq!(env.partial_failures[0].kind, AzureErrorKind::THROTTLED);
    }

    #[tokio::test]
    async fn invalid_subscription_rejected_before_any_call() {
        let (factory, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let mut req = list_request(None, false);
        req.subscription_id = "nope".into();
        let err = svc.list_storage_accounts(&req).await.unwrap_err();
        assert_eq!(err.error_code, "ValidationError");
        assert_eq!(factory.calls(), 0);
    }

    // ── details ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn details_with_all_sections() {
        let (factory, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let env = svc.get_storage_account_details(&details_request()).await.unwrap();
        assert!(env.partial_failures.is_empty());

        let d = &env.data;
        assert_eq!(d.basic_properties.name, "acct1");
        assert_eq!(d.basic_properties.subscription_id, SUB);
        // absent from the fixture → documented defaults
        assert!(d.security_settings.allow_shared_key_access);
        assert!(!d.security_settings.allow_cross_tenant_replication);
        assert_eq!(
            d.network_configuration.value().map(|n| n.default_action),
            Some(DefaultAction::Allow)
        );
        assert_eq!(
            d.blob_service_properties.value().map(|b| b.versioning),
            Some(FeatureState::Disabled)
        );
        assert_eq!(d.access_policies.value().map(Vec::len), Some(2));
        assert_eq!(factory.storage.log.count("list_keys"), 0);
        assert!(env.summary.starts_with("Storage account 'acct1' in eastus (Standard_LRS, StorageV2)"));
    }

    #[tokio::test]
    async fn core_not_found_is_terminal() {
        let storage = FakeStorage {
            properties: Err(not_found("Storage account 'acct1'")),
            ..Default::default()
        };
        let (factory, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let err = svc.get_storage_account_details(&details_request()).await.unwrap_err();
        assert_eq!(err.error_code, "NotFound");
        assert!(!err.correlation_id.is_empty());
        // optional calls never issued
        assert_eq!(factory.storage.log.count("get_network_rule_set"), 0);
        assert_eq!(factory.monitor.log.count("list_diagnostic_settings"), 0);
    }

    #[tokio::test]
    async fn one_optional_failure_degrades_one_section() {
        let storage = FakeStorage {
            network_rules: Err(throttled()),
            ..Default::default()
        };
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.get_storage_account_details(&details_request()).await.unwrap();

        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(env.partial_failures[0].section, "network_rules");
        assert!(matches!(env.data.network_configuration, Section::Unavailable { .. }));
        assert!(env.data.blob_service_properties.is_available());
        assert!(env.data.private_endpoints.is_available());
        assert!(env.data.diagnostic_settings.is_available());
        assert!(env.summary.ends_with("Unavailable: network_rules"));
    }

    #[tokio::test]
    async fn permission_failure_on_optional_call_aborts() {
        let monitor = FakeMonitor {
            diagnostics: Err(forbidden()),
            ..Default::default()
        };
        let (_, svc) = fixture(FakeStorage::default(), monitor, FakeNetwork::default());
        let err = svc.get_storage_account_details(&details_request()).await.unwrap_err();
        assert_eq!(err.error_code, "PermissionError");
    }

    #[tokio::test]
    async fn include_keys_uses_key_listing() {
        let storage = FakeStorage {
            keys: Ok(vec![from_json(json!({
                "keyName": "key1", "permissions": "FULL", "creationTime": "2024-03-01T00:00:00Z"
            }))]),
            ..Default::default()
        };
        let (factory, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let mut req = details_request();
        req.include_keys = true;
        let env = svc.get_storage_account_details(&req).await.unwrap();
        let policies = env.data.access_policies.value().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id, "key1");
        assert_eq!(factory.storage.log.count("list_keys"), 1);
    }

    #[tokio::test]
    async fn file_storage_skips_blob_service() {
        let mut account = raw_account("acct1", "rg1", "eastus");
        account.kind = normalize::EnumLike::RawString("FileStorage".into());
        let storage = FakeStorage {
            properties: Ok(account),
            ..Default::default()
        };
        let (factory, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.get_storage_account_details(&details_request()).await.unwrap();
        assert_eq!(
            env.data.blob_service_properties.value().map(|b| b.soft_delete),
            Some(FeatureState::NotApplicable)
        );
        assert_eq!(factory.storage.log.count("get_blob_service_properties"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_completed_sections() {
        let mut storage = FakeStorage::default();
        storage.log.delay("list_private_endpoint_connections", Duration::from_secs(120));
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.get_storage_account_details(&details_request()).await.unwrap();

        assert_eq!(env.partial_failures.len(), 1);
        let failure = &env.partial_failures[0];
        assert_eq!(failure.section, "private_endpoints");
        assert_eq!(failure.kind, AzureErrorKind::TRANSIENT);
        assert_eq!(failure.reason.as_deref(), Some("timeout"));
        assert!(env.data.network_configuration.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn core_timeout_is_terminal_transient() {
        let mut storage = FakeStorage::default();
        storage.log.delay("get_properties", Duration::from_secs(120));
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let err = svc.get_storage_account_details(&details_request()).await.unwrap_err();
        assert_eq!(err.error_code, "Transient");
    }

    #[tokio::test]
    async fn details_output_is_deterministic() {
        let (_, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let a = svc.get_storage_account_details(&details_request()).await.unwrap();
        let b = svc.get_storage_account_details(&details_request()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&a.data).unwrap(),
            serde_json::to_string(&b.data).unwrap()
        );
    }

    // ── network ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn network_rules_absent_lists_are_empty() {
        let storage = FakeStorage {
            network_rules: Ok(Some(from_json(json!({ "defaultAction": "Deny", "ipRules": null })))),
            ..Default::default()
        };
        let (_, svc) = fixture(storage, FakeMonitor::default(), FakeNetwork::default());
        let env = svc.get_network_rules(&account_request()).await.unwrap();
        assert_eq!(env.data.default_action, DefaultAction::Deny);
        assert!(env.data.ip_rules.is_empty());
        assert!(env.data.virtual_network_rules.is_empty());
        let v = serde_json::to_value(&env.data).unwrap();
        assert_eq!(v["ip_rules"], json!([]));
        assert!(env.summary.contains("Rules: no custom rules"));
    }

    #[tokio::test]
    async fn private_endpoints_are_enriched() {
        let pe = "/subscriptions/s/resourceGroups/net/providers/Microsoft.Network/privateEndpoints/pe1";
        let nic = "/subscriptions/s/resourceGroups/net/providers/Microsoft.Network/networkInterfaces/nic1";
        let storage = FakeStorage {
            endpoints: Ok(vec![from_json(json!({
                "name": "conn1",
                "properties": {
                    "privateEndpoint": { "id": pe },
                    "privateLinkServiceConnectionState": { "status": "Approved", "description": "ok", "actionsRequired": "None" },
                    "provisioningState": "Succeeded"
                }
            }))]),
            ..Default::default()
        };
        let mut network = FakeNetwork::default();
        network.endpoints.insert(
            pe.into(),
            Ok(from_json(json!({ "id": pe, "properties": { "networkInterfaces": [{ "id": nic }] } }))),
        );
        network.interfaces.insert(
            nic.into(),
            Ok(from_json(json!({
                "id": nic, "name": "nic1",
                "properties": { "ipConfigurations": [{ "name": "ipc", "properties": {
                    "privateIPAddress": "10.0.0.5", "primary": true, "subnet": { "id": "/x/subnets/default" }
                } }] }
            }))),
        );
        network.dns_zone_groups.insert(
            pe.into(),
            Ok(vec![from_json(json!({
                "name": "default",
                "properties": { "privateDnsZoneConfigs": [{ "name": "blob",
                    "properties": { "privateDnsZoneId": "/x/privateDnsZones/privatelink.blob.core.windows.net" } }] }
            }))]),
        );
        let (_, svc) = fixture(storage, FakeMonitor::default(), network);
        let env = svc.get_private_endpoints(&account_request()).await.unwrap();

        assert!(env.partial_failures.is_empty());
        let conn = &env.data.private_endpoints[0];
        assert_eq!(conn.connection_state, "Approved");
        assert_eq!(
            conn.network_interface.as_ref().and_then(|n| n.private_ip_address.as_deref()),
            Some("10.0.0.5")
        );
        assert_eq!(conn.dns_zones.len(), 1);
        assert_eq!(
            env.summary,
            "Found 1 private endpoint for 'acct1'. Connection states: Approved: 1"
        );
    }

    #[tokio::test]
    async fn endpoint_enrichment_failure_is_partial() {
        let pe = "/subscriptions/s/resourceGroups/net/providers/Microsoft.Network/privateEndpoints/pe1";
        let storage = FakeStorage {
            endpoints: Ok(vec![from_json(json!({
                "name": "conn1",
                "properties": { "privateEndpoint": { "id": pe } }
            }))]),
            ..Default::default()
        };
        let mut network = FakeNetwork::default();
        network.dns_zone_groups.insert(pe.into(), Ok(vec![]));
        let (_, svc) = fixture(storage, FakeMonitor::default(), network);
        let env = svc.get_private_endpoints(&account_request()).await.unwrap();

        assert_eq!(env.data.total_count, 1);
        assert!(env.data.private_endpoints[0].network_interface.is_none());
        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(
            env.partial_failures[0].section,
            "private_endpoints.conn1.network_interface"
        );
        assert_eq!(env.partial_failures[0].kind, AzureErrorKind::NOT_FOUND);
    }

    // ── metrics ──────────────────────────────────────────────────────

    fn metrics_request(time_range: &str, metrics: &[&str]) -> StorageMetricsRequest {
        let mut req = StorageMetricsRequest::new(SUB, "rg1", "acct1");
        req.time_range = time_range.into();
        req.metrics = metrics.iter().map(|m| m.to_string()).collect();
        req
    }

    #[tokio::test]
    async fn failing_metric_is_excluded_from_summary() {
        let mut monitor = FakeMonitor::default();
        monitor
            .metrics
            .insert("Transactions".into(), Ok(metric_response("Transactions", &[10.0, 20.0])));
        monitor.metrics.insert("Egress".into(), Err(throttled()));
        let (_, svc) = fixture(FakeStorage::default(), monitor, FakeNetwork::default());

        let env = svc
            .get_storage_metrics(&metrics_request("24h", &["Transactions", "Egress"]))
            .await
            .unwrap();
        let data = &env.data;
        assert_eq!(data.time_range, TimeRange::OneDay);
        assert_eq!(data.end_time - data.start_time, chrono::Duration::hours(24));
        assert_eq!(data.aggregated_summary.len(), 1);
        assert_eq!(data.aggregated_summary["Transactions"], 15.0);
        assert!(!data.metrics_data.contains_key("Egress"));
        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(env.partial_failures[0].section, "metrics.Egress");
        assert!(env.summary.starts_with("Metrics for 'acct1' over the last 24h (Average): Transactions: 15"));
    }

    #[tokio::test]
    async fn unknown_time_range_is_validation_error() {
        let (factory, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let err = svc
            .get_storage_metrics(&metrics_request("90m", &["Transactions"]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "ValidationError");
        assert_eq!(factory.calls(), 0);
    }

    #[tokio::test]
    async fn all_metrics_failing_still_succeeds() {
        let mut monitor = FakeMonitor::default();
        monitor.metrics.insert("UsedCapacity".into(), Err(throttled()));
        let (_, svc) = fixture(FakeStorage::default(), monitor, FakeNetwork::default());
        let env = svc
            .get_storage_metrics(&metrics_request("1h", &["UsedCapacity"]))
            .await
            .unwrap();
        assert!(env.data.metrics_data.is_empty());
        assert!(env.data.aggregated_summary.is_empty());
        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(env.partial_failures[0].section, "metrics.UsedCapacity");
        assert_eq!(env.partial_failures[0].kind, AzureErrorKind::THROTTLED);
        assert!(env.summary.starts_with("No metrics data available for 'acct1'"));
        assert!(env.summary.ends_with("Unavailable: metrics.UsedCapacity"));
    }

    #[tokio::test]
    async fn forbidden_metric_aborts_query() {
        let mut monitor = FakeMonitor::default();
        monitor.metrics.insert("Transactions".into(), Err(forbidden()));
        let (_, svc) = fixture(FakeStorage::default(), monitor, FakeNetwork::default());
        let err = svc
            .get_storage_metrics(&metrics_request("1h", &["UsedCapacity", "Transactions"]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "PermissionError");
    }

    #[tokio::test]
    async fn duplicate_metrics_queried_once() {
        let (factory, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        let env = svc
            .get_storage_metrics(&metrics_request("1h", &["Transactions", "Transactions"]))
            .await
            .unwrap();
        assert_eq!(factory.monitor.log.count("query_metric"), 1);
        // an empty series still aggregates
        assert_eq!(env.data.aggregated_summary["Transactions"], 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_metric_times_out() {
        let mut monitor = FakeMonitor::default();
        monitor
            .metrics
            .insert("UsedCapacity".into(), Ok(metric_response("UsedCapacity", &[1024.0])));
        monitor
            .metric_delays
            .insert("Transactions".into(), Duration::from_secs(300));
        let (_, svc) = fixture(FakeStorage::default(), monitor, FakeNetwork::default());
        let env = svc
            .get_storage_metrics(&metrics_request("1h", &["UsedCapacity", "Transactions"]))
            .await
            .unwrap();
        assert_eq!(env.partial_failures.len(), 1);
        assert_eq!(env.partial_failures[0].section, "metrics.Transactions");
        assert_eq!(env.partial_failures[0].reason.as_deref(), Some("timeout"));
        assert!(env.data.aggregated_summary.contains_key("UsedCapacity"));
    }

    // ── auth ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn authentication_self_test() {
        let (_, svc) = fixture(FakeStorage::default(), FakeMonitor::default(), FakeNetwork::default());
        assert!(svc.test_authentication().await);

        let config = InsightsConfig {
            auth_strategy: AuthStrategy::ServicePrincipal,
            ..Default::default()
        };
        let broken = StorageInsights::new(config).unwrap();
        assert!(!broken.test_authentication().await);
    }

    #[tokio::test]
    async fn missing_secret_fails_before_any_call() {
        let factory = Arc::new(FakeFactory::new(
            FakeStorage::default(),
            FakeMonitor::default(),
            FakeNetwork::default(),
        ));
        let config = InsightsConfig {
            auth_strategy: AuthStrategy::ServicePrincipal,
            tenant_id: Some("t".into()),
            client_id: Some("c".into()),
            ..Default::default()
        };
        let resolver = Arc::new(CredentialResolver::new(config, Client::new()));
        let svc = StorageInsights::with_parts(resolver, factory.clone(), TIMEOUT);
        let err = svc.get_network_rules(&account_request()).await.unwrap_err();
        assert_eq!(err.error_code, "AuthenticationError");
        assert_eq!(factory.calls(), 0);
    }
}
