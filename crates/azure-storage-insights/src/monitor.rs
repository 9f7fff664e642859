//! Azure Monitor – metrics, metric definitions, diagnostic settings.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::client::ArmClient;
use crate::config::ApiVersions;
use crate::error::AzureResult;
use crate::factory::MonitorApi;
use crate::types::{RawDiagnosticSetting, RawMetricDefinition, RawMetricResponse};

const INSIGHTS: &str = "/providers/Microsoft.Insights";

pub struct MonitorClient {
    arm: Arc<ArmClient>,
    metrics_api: String,
    definitions_api: String,
    diagnostics_api: String,
}

impl MonitorClient {
    pub fn new(arm: Arc<ArmClient>, versions: &ApiVersions) -> Self {
        Self {
            arm,
            metrics_api: versions.metrics.clone(),
            definitions_api: versions.metric_definitions.clone(),
            diagnostics_api: versions.diagnostic_settings.clone(),
        }
    }

    fn insights_url(&self, resource_id: &str, collection: &str) -> String {
        self.arm.arm_url(&format!("{}{}/{}", resource_id, INSIGHTS, collection))
    }
}

#[async_trait]
impl MonitorApi for MonitorClient {
    async fn list_metric_definitions(&self, resource_id: &str) -> AzureResult<Vec<RawMetricDefinition>> {
        let url = self.insights_url(resource_id, "metricDefinitions");
        debug!("list_metric_definitions({}) → {}", resource_id, url);
        self.arm
            .get_all_pages(&url, &[("api-version", self.definitions_api.as_str())])
            .await
    }

    /// - `timespan`: ISO 8601 interval (`start/end`)
    /// - `interval`: aggregation granularity (e.g. `"PT5M"`, `"PT1H"`)
    async fn query_metric(
        &self,
        resource_id: &str,
        metric: &str,
        timespan: &str,
        interval: &str,
        aggregation: &str,
    ) -> AzureResult<RawMetricResponse> {
        let url = self.insights_url(resource_id, "metrics");
        debug!("query_metric({}, {}) → {}", resource_id, metric, url);
        self.arm
            .get_json(
                &url,
                &[
                    ("api-version", self.metrics_api.as_str()),
                    ("metricnames", metric),
                    ("timespan", timespan),
                    ("interval", interval),
                    ("aggregation", aggregation),
                ],
            )
            .await
    }

    async fn list_diagnostic_settings(&self, resource_id: &str) -> AzureResult<Vec<RawDiagnosticSetting>> {
        let url = self.insights_url(resource_id, "diagnosticSettings");
        debug!("list_diagnostic_settings({}) → {}", resource_id, url);
        self.arm
            .get_all_pages(&url, &[("api-version", self.diagnostics_api.as_str())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::credential::{Credential, CredentialKind};
    use crate::testing::StaticTokenSource;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RID: &str = "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/acct1";

    fn monitor(server: &MockServer) -> MonitorClient {
        let credential = Arc::new(Credential::new(
            CredentialKind::Cli,
            Box::new(StaticTokenSource::new("t")),
        ));
        let arm = Arc::new(ArmClient::new(
            Client::new(),
            credential,
            &server.uri(),
            RetryConfig::default(),
        ));
        MonitorClient::new(arm, &ApiVersions::default())
    }

    #[tokio::test]
    async fn metric_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RID}/providers/Microsoft.Insights/metrics")))
            .and(query_param("api-version", "2023-10-01"))
            .and(query_param("metricnames", "UsedCapacity"))
            .and(query_param("interval", "PT1H"))
            .and(query_param("aggregation", "Average"))
            .and(query_param("timespan", "2024-01-01T00:00:00Z/2024-01-01T01:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "name": { "value": "UsedCapacity", "localizedValue": "Used capacity" },
                    "unit": "Bytes",
                    "timeseries": [{ "data": [{ "timeStamp": "2024-01-01T00:00:00Z", "average": 1024 }] }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = monitor(&server)
            .query_metric(
                RID,
                "UsedCapacity",
                "2024-01-01T00:00:00Z/2024-01-01T01:00:00Z",
                "PT1H",
                "Average",
            )
            .await
            .unwrap();
        assert!(resp.value[0].name.is("UsedCapacity"));
        assert_eq!(resp.value[0].timeseries[0].data[0].average, Some(1024.0));
    }

    #[tokio::test]
    async fn definitions_and_diagnostics_use_their_own_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RID}/providers/Microsoft.Insights/metricDefinitions")))
            .and(query_param("api-version", "2018-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "name": { "value": "Egress" }, "unit": "Bytes" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{RID}/providers/Microsoft.Insights/diagnosticSettings")))
            .and(query_param("api-version", "2021-05-01-preview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let m = monitor(&server);
        assert_eq!(m.list_metric_definitions(RID).await.unwrap().len(), 1);
        assert!(m.list_diagnostic_settings(RID).await.unwrap().is_empty());
    }
}
