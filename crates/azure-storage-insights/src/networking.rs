//! Azure Networking – private endpoints, their NICs and DNS zone groups.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::client::ArmClient;
use crate::error::AzureResult;
use crate::factory::NetworkApi;
use crate::types::{RawNetworkInterface, RawPrivateDnsZoneGroup, RawPrivateEndpoint};

pub struct NetworkClient {
    arm: Arc<ArmClient>,
    api_version: String,
}

impl NetworkClient {
    pub fn new(arm: Arc<ArmClient>, api_version: &str) -> Self {
        Self {
            arm,
            api_version: api_version.to_string(),
        }
    }
}

#[async_trait]
impl NetworkApi for NetworkClient {
    async fn get_private_endpoint(&self, resource_id: &str) -> AzureResult<RawPrivateEndpoint> {
        let url = self.arm.arm_url(resource_id);
        debug!("get_private_endpoint → {}", url);
        self.arm
            .get_json(&url, &[("api-version", self.api_version.as_str())])
            .await
    }

    async fn get_network_interface(&self, resource_id: &str) -> AzureResult<RawNetworkInterface> {
        let url = self.arm.arm_url(resource_id);
        debug!("get_network_interface → {}", url);
        self.arm
            .get_json(&url, &[("api-version", self.api_version.as_str())])
            .await
    }

    async fn list_private_dns_zone_groups(&self, private_endpoint_id: &str) -> AzureResult<Vec<RawPrivateDnsZoneGroup>> {
        let url = self
            .arm
            .arm_url(&format!("{}/privateDnsZoneGroups", private_endpoint_id));
        debug!("list_private_dns_zone_groups → {}", url);
        self.arm
            .get_all_pages(&url, &[("api-version", self.api_version.as_str())])
            .await
    }
}
