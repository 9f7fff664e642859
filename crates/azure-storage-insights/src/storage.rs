//! Azure Storage Accounts – list, deleted accounts, properties, network
//! rules, blob service properties, private endpoint connections, key
//! metadata.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::client::ArmClient;
use crate::error::AzureResult;
use crate::factory::StorageApi;
use crate::types::{
    RawBlobService, RawBlobServiceProperties, RawDeletedAccount, RawKeyList, RawNetworkAclsEnvelope,
    RawNetworkRuleSet, RawPrivateEndpointConnection, RawStorageAccount, RawStorageAccountKey,
};

const ACCOUNTS: &str = "/providers/Microsoft.Storage/storageAccounts";

pub struct StorageClient {
    arm: Arc<ArmClient>,
    subscription_id: String,
    api_version: String,
}

impl StorageClient {
    pub fn new(arm: Arc<ArmClient>, subscription_id: &str, api_version: &str) -> Self {
        Self {
            arm,
            subscription_id: subscription_id.to_string(),
            api_version: api_version.to_string(),
        }
    }

    fn account_url(&self, resource_group: &str, account_name: &str, suffix: &str) -> String {
        self.arm.resource_group_url(
            &self.subscription_id,
            resource_group,
            &format!("{}/{}{}", ACCOUNTS, account_name, suffix),
        )
    }

    fn api(&self) -> [(&str, &str); 1] {
        [("api-version", self.api_version.as_str())]
    }
}

#[async_trait]
impl StorageApi for StorageClient {
    async fn list_accounts(&self, resource_group: Option<&str>) -> AzureResult<Vec<RawStorageAccount>> {
        let url = match resource_group {
            Some(rg) => self.arm.resource_group_url(&self.subscription_id, rg, ACCOUNTS),
            None => self.arm.subscription_url(&self.subscription_id, ACCOUNTS),
        };
        debug!("list_accounts({:?}) → {}", resource_group, url);
        self.arm.get_all_pages(&url, &self.api()).await
    }

    async fn list_deleted_accounts(&self) -> AzureResult<Vec<RawDeletedAccount>> {
        let url = self
            .arm
            .subscription_url(&self.subscription_id, "/providers/Microsoft.Storage/deletedAccounts");
        debug!("list_deleted_accounts → {}", url);
        self.arm.get_all_pages(&url, &self.api()).await
    }

    async fn get_properties(&self, resource_group: &str, account_name: &str) -> AzureResult<RawStorageAccount> {
        let url = self.account_url(resource_group, account_name, "");
        debug!("get_properties({}/{}) → {}", resource_group, account_name, url);
        self.arm.get_json(&url, &self.api()).await
    }

    async fn get_network_rule_set(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Option<RawNetworkRuleSet>> {
        let url = self.account_url(resource_group, account_name, "");
        debug!("get_network_rule_set({}/{}) → {}", resource_group, account_name, url);
        let envelope: RawNetworkAclsEnvelope = self.arm.get_json(&url, &self.api()).await?;
        Ok(envelope.properties.and_then(|p| p.network_acls))
    }

    async fn get_blob_service_properties(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Option<RawBlobServiceProperties>> {
        let url = self.account_url(resource_group, account_name, "/blobServices/default");
        debug!("get_blob_service_properties({}/{}) → {}", resource_group, account_name, url);
        let service: RawBlobService = self.arm.get_json(&url, &self.api()).await?;
        Ok(service.properties)
    }

    async fn list_private_endpoint_connections(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> AzureResult<Vec<RawPrivateEndpointConnection>> {
        let url = self.account_url(resource_group, account_name, "/privateEndpointConnections");
        debug!("list_private_endpoint_connections({}/{}) → {}", resource_group, account_name, url);
        self.arm.get_all_pages(&url, &self.api()).await
    }

    async fn list_keys(&self, resource_group: &str, account_name: &str) -> AzureResult<Vec<RawStorageAccountKey>> {
        let url = self.account_url(resource_group, account_name, "/listKeys");
        debug!("list_keys({}/{}) → {}", resource_group, account_name, url);
        let resp: RawKeyList = self.arm.post_json(&url, &self.api()).await?;
        Ok(resp.keys)
    }
}
