//! Raw wire shapes returned by Azure Resource Manager and the token endpoints.
//!
//! Nothing here is trusted: every field is optional, enum-like values are
//! captured as [`EnumLike`], and booleans/integers go through lenient
//! deserializers so an unexpected shape degrades to "absent" instead of
//! failing the whole payload. [`crate::normalize`] turns these into the
//! canonical schema in [`crate::models`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Secret;
use crate::normalize::{lenient_bool, lenient_f64, lenient_u32, lenient_u64, nullable, EnumLike};

pub const ARM_BASE: &str = "https://management.azure.com";
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";
pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254";

/// Seconds before real expiry at which a token is treated as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

// ─── OAuth / Auth ────────────────────────────────────────────────────

/// Cached bearer token.
#[derive(Debug, Clone, Default)]
pub struct AzureToken {
    pub access_token: Secret,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AzureToken {
    /// Expired, or inside the refresh skew window.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + chrono::Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) >= exp,
            None => false,
        }
    }
}

/// Token endpoint / IMDS response. IMDS reports the numeric fields as strings.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    /// Absolute expiry as Unix seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_on: Option<u64>,
}

/// `az account get-access-token -o json` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliTokenResponse {
    pub access_token: Secret,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Local time, `YYYY-MM-DD HH:MM:SS.ffffff`.
    #[serde(default)]
    pub expires_on: Option<String>,
    /// Unix seconds; newer CLI releases only.
    #[serde(default, rename = "expires_on", deserialize_with = "lenient_u64")]
    pub expires_on_epoch: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: Secret,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// OAuth2 error body (`authorization_pending`, `expired_token`, ...).
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

// ─── Azure Resource Manager common ──────────────────────────────────

/// Generic ARM list wrapper (`value` array with optional `nextLink`).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ArmList<T> {
    #[serde(default, deserialize_with = "nullable")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct SubResource {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableString {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub localized_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_modified_at: Option<String>,
}

// ─── Storage accounts ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawStorageAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub kind: EnumLike,
    #[serde(default)]
    pub sku: Option<RawSku>,
    #[serde(default)]
    pub system_data: Option<SystemData>,
    #[serde(default)]
    pub properties: Option<RawStorageAccountProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawSku {
    #[serde(default)]
    pub name: EnumLike,
    #[serde(default)]
    pub tier: EnumLike,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawStorageAccountProperties {
    #[serde(default)]
    pub provisioning_state: EnumLike,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub primary_location: Option<String>,
    #[serde(default)]
    pub secondary_location: Option<String>,
    #[serde(default)]
    pub status_of_primary: EnumLike,
    #[serde(default)]
    pub status_of_secondary: EnumLike,
    #[serde(default)]
    pub primary_endpoints: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub secondary_endpoints: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub access_tier: EnumLike,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub supports_https_traffic_only: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub allow_blob_public_access: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub allow_shared_key_access: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub allow_cross_tenant_replication: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_hns_enabled: Option<bool>,
    #[serde(default)]
    pub public_network_access: EnumLike,
    #[serde(default)]
    pub minimum_tls_version: EnumLike,
    #[serde(default)]
    pub encryption: Option<RawEncryption>,
    #[serde(default)]
    pub network_acls: Option<RawNetworkRuleSet>,
    #[serde(default)]
    pub key_policy: Option<RawKeyPolicy>,
    #[serde(default)]
    pub key_creation_time: Option<RawKeyCreationTime>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawEncryption {
    #[serde(default)]
    pub key_source: EnumLike,
    #[serde(default)]
    pub services: Option<RawEncryptionServices>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub require_infrastructure_encryption: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawEncryptionServices {
    #[serde(default)]
    pub blob: Option<RawEncryptionService>,
    #[serde(default)]
    pub file: Option<RawEncryptionService>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawEncryptionService {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawKeyPolicy {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub key_expiration_period_in_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawKeyCreationTime {
    #[serde(default)]
    pub key1: Option<String>,
    #[serde(default)]
    pub key2: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawNetworkRuleSet {
    #[serde(default)]
    pub default_action: EnumLike,
    #[serde(default)]
    pub bypass: EnumLike,
    #[serde(default, deserialize_with = "nullable")]
    pub ip_rules: Vec<RawIpRule>,
    #[serde(default, deserialize_with = "nullable")]
    pub virtual_network_rules: Vec<RawVirtualNetworkRule>,
    #[serde(default, deserialize_with = "nullable")]
    pub resource_access_rules: Vec<RawResourceAccessRule>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawIpRule {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub action: EnumLike,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawVirtualNetworkRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action: EnumLike,
    #[serde(default)]
    pub state: EnumLike,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawResourceAccessRule {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// `GET .../storageAccounts/{name}` narrowed to the network rule set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawNetworkAclsEnvelope {
    #[serde(default)]
    pub properties: Option<RawNetworkAclsProperties>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawNetworkAclsProperties {
    #[serde(default)]
    pub network_acls: Option<RawNetworkRuleSet>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawDeletedAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawDeletedAccountProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawDeletedAccountProperties {
    #[serde(default)]
    pub storage_account_resource_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub deletion_time: Option<String>,
}

/// Key metadata from `listKeys`. The key value is deliberately not modelled.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawStorageAccountKey {
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub permissions: EnumLike,
    #[serde(default)]
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawKeyList {
    #[serde(default, deserialize_with = "nullable")]
    pub keys: Vec<RawStorageAccountKey>,
}

// ─── Blob service ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawBlobService {
    #[serde(default)]
    pub properties: Option<RawBlobServiceProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawBlobServiceProperties {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_versioning_enabled: Option<bool>,
    #[serde(default)]
    pub change_feed: Option<RawRetentionPolicy>,
    #[serde(default)]
    pub delete_retention_policy: Option<RawRetentionPolicy>,
    #[serde(default)]
    pub container_delete_retention_policy: Option<RawRetentionPolicy>,
    #[serde(default)]
    pub restore_policy: Option<RawRetentionPolicy>,
    #[serde(default)]
    pub last_access_time_tracking_policy: Option<RawLastAccessTracking>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawRetentionPolicy {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub days: Option<u32>,
    /// Change feed names its retention differently.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub retention_in_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawLastAccessTracking {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enable: Option<bool>,
}

// ─── Private endpoints ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawPrivateEndpointConnection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawPrivateEndpointConnectionProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPrivateEndpointConnectionProperties {
    #[serde(default)]
    pub private_endpoint: Option<SubResource>,
    #[serde(default)]
    pub private_link_service_connection_state: Option<RawConnectionState>,
    #[serde(default)]
    pub provisioning_state: EnumLike,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawConnectionState {
    #[serde(default)]
    pub status: EnumLike,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions_required: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawPrivateEndpoint {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawPrivateEndpointProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPrivateEndpointProperties {
    #[serde(default)]
    pub subnet: Option<SubResource>,
    #[serde(default, deserialize_with = "nullable")]
    pub network_interfaces: Vec<SubResource>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawNetworkInterface {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawNetworkInterfaceProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawNetworkInterfaceProperties {
    #[serde(default, deserialize_with = "nullable")]
    pub ip_configurations: Vec<RawIpConfiguration>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub primary: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawIpConfiguration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawIpConfigurationProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawIpConfigurationProperties {
    #[serde(default, rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub primary: Option<bool>,
    #[serde(default)]
    pub subnet: Option<SubResource>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawPrivateDnsZoneGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawPrivateDnsZoneGroupProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPrivateDnsZoneGroupProperties {
    #[serde(default, deserialize_with = "nullable")]
    pub private_dns_zone_configs: Vec<RawPrivateDnsZoneConfig>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawPrivateDnsZoneConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawPrivateDnsZoneConfigProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPrivateDnsZoneConfigProperties {
    #[serde(default)]
    pub private_dns_zone_id: Option<String>,
}

// ─── Monitor ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawDiagnosticSetting {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Option<RawDiagnosticSettingProperties>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawDiagnosticSettingProperties {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub storage_account_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub logs: Vec<RawCategorySetting>,
    #[serde(default, deserialize_with = "nullable")]
    pub metrics: Vec<RawCategorySetting>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawCategorySetting {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_group: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub retention_policy: Option<RawRetentionPolicy>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMetricDefinition {
    #[serde(default)]
    pub name: Option<LocalizableString>,
    #[serde(default)]
    pub display_description: Option<String>,
    #[serde(default)]
    pub unit: EnumLike,
    #[serde(default)]
    pub primary_aggregation_type: EnumLike,
    #[serde(default, deserialize_with = "nullable")]
    pub supported_aggregation_types: Vec<EnumLike>,
    #[serde(default, deserialize_with = "nullable")]
    pub dimensions: Vec<EnumLike>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawMetricResponse {
    #[serde(default)]
    pub timespan: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub value: Vec<RawMetric>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMetric {
    #[serde(default)]
    pub name: EnumLike,
    #[serde(default)]
    pub unit: EnumLike,
    #[serde(default, deserialize_with = "nullable")]
    pub timeseries: Vec<RawTimeSeries>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawTimeSeries {
    #[serde(default, deserialize_with = "nullable")]
    pub data: Vec<RawMetricValue>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMetricValue {
    #[serde(default)]
    pub time_stamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub minimum: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub maximum: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub count: Option<f64>,
}
