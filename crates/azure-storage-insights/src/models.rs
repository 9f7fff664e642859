//! Canonical output schema and request shapes.
//!
//! Everything here is produced by [`crate::normalize`] and is fully typed:
//! no field depends on the provider having populated it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AzureError, AzureErrorKind, AzureResult};

// ─── Markers ─────────────────────────────────────────────────────────

/// Tri-state for features that some account kinds do not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureState {
    Enabled,
    Disabled,
    NotApplicable,
}

impl FeatureState {
    pub fn is_enabled(&self) -> bool {
        *self == Self::Enabled
    }
}

/// A provider timestamp, or an explicit `"unknown"` when absent/unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Known(DateTime<Utc>),
    Unknown,
}

impl Timestamp {
    pub fn known(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known(t) => Some(*t),
            Self::Unknown => None,
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(t) => serializer.serialize_str(&t.to_rfc3339()),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DateTime::parse_from_rfc3339(&raw)
            .map(|t| Self::Known(t.with_timezone(&Utc)))
            .unwrap_or(Self::Unknown))
    }
}

/// A section that may be missing because its sub-call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn available(value: T) -> Self {
        Self::Available { value }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Available { value } => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

// ─── Envelope pieces ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub execution_time_ms: u64,
}

/// A degraded section of an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailure {
    pub section: String,
    pub kind: AzureErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl PartialFailure {
    pub fn from_error(section: impl Into<String>, err: &AzureError) -> Self {
        let reason = if err.is_timeout() {
            Some("timeout".to_string())
        } else {
            err.provider_code.clone()
        };
        Self {
            section: section.into(),
            kind: err.kind,
            message: err.message.clone(),
            reason,
            status_code: err.status_code,
        }
    }
}

// ─── Accounts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageAccountSummary {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub access_tier: Option<String>,
    pub creation_time: Timestamp,
    pub last_modified_time: Timestamp,
    pub provisioning_state: String,
    pub status_of_primary: String,
    pub status_of_secondary: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageAccountList {
    pub storage_accounts: Vec<StorageAccountSummary>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicProperties {
    pub name: String,
    pub resource_group: String,
    pub subscription_id: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub access_tier: Option<String>,
    pub creation_time: Timestamp,
    pub last_modified_time: Timestamp,
    pub provisioning_state: String,
    pub primary_location: Option<String>,
    pub secondary_location: Option<String>,
    pub status_of_primary: String,
    pub status_of_secondary: Option<String>,
    pub primary_endpoints: BTreeMap<String, String>,
    pub secondary_endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncryptionAtRest {
    pub enabled: bool,
    pub key_source: String,
    pub infrastructure_encryption: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncryptionInTransit {
    pub enabled: bool,
    pub minimum_tls_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecuritySettings {
    pub require_secure_transfer: bool,
    pub allow_blob_public_access: bool,
    pub allow_shared_key_access: bool,
    pub allow_cross_tenant_replication: bool,
    pub public_network_access: String,
    pub minimum_tls_version: String,
    pub encryption_at_rest: EncryptionAtRest,
    pub encryption_in_transit: EncryptionInTransit,
    pub hierarchical_namespace: bool,
}

// ─── Network ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefaultAction {
    Allow,
    Deny,
}

impl fmt::Display for DefaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("Allow"),
            Self::Deny => f.write_str("Deny"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct BypassFlags {
    pub azure_services: bool,
    pub logging: bool,
    pub metrics: bool,
}

impl BypassFlags {
    /// Comma-separated provider form, `None` when nothing bypasses.
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if self.logging {
            parts.push("Logging");
        }
        if self.metrics {
            parts.push("Metrics");
        }
        if self.azure_services {
            parts.push("AzureServices");
        }
        if parts.is_empty() {
            "None".into()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpRule {
    pub ip_address_or_range: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualNetworkRule {
    pub subnet_id: String,
    pub action: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAccessRule {
    pub tenant_id: String,
    pub resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkRules {
    pub default_action: DefaultAction,
    pub ip_rules: Vec<IpRule>,
    pub virtual_network_rules: Vec<VirtualNetworkRule>,
    pub resource_access_rules: Vec<ResourceAccessRule>,
    pub bypass: BypassFlags,
}

// ─── Blob service / access / diagnostics ─────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobServiceProperties {
    pub versioning: FeatureState,
    pub change_feed: FeatureState,
    pub change_feed_retention_days: Option<u32>,
    pub soft_delete: FeatureState,
    pub soft_delete_retention_days: Option<u32>,
    pub container_soft_delete: FeatureState,
    pub container_soft_delete_retention_days: Option<u32>,
    pub point_in_time_restore: FeatureState,
    pub point_in_time_restore_days: Option<u32>,
    pub last_access_time_tracking: FeatureState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessPolicy {
    pub id: String,
    pub start_time: Timestamp,
    pub expiry_time: Timestamp,
    pub permissions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticSettings {
    pub enabled: bool,
    pub workspace_id: Option<String>,
    pub storage_account_id: Option<String>,
    pub retention_policy: Option<RetentionPolicy>,
    pub categories: Vec<String>,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageAccountDetails {
    pub basic_properties: BasicProperties,
    pub security_settings: SecuritySettings,
    pub network_configuration: Section<NetworkRules>,
    pub blob_service_properties: Section<BlobServiceProperties>,
    pub private_endpoints: Section<Vec<PrivateEndpointConnection>>,
    pub access_policies: Section<Vec<AccessPolicy>>,
    pub diagnostic_settings: Section<DiagnosticSettings>,
}

// ─── Private endpoints ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInterfaceInfo {
    pub id: String,
    pub name: String,
    pub private_ip_address: Option<String>,
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateEndpointConnection {
    pub name: String,
    pub private_endpoint_id: Option<String>,
    pub connection_state: String,
    pub provisioning_state: String,
    pub description: String,
    pub actions_required: String,
    pub network_interface: Option<NetworkInterfaceInfo>,
    pub dns_zones: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateEndpointList {
    pub private_endpoints: Vec<PrivateEndpointConnection>,
    pub total_count: usize,
}

// ─── Metrics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl TimeRange {
    pub fn token(&self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::OneHour => Duration::hours(1),
            Self::OneDay => Duration::hours(24),
            Self::SevenDays => Duration::days(7),
            Self::ThirtyDays => Duration::days(30),
        }
    }

    /// Concrete `(start, end)` ending at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }
}

impl FromStr for TimeRange {
    type Err = AzureError;

    fn from_str(s: &str) -> AzureResult<Self> {
        match s {
            "1h" => Ok(Self::OneHour),
            "24h" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            "30d" => Ok(Self::ThirtyDays),
            other => Err(AzureError::validation(
                "time_range",
                format!("'{other}' is not one of 1h, 24h, 7d, 30d"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationType {
    Average,
    Total,
    Minimum,
    Maximum,
    Count,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "Average",
            Self::Total => "Total",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
            Self::Count => "Count",
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationType {
    type Err = AzureError;

    fn from_str(s: &str) -> AzureResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(Self::Average),
            "total" => Ok(Self::Total),
            "minimum" => Ok(Self::Minimum),
            "maximum" => Ok(Self::Maximum),
            "count" => Ok(Self::Count),
            _ => Err(AzureError::validation(
                "aggregation_type",
                format!("'{s}' is not one of Average, Total, Minimum, Maximum, Count"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub display_name: String,
    pub unit: String,
    pub primary_aggregation_type: String,
    pub supported_aggregation_types: Vec<String>,
    pub dimensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageMetrics {
    pub account_name: String,
    pub time_range: TimeRange,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub aggregation_type: AggregationType,
    pub interval: String,
    pub metrics_data: BTreeMap<String, Vec<MetricDataPoint>>,
    pub units: BTreeMap<String, String>,
    pub aggregated_summary: BTreeMap<String, f64>,
    pub available_metrics: Section<Vec<MetricDefinition>>,
}

// ─── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListStorageAccountsRequest {
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// Subscription, resource group and account name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageAccountDetailsRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
    #[serde(default)]
    pub include_keys: bool,
}

pub const DEFAULT_METRICS: &[&str] = &["UsedCapacity", "Transactions"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetricsRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    #[serde(default = "default_aggregation")]
    pub aggregation_type: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl StorageMetricsRequest {
    /// Request with every optional input at its default.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            account_name: account_name.into(),
            time_range: default_time_range(),
            metrics: default_metrics(),
            aggregation_type: default_aggregation(),
            interval: default_interval(),
        }
    }
}

fn default_time_range() -> String {
    "1h".into()
}

fn default_metrics() -> Vec<String> {
    DEFAULT_METRICS.iter().map(|m| m.to_string()).collect()
}

fn default_aggregation() -> String {
    "Average".into()
}

fn default_interval() -> String {
    "PT1H".into()
}
