//! Field normalization: raw ARM payloads → canonical schema.
//!
//! Nothing in this module returns an error. Absent, `null`, mistyped or
//! unparseable provider values collapse to a documented default:
//!
//! | Field                          | Default               |
//! |--------------------------------|-----------------------|
//! | require_secure_transfer        | `true`                |
//! | allow_blob_public_access       | `false`               |
//! | allow_shared_key_access        | `true`                |
//! | allow_cross_tenant_replication | `false`               |
//! | hierarchical_namespace         | `false`               |
//! | public_network_access          | `Enabled`             |
//! | minimum_tls_version            | `TLS1_0`              |
//! | encryption key source          | `Microsoft.Storage`   |
//! | encryption at rest enabled     | `true`                |
//! | network default action         | `Allow`               |
//! | bypass                         | `AzureServices`       |
//! | blob service features          | `Disabled` (`NotApplicable` on `FileStorage`) |
//!
//! Identifying strings the provider left out become `"unknown"`, timestamps
//! become [`Timestamp::Unknown`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::{
    AccessPolicy, AggregationType, BasicProperties, BlobServiceProperties, BypassFlags,
    DefaultAction, DiagnosticSettings, EncryptionAtRest, EncryptionInTransit, FeatureState,
    IpRule, MetricDataPoint, MetricDefinition, NetworkInterfaceInfo, NetworkRules,
    PrivateEndpointConnection, ResourceAccessRule, RetentionPolicy, SecuritySettings,
    StorageAccountSummary, Timestamp, VirtualNetworkRule,
};
use crate::types::{
    RawBlobServiceProperties, RawDeletedAccount, RawDiagnosticSetting, RawKeyCreationTime,
    RawKeyPolicy, RawMetricDefinition, RawMetricResponse, RawNetworkInterface, RawNetworkRuleSet,
    RawPrivateDnsZoneGroup, RawPrivateEndpointConnection, RawRetentionPolicy, RawStorageAccount,
    RawStorageAccountKey, RawStorageAccountProperties,
};

pub const UNKNOWN: &str = "unknown";

// ─── Enum-like values ────────────────────────────────────────────────

/// A provider value that is sometimes an object with a case name, sometimes
/// a bare string, sometimes missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnumLike {
    /// Object exposing `value` (or `name`).
    KnownCase(String),
    RawString(String),
    #[default]
    Unknown,
}

impl EnumLike {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => map
                .get("value")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Self::KnownCase(s.to_string()))
                .unwrap_or(Self::Unknown),
            Value::String(s) if !s.trim().is_empty() => Self::RawString(s.trim().to_string()),
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::KnownCase(s) | Self::RawString(s) => Some(s),
            Self::Unknown => None,
        }
    }

    pub fn or(&self, default: &str) -> String {
        self.name().unwrap_or(default).to_string()
    }

    pub fn is(&self, expected: &str) -> bool {
        self.name()
            .map(|n| n.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }
}

impl<'de> Deserialize<'de> for EnumLike {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|v| Self::from_value(&v))
    }
}

// ─── Lenient scalar deserializers ────────────────────────────────────

pub fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(lenient_u64(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}

pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `null` → `T::default()`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ─── Primitive rules ─────────────────────────────────────────────────

pub fn flag(raw: Option<bool>, default: bool) -> bool {
    raw.unwrap_or(default)
}

pub fn feature(raw: Option<bool>, applicable: bool) -> FeatureState {
    match (applicable, raw) {
        (false, _) => FeatureState::NotApplicable,
        (true, Some(true)) => FeatureState::Enabled,
        (true, _) => FeatureState::Disabled,
    }
}

pub fn timestamp(raw: Option<&str>) -> Timestamp {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Timestamp::Unknown;
    };
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Timestamp::Known(t.with_timezone(&Utc));
    }
    // offset-less forms are UTC on ARM
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Timestamp::Known(Utc.from_utc_datetime(&naive)))
        .unwrap_or(Timestamp::Unknown)
}

/// Case-insensitive `resourceGroups/{name}` lookup in an ARM resource id.
pub fn resource_group_from_id(id: &str) -> Option<String> {
    let mut segments = id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().filter(|s| !s.is_empty()).map(str::to_string);
        }
    }
    None
}

fn last_segment(id: &str) -> Option<&str> {
    id.rsplit('/').find(|s| !s.is_empty())
}

/// `FileStorage` accounts have no blob service.
pub fn supports_blob_service(kind: &str) -> bool {
    !kind.eq_ignore_ascii_case("FileStorage")
}

fn text(raw: &Option<String>) -> String {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

// ─── Accounts ────────────────────────────────────────────────────────

fn properties_of(raw: &RawStorageAccount) -> RawStorageAccountProperties {
    raw.properties.clone().unwrap_or_default()
}

pub fn account_kind(raw: &RawStorageAccount) -> String {
    raw.kind.or(UNKNOWN)
}

fn last_modified(raw: &RawStorageAccount, props: &RawStorageAccountProperties) -> Timestamp {
    let fallback = raw
        .system_data
        .as_ref()
        .and_then(|d| d.last_modified_at.as_deref());
    timestamp(props.last_modified_time.as_deref().or(fallback))
}

pub fn account_summary(raw: &RawStorageAccount) -> StorageAccountSummary {
    let props = properties_of(raw);
    StorageAccountSummary {
        name: text(&raw.name),
        resource_group: raw
            .id
            .as_deref()
            .and_then(resource_group_from_id)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        location: text(&raw.location),
        sku: raw.sku.as_ref().map(|s| s.name.or(UNKNOWN)).unwrap_or_else(|| UNKNOWN.into()),
        kind: account_kind(raw),
        access_tier: props.access_tier.name().map(str::to_string),
        creation_time: timestamp(props.creation_time.as_deref()),
        last_modified_time: last_modified(raw, &props),
        provisioning_state: props.provisioning_state.or(UNKNOWN),
        status_of_primary: props.status_of_primary.or(UNKNOWN),
        status_of_secondary: props.status_of_secondary.name().map(str::to_string),
        deleted: false,
    }
}

pub fn deleted_account_summary(raw: &RawDeletedAccount) -> StorageAccountSummary {
    let props = raw.properties.clone().unwrap_or_default();
    StorageAccountSummary {
        name: text(&raw.name),
        resource_group: props
            .storage_account_resource_id
            .as_deref()
            .and_then(resource_group_from_id)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        location: text(&props.location),
        sku: UNKNOWN.into(),
        kind: UNKNOWN.into(),
        access_tier: None,
        creation_time: timestamp(props.creation_time.as_deref()),
        last_modified_time: timestamp(props.deletion_time.as_deref()),
        provisioning_state: "Deleted".into(),
        status_of_primary: UNKNOWN.into(),
        status_of_secondary: None,
        deleted: true,
    }
}

fn endpoints(raw: &Option<BTreeMap<String, Value>>) -> BTreeMap<String, String> {
    raw.iter()
        .flatten()
        .filter_map(|(k, v)| v.as_str().map(|url| (k.clone(), url.to_string())))
        .collect()
}

pub fn basic_properties(
    raw: &RawStorageAccount,
    subscription_id: &str,
    requested_resource_group: &str,
) -> BasicProperties {
    let summary = account_summary(raw);
    let props = properties_of(raw);
    BasicProperties {
        resource_group: if summary.resource_group == UNKNOWN {
            requested_resource_group.to_string()
        } else {
            summary.resource_group
        },
        name: summary.name,
        subscription_id: subscription_id.to_string(),
        location: summary.location,
        sku: summary.sku,
        kind: summary.kind,
        access_tier: summary.access_tier,
        creation_time: summary.creation_time,
        last_modified_time: summary.last_modified_time,
        provisioning_state: summary.provisioning_state,
        primary_location: props.primary_location.clone(),
        secondary_location: props.secondary_location.clone(),
        status_of_primary: summary.status_of_primary,
        status_of_secondary: summary.status_of_secondary,
        primary_endpoints: endpoints(&props.primary_endpoints),
        secondary_endpoints: endpoints(&props.secondary_endpoints),
    }
}

pub fn security_settings(raw: &RawStorageAccount) -> SecuritySettings {
    let props = properties_of(raw);
    let encryption = props.encryption.clone().unwrap_or_default();
    let blob_encryption = encryption
        .services
        .as_ref()
        .and_then(|s| s.blob.as_ref())
        .and_then(|b| b.enabled);

    let require_secure_transfer = flag(props.supports_https_traffic_only, true);
    let minimum_tls_version = props.minimum_tls_version.or("TLS1_0");

    SecuritySettings {
        require_secure_transfer,
        allow_blob_public_access: flag(props.allow_blob_public_access, false),
        allow_shared_key_access: flag(props.allow_shared_key_access, true),
        allow_cross_tenant_replication: flag(props.allow_cross_tenant_replication, false),
        public_network_access: props.public_network_access.or("Enabled"),
        minimum_tls_version: minimum_tls_version.clone(),
        encryption_at_rest: EncryptionAtRest {
            enabled: flag(blob_encryption, true),
            key_source: encryption.key_source.or("Microsoft.Storage"),
            infrastructure_encryption: flag(encryption.require_infrastructure_encryption, false),
        },
        encryption_in_transit: EncryptionInTransit {
            enabled: require_secure_transfer,
            minimum_tls_version,
        },
        hierarchical_namespace: flag(props.is_hns_enabled, false),
    }
}

// ─── Network ─────────────────────────────────────────────────────────

fn bypass_flags(raw: &EnumLike) -> BypassFlags {
    let Some(value) = raw.name() else {
        return BypassFlags {
            azure_services: true,
            ..Default::default()
        };
    };
    let mut flags = BypassFlags::default();
    for part in value.split(',').map(str::trim) {
        match part.to_ascii_lowercase().as_str() {
            "azureservices" => flags.azure_services = true,
            "logging" => flags.logging = true,
            "metrics" => flags.metrics = true,
            _ => {}
        }
    }
    flags
}

pub fn network_rules(raw: Option<&RawNetworkRuleSet>) -> NetworkRules {
    let acls = raw.cloned().unwrap_or_default();
    NetworkRules {
        default_action: if acls.default_action.is("Deny") {
            DefaultAction::Deny
        } else {
            DefaultAction::Allow
        },
        ip_rules: acls
            .ip_rules
            .iter()
            .filter_map(|r| {
                r.value.as_ref().map(|v| IpRule {
                    ip_address_or_range: v.clone(),
                    action: r.action.or("Allow"),
                })
            })
            .collect(),
        virtual_network_rules: acls
            .virtual_network_rules
            .iter()
            .filter_map(|r| {
                r.id.as_ref().map(|id| VirtualNetworkRule {
                    subnet_id: id.clone(),
                    action: r.action.or("Allow"),
                    state: r.state.name().map(str::to_string),
                })
            })
            .collect(),
        resource_access_rules: acls
            .resource_access_rules
            .iter()
            .filter_map(|r| {
                r.resource_id.as_ref().map(|rid| ResourceAccessRule {
                    tenant_id: text(&r.tenant_id),
                    resource_id: rid.clone(),
                })
            })
            .collect(),
        bypass: bypass_flags(&acls.bypass),
    }
}

// ─── Blob service ────────────────────────────────────────────────────

fn retention(policy: &Option<RawRetentionPolicy>, applicable: bool) -> (FeatureState, Option<u32>) {
    let state = feature(policy.as_ref().and_then(|p| p.enabled), applicable);
    let days = policy
        .as_ref()
        .filter(|_| state.is_enabled())
        .and_then(|p| p.days.or(p.retention_in_days));
    (state, days)
}

pub fn blob_service(raw: Option<&RawBlobServiceProperties>, kind: &str) -> BlobServiceProperties {
    let applicable = supports_blob_service(kind);
    let props = raw.cloned().unwrap_or_default();

    let (change_feed, change_feed_retention_days) = retention(&props.change_feed, applicable);
    let (soft_delete, soft_delete_retention_days) =
        retention(&props.delete_retention_policy, applicable);
    let (container_soft_delete, container_soft_delete_retention_days) =
        retention(&props.container_delete_retention_policy, applicable);
    let (point_in_time_restore, point_in_time_restore_days) =
        retention(&props.restore_policy, applicable);

    BlobServiceProperties {
        versioning: feature(props.is_versioning_enabled, applicable),
        change_feed,
        change_feed_retention_days,
        soft_delete,
        soft_delete_retention_days,
        container_soft_delete,
        container_soft_delete_retention_days,
        point_in_time_restore,
        point_in_time_restore_days,
        last_access_time_tracking: feature(
            props.last_access_time_tracking_policy.as_ref().and_then(|p| p.enable),
            applicable,
        ),
    }
}

// ─── Access policies ─────────────────────────────────────────────────

fn access_policy(id: String, created: Option<&str>, permissions: String, days: Option<u32>) -> AccessPolicy {
    let start_time = timestamp(created);
    let expiry_time = match (start_time, days) {
        (Timestamp::Known(start), Some(days)) => start
            .checked_add_signed(chrono::Duration::days(i64::from(days)))
            .map_or(Timestamp::Unknown, Timestamp::Known),
        _ => Timestamp::Unknown,
    };
    AccessPolicy {
        id,
        start_time,
        expiry_time,
        permissions,
    }
}

/// From `listKeys` metadata. Key values never reach this point.
pub fn access_policies_from_keys(
    keys: &[RawStorageAccountKey],
    policy: Option<&RawKeyPolicy>,
) -> Vec<AccessPolicy> {
    let days = policy.and_then(|p| p.key_expiration_period_in_days);
    keys.iter()
        .enumerate()
        .map(|(i, k)| {
            access_policy(
                k.key_name.clone().unwrap_or_else(|| format!("key{}", i + 1)),
                k.creation_time.as_deref(),
                k.permissions.or(UNKNOWN),
                days,
            )
        })
        .collect()
}

/// From `keyCreationTime`/`keyPolicy` on the account itself.
pub fn access_policies_from_account(raw: &RawStorageAccount) -> Vec<AccessPolicy> {
    let props = properties_of(raw);
    let days = props.key_policy.as_ref().and_then(|p| p.key_expiration_period_in_days);
    let Some(RawKeyCreationTime { key1, key2 }) = props.key_creation_time else {
        return Vec::new();
    };
    vec![
        access_policy("key1".into(), key1.as_deref(), "FULL".into(), days),
        access_policy("key2".into(), key2.as_deref(), "FULL".into(), days),
    ]
}

// ─── Diagnostics ─────────────────────────────────────────────────────

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

pub fn diagnostic_settings(settings: &[RawDiagnosticSetting]) -> DiagnosticSettings {
    let mut out = DiagnosticSettings {
        enabled: false,
        workspace_id: None,
        storage_account_id: None,
        retention_policy: None,
        categories: Vec::new(),
        metrics: Vec::new(),
    };

    for setting in settings {
        let Some(props) = setting.properties.as_ref() else {
            continue;
        };
        if out.workspace_id.is_none() {
            out.workspace_id = props.workspace_id.clone();
        }
        if out.storage_account_id.is_none() {
            out.storage_account_id = props.storage_account_id.clone();
        }
        let enabled_logs = props.logs.iter().filter(|c| flag(c.enabled, false));
        let enabled_metrics = props.metrics.iter().filter(|c| flag(c.enabled, false));

        for entry in enabled_logs.clone().chain(enabled_metrics.clone()) {
            if out.retention_policy.is_none() {
                out.retention_policy = entry
                    .retention_policy
                    .as_ref()
                    .filter(|p| flag(p.enabled, false))
                    .map(|p| RetentionPolicy {
                        enabled: true,
                        days: p.days.unwrap_or(0),
                    });
            }
        }
        for log in enabled_logs {
            if let Some(name) = log.category.clone().or_else(|| log.category_group.clone()) {
                push_unique(&mut out.categories, name);
            }
        }
        for metric in enabled_metrics {
            if let Some(name) = metric.category.clone() {
                push_unique(&mut out.metrics, name);
            }
        }
    }

    out.enabled = !out.categories.is_empty() || !out.metrics.is_empty();
    out
}

// ─── Private endpoints ───────────────────────────────────────────────

pub fn private_endpoint_connection(raw: &RawPrivateEndpointConnection) -> PrivateEndpointConnection {
    let props = raw.properties.clone().unwrap_or_default();
    let state = props.private_link_service_connection_state.unwrap_or_default();
    PrivateEndpointConnection {
        name: text(&raw.name),
        private_endpoint_id: props.private_endpoint.and_then(|e| e.id),
        connection_state: state.status.or(UNKNOWN),
        provisioning_state: props.provisioning_state.or(UNKNOWN),
        description: state.description.unwrap_or_default(),
        actions_required: state
            .actions_required
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "None".into()),
        network_interface: None,
        dns_zones: Vec::new(),
    }
}

/// Uses the primary IP configuration, falling back to the first one.
pub fn network_interface_info(raw: &RawNetworkInterface) -> NetworkInterfaceInfo {
    let props = raw.properties.clone().unwrap_or_default();
    let config = props
        .ip_configurations
        .iter()
        .find(|c| c.properties.as_ref().and_then(|p| p.primary) == Some(true))
        .or_else(|| props.ip_configurations.first())
        .and_then(|c| c.properties.clone());

    NetworkInterfaceInfo {
        id: text(&raw.id),
        name: text(&raw.name),
        private_ip_address: config.as_ref().and_then(|c| c.private_ip_address.clone()),
        subnet_id: config.and_then(|c| c.subnet).and_then(|s| s.id),
    }
}

pub fn dns_zones(groups: &[RawPrivateDnsZoneGroup]) -> Vec<String> {
    let mut zones = Vec::new();
    for config in groups
        .iter()
        .filter_map(|g| g.properties.as_ref())
        .flat_map(|p| p.private_dns_zone_configs.iter())
    {
        let from_id = config
            .properties
            .as_ref()
            .and_then(|p| p.private_dns_zone_id.as_deref())
            .and_then(last_segment)
            .map(str::to_string);
        if let Some(zone) = from_id.or_else(|| config.name.clone()) {
            push_unique(&mut zones, zone);
        }
    }
    zones
}

// ─── Metrics ─────────────────────────────────────────────────────────

pub fn metric_definition(raw: &RawMetricDefinition) -> MetricDefinition {
    let name = raw.name.clone().unwrap_or_default();
    let value = text(&name.value);
    MetricDefinition {
        display_name: name.localized_value.unwrap_or_else(|| value.clone()),
        name: value,
        unit: raw.unit.or(UNKNOWN),
        primary_aggregation_type: raw.primary_aggregation_type.or(UNKNOWN),
        supported_aggregation_types: raw
            .supported_aggregation_types
            .iter()
            .filter_map(|a| a.name().map(str::to_string))
            .collect(),
        dimensions: raw
            .dimensions
            .iter()
            .filter_map(|d| d.name().map(str::to_string))
            .collect(),
    }
}

/// Samples for `metric` in timestamp order, plus its unit.
pub fn metric_series(
    raw: &RawMetricResponse,
    metric: &str,
    aggregation: AggregationType,
) -> (Vec<MetricDataPoint>, Option<String>) {
    let Some(found) = raw
        .value
        .iter()
        .find(|m| m.name.is(metric))
    else {
        return (Vec::new(), None);
    };

    let mut points: Vec<MetricDataPoint> = found
        .timeseries
        .iter()
        .flat_map(|ts| ts.data.iter())
        .filter_map(|v| {
            let value = match aggregation {
                AggregationType::Average => v.average,
                AggregationType::Total => v.total,
                AggregationType::Minimum => v.minimum,
                AggregationType::Maximum => v.maximum,
                AggregationType::Count => v.count,
            }?;
            timestamp(v.time_stamp.as_deref())
                .known()
                .map(|timestamp| MetricDataPoint { timestamp, value })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);

    (points, found.unit.name().map(str::to_string))
}

/// Collapse a series to one number: sums for Total/Count, otherwise the
/// matching statistic. Empty series aggregate to `0.0`.
pub fn aggregate(points: &[MetricDataPoint], aggregation: AggregationType) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let values = points.iter().map(|p| p.value);
    match aggregation {
        AggregationType::Total | AggregationType::Count => values.sum(),
        AggregationType::Average => values.sum::<f64>() / points.len() as f64,
        AggregationType::Minimum => values.fold(f64::INFINITY, f64::min),
        AggregationType::Maximum => values.fold(f64::NEG_INFINITY, f64::max),
    }
}
