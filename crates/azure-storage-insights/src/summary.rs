//! Human-readable one-line summaries of query results.

use std::collections::BTreeMap;

use crate::models::{
    NetworkRules, PartialFailure, PrivateEndpointList, StorageAccountDetails, StorageAccountList,
    StorageMetrics,
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn plural(count: usize, noun: &str) -> String {
    format!("{count} {noun}{}", if count == 1 { "" } else { "s" })
}

fn scope(resource_group: Option<&str>) -> String {
    match resource_group {
        Some(rg) => format!("resource group '{rg}'"),
        None => "subscription".into(),
    }
}

/// `"name: count"` pairs in name order.
fn tally<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_default() += 1;
    }
    counts
        .iter()
        .map(|(name, n)| format!("{name}: {n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn account_list(list: &StorageAccountList, resource_group: Option<&str>) -> String {
    let scope = scope(resource_group);
    if list.storage_accounts.is_empty() {
        return format!("No storage accounts found in {scope}");
    }
    let mut text = format!(
        "Found {} in {}. Distribution by region: {}",
        plural(list.total_count, "storage account"),
        scope,
        tally(list.storage_accounts.iter().map(|a| a.location.as_str()))
    );
    let deleted = list.storage_accounts.iter().filter(|a| a.deleted).count();
    if deleted > 0 {
        text.push_str(&format!(" ({deleted} deleted)"));
    }
    text
}

pub fn account_details(details: &StorageAccountDetails) -> String {
    let basic = &details.basic_properties;
    let security = &details.security_settings;

    let mut items = Vec::new();
    if security.require_secure_transfer {
        items.push("secure transfer required");
    }
    if !security.allow_blob_public_access {
        items.push("public access disabled");
    }
    if !security.allow_shared_key_access {
        items.push("shared key access disabled");
    }
    let security_text = if items.is_empty() {
        "standard security settings".to_string()
    } else {
        items.join(", ")
    };

    format!(
        "Storage account '{}' in {} ({}, {}). Security: {}. Status: {}",
        basic.name, basic.location, basic.sku, basic.kind, security_text, basic.provisioning_state
    )
}

pub fn network_rules(rules: &NetworkRules, account_name: &str) -> String {
    let mut parts = Vec::new();
    if !rules.ip_rules.is_empty() {
        parts.push(plural(rules.ip_rules.len(), "IP rule"));
    }
    if !rules.virtual_network_rules.is_empty() {
        parts.push(plural(rules.virtual_network_rules.len(), "VNet rule"));
    }
    if !rules.resource_access_rules.is_empty() {
        parts.push(plural(rules.resource_access_rules.len(), "resource rule"));
    }
    let rules_text = if parts.is_empty() {
        "no custom rules".to_string()
    } else {
        parts.join(", ")
    };
    format!(
        "Network access for '{}': default action is {}. Rules: {}. Bypass: {}",
        account_name,
        rules.default_action,
        rules_text,
        rules.bypass.label()
    )
}

pub fn private_endpoints(list: &PrivateEndpointList, account_name: &str) -> String {
    if list.private_endpoints.is_empty() {
        return format!("No private endpoints configured for storage account '{account_name}'");
    }
    format!(
        "Found {} for '{}'. Connection states: {}",
        plural(list.total_count, "private endpoint"),
        account_name,
        tally(list.private_endpoints.iter().map(|e| e.connection_state.as_str()))
    )
}

/// Metrics in `order`, skipping those that produced no aggregate.
pub fn metrics(metrics: &StorageMetrics, order: &[String]) -> String {
    let parts: Vec<String> = order
        .iter()
        .filter_map(|name| {
            metrics.aggregated_summary.get(name).map(|value| match name.as_str() {
                "UsedCapacity" => format!("{name}: {:.2} GB", value / GIB),
                "Transactions" => format!("{name}: {value:.0}"),
                _ => format!("{name}: {value:.2}"),
            })
        })
        .collect();

    if parts.is_empty() {
        return format!(
            "No metrics data available for '{}' in the last {}",
            metrics.account_name,
            metrics.time_range.token()
        );
    }
    format!(
        "Metrics for '{}' over the last {} ({}): {}",
        metrics.account_name,
        metrics.time_range.token(),
        metrics.aggregation_type,
        parts.join(", ")
    )
}

/// Append the degraded sections, if any.
pub fn with_partial_failures(summary: String, failures: &[PartialFailure]) -> String {
    if failures.is_empty() {
        return summary;
    }
    let sections: Vec<&str> = failures.iter().map(|f| f.section.as_str()).collect();
    format!("{summary}. Unavailable: {}", sections.join(", "))
}
