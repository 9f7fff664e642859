//! Tool catalog and JSON dispatch.
//!
//! A transport advertises [`tool_definitions`] and forwards each call to
//! [`dispatch`], which returns the serialized success or error envelope.

use chrono::Utc;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::envelope::{RequestContext, ToolResult};
use crate::error::AzureError;
use crate::models::{
    AccountRequest, ListStorageAccountsRequest, StorageAccountDetailsRequest, StorageMetricsRequest,
    DEFAULT_METRICS,
};
use crate::service::StorageInsights;
use crate::validation::METRIC_INTERVALS;

pub const LIST_STORAGE_ACCOUNTS: &str = "list_storage_accounts";
pub const GET_STORAGE_ACCOUNT_DETAILS: &str = "get_storage_account_details";
pub const GET_NETWORK_RULES: &str = "get_network_rules";
pub const GET_PRIVATE_ENDPOINTS: &str = "get_private_endpoints";
pub const GET_STORAGE_METRICS: &str = "get_storage_metrics";

const REDACTED: &str = "***REDACTED***";
const SENSITIVE: &[&str] = &["password", "secret", "key", "token", "credential"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn account_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "subscription_id".into(),
        json!({ "type": "string", "description": "Azure subscription ID (UUID)" }),
    );
    props.insert(
        "resource_group".into(),
        json!({ "type": "string", "description": "Resource group name" }),
    );
    props.insert(
        "account_name".into(),
        json!({ "type": "string", "description": "Storage account name (3-24 lowercase alphanumerics)" }),
    );
    props
}

fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    const ACCOUNT: &[&str] = &["subscription_id", "resource_group", "account_name"];

    let mut list = account_properties();
    list.remove("account_name");
    list.insert(
        "resource_group".into(),
        json!({ "type": "string", "description": "Optional resource group to filter by" }),
    );
    list.insert(
        "include_deleted".into(),
        json!({ "type": "boolean", "default": false, "description": "Also list soft-deleted accounts" }),
    );

    let mut details = account_properties();
    details.insert(
        "include_keys".into(),
        json!({
            "type": "boolean",
            "default": false,
            "description": "Derive access policies from key metadata (key values are never returned)"
        }),
    );

    let mut metrics = account_properties();
    metrics.insert(
        "time_range".into(),
        json!({ "type": "string", "enum": ["1h", "24h", "7d", "30d"], "default": "1h" }),
    );
    metrics.insert(
        "metrics".into(),
        json!({ "type": "array", "items": { "type": "string" }, "default": DEFAULT_METRICS }),
    );
    metrics.insert(
        "aggregation_type".into(),
        json!({
            "type": "string",
            "enum": ["Average", "Total", "Minimum", "Maximum", "Count"],
            "default": "Average"
        }),
    );
    metrics.insert(
        "interval".into(),
        json!({ "type": "string", "enum": METRIC_INTERVALS, "default": "PT1H" }),
    );

    vec![
        ToolDefinition {
            name: LIST_STORAGE_ACCOUNTS,
            description: "List storage accounts in a subscription or resource group",
            input_schema: object_schema(list, &["subscription_id"]),
        },
        ToolDefinition {
            name: GET_STORAGE_ACCOUNT_DETAILS,
            description: "Get configuration, security settings and service properties of a storage account",
            input_schema: object_schema(details, ACCOUNT),
        },
        ToolDefinition {
            name: GET_NETWORK_RULES,
            description: "Get firewall and virtual network rules of a storage account",
            input_schema: object_schema(account_properties(), ACCOUNT),
        },
        ToolDefinition {
            name: GET_PRIVATE_ENDPOINTS,
            description: "List private endpoint connections of a storage account",
            input_schema: object_schema(account_properties(), ACCOUNT),
        },
        ToolDefinition {
            name: GET_STORAGE_METRICS,
            description: "Get capacity and transaction metrics of a storage account",
            input_schema: object_schema(metrics, ACCOUNT),
        },
    ]
}

/// Copy of `params` with sensitive-looking fields masked, for logging.
pub fn sanitize_parameters(params: &Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_ascii_lowercase();
                    if SENSITIVE.iter().any(|s| lower.contains(s)) {
                        (k.clone(), Value::String(REDACTED.into()))
                    } else {
                        (k.clone(), sanitize_parameters(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_parameters).collect()),
        other => other.clone(),
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, AzureError> {
    // transports may send no arguments at all
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| AzureError::validation("arguments", e.to_string()))
}

fn render<T: Serialize>(result: ToolResult<T>) -> Value {
    let rendered = match &result {
        Ok(envelope) => serde_json::to_value(envelope),
        Err(response) => serde_json::to_value(response),
    };
    rendered.unwrap_or_else(|e| {
        json!({
            "error_code": "InternalError",
            "error_message": format!("response serialization failed: {e}"),
            "timestamp": Utc::now(),
            "correlation_id": ""
        })
    })
}

fn rejected(err: AzureError) -> Value {
    render::<()>(Err(RequestContext::new("dispatch").failure(&err)))
}

/// Run tool `name` with JSON `arguments` and return the serialized envelope.
pub async fn dispatch(service: &StorageInsights, name: &str, arguments: Value) -> Value {
    info!("Tool call {} {}", name, sanitize_parameters(&arguments));

    match name {
        LIST_STORAGE_ACCOUNTS => match parse::<ListStorageAccountsRequest>(arguments) {
            Ok(req) => render(service.list_storage_accounts(&req).await),
            Err(e) => rejected(e),
        },
        GET_STORAGE_ACCOUNT_DETAILS => match parse::<StorageAccountDetailsRequest>(arguments) {
            Ok(req) => render(service.get_storage_account_details(&req).await),
            Err(e) => rejected(e),
        },
        GET_NETWORK_RULES => match parse::<AccountRequest>(arguments) {
            Ok(req) => render(service.get_network_rules(&req).await),
            Err(e) => rejected(e),
        },
        GET_PRIVATE_ENDPOINTS => match parse::<AccountRequest>(arguments) {
            Ok(req) => render(service.get_private_endpoints(&req).await),
            Err(e) => rejected(e),
        },
        GET_STORAGE_METRICS => match parse::<StorageMetricsRequest>(arguments) {
            Ok(req) => render(service.get_storage_metrics(&req).await),
            Err(e) => rejected(e),
        },
        other => rejected(AzureError::validation("tool", format!("unknown tool '{other}'"))),
    }
}
