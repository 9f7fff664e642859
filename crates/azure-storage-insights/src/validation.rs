//! Request input validation. Runs before credential resolution so malformed
//! input never costs a network round-trip.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AzureError, AzureResult};

lazy_static! {
    static ref SUBSCRIPTION_ID: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .expect("subscription id pattern");
    static ref RESOURCE_GROUP: Regex =
        Regex::new(r"^[A-Za-z0-9._()\-]{1,90}$").expect("resource group pattern");
    static ref ACCOUNT_NAME: Regex = Regex::new(r"^[a-z0-9]{3,24}$").expect("account name pattern");
    static ref METRIC_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _./\-]{0,127}$").expect("metric name pattern");
}

/// ISO-8601 granularities accepted by the metrics API.
pub const METRIC_INTERVALS: &[&str] = &[
    "PT1M", "PT5M", "PT15M", "PT30M", "PT1H", "PT6H", "PT12H", "P1D",
];

pub fn validate_subscription_id(value: &str) -> AzureResult<()> {
    if SUBSCRIPTION_ID.is_match(value) {
        Ok(())
    } else {
        Err(AzureError::validation(
            "subscription_id",
            format!("'{value}' is not a valid UUID"),
        ))
    }
}

pub fn validate_resource_group(value: &str) -> AzureResult<()> {
    if !RESOURCE_GROUP.is_match(value) {
        return Err(AzureError::validation(
            "resource_group",
            "must be 1-90 characters of letters, digits, '.', '_', '-', '(' or ')'",
        ));
    }
    if value.ends_with('.') {
        return Err(AzureError::validation("resource_group", "must not end with '.'"));
    }
    Ok(())
}

pub fn validate_account_name(value: &str) -> AzureResult<()> {
    if ACCOUNT_NAME.is_match(value) {
        Ok(())
    } else {
        Err(AzureError::validation(
            "account_name",
            format!("'{value}' must be 3-24 lowercase letters or digits"),
        ))
    }
}

pub fn validate_metric_name(value: &str) -> AzureResult<()> {
    if METRIC_NAME.is_match(value) {
        Ok(())
    } else {
        Err(AzureError::validation(
            "metrics",
            format!("'{value}' is not a valid metric name"),
        ))
    }
}

pub fn validate_interval(value: &str) -> AzureResult<()> {
    if METRIC_INTERVALS.contains(&value) {
        Ok(())
    } else {
        Err(AzureError::validation(
            "interval",
            format!("'{value}' is not one of {}", METRIC_INTERVALS.join(", ")),
        ))
    }
}

/// Subscription + resource group + account, the common triple.
pub fn validate_account_scope(
    subscription_id: &str,
    resource_group: &str,
    account_name: &str,
) -> AzureResult<()> {
    validate_subscription_id(subscription_id)?;
    validate_resource_group(resource_group)?;
    validate_account_name(account_name)
}
