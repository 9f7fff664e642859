//! Deadline-bounded sub-calls and partial-failure bookkeeping.

use std::future::Future;

use log::warn;
use tokio::time::{timeout_at, Instant};

use crate::error::{AzureError, AzureResult};
use crate::models::{PartialFailure, Section};

pub const PROPERTIES: &str = "properties";
pub const STORAGE_ACCOUNTS: &str = "storage_accounts";
pub const DELETED_ACCOUNTS: &str = "deleted_accounts";
pub const NETWORK_RULES: &str = "network_rules";
pub const BLOB_SERVICE_PROPERTIES: &str = "blob_service_properties";
pub const PRIVATE_ENDPOINTS: &str = "private_endpoints";
pub const ACCESS_POLICIES: &str = "access_policies";
pub const DIAGNOSTIC_SETTINGS: &str = "diagnostic_settings";
pub const AVAILABLE_METRICS: &str = "available_metrics";

pub fn metric_section(metric: &str) -> String {
    format!("metrics.{metric}")
}

/// `private_endpoints.<name>.<part>`
pub fn endpoint_section(endpoint: &str, part: &str) -> String {
    format!("{PRIVATE_ENDPOINTS}.{endpoint}.{part}")
}

/// Run `fut` until `deadline`; an unfinished call is dropped and reported as
/// a transient timeout of `section`.
pub async fn within<T, F>(deadline: Instant, section: impl Into<String>, fut: F) -> AzureResult<T>
where
    F: Future<Output = AzureResult<T>>,
{
    let section = section.into();
    match timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} cancelled at the query deadline", section);
            Err(AzureError::timeout(&section))
        }
    }
}

/// Collects failures of optional sections. Authentication and permission
/// failures are held back and abort the query in [`PartialFailures::finish`].
#[derive(Debug, Default)]
pub struct PartialFailures {
    failures: Vec<PartialFailure>,
    fatal: Option<AzureError>,
}

impl PartialFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section<T>(&mut self, section: &str, result: AzureResult<T>) -> Section<T> {
        match result {
            Ok(value) => Section::available(value),
            Err(err) => {
                let reason = err.to_string();
                self.record(section, err);
                Section::Unavailable { reason }
            }
        }
    }

    pub fn capture<T>(&mut self, section: &str, result: AzureResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(section, err);
                None
            }
        }
    }

    fn record(&mut self, section: &str, err: AzureError) {
        if err.kind.aborts_query() {
            warn!("{} failed with {}; aborting query", section, err.code());
            self.fatal.get_or_insert(err);
            return;
        }
        warn!("{} unavailable: {}", section, err);
        self.failures.push(PartialFailure::from_error(section, &err));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.fatal.is_none()
    }

    pub fn finish(self) -> AzureResult<Vec<PartialFailure>> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(self.failures),
        }
    }
}
