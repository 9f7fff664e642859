//! Response envelopes returned by every operation.

use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AzureError, AzureResult};
use crate::models::{PartialFailure, ResponseMetadata};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessEnvelope<T> {
    pub data: T,
    pub metadata: ResponseMetadata,
    pub summary: String,
    pub partial_failures: Vec<PartialFailure>,
}

/// Terminal failure of a whole query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
}

impl ErrorResponse {
    pub fn from_error(err: &AzureError, correlation_id: &str) -> Self {
        Self {
            error_code: err.code().to_string(),
            error_message: err.message.clone(),
            error_details: error_details(err),
            timestamp: Utc::now(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

fn error_details(err: &AzureError) -> Option<Value> {
    let mut map = Map::new();
    match &err.details {
        Some(Value::Object(details)) => map.extend(details.clone()),
        Some(other) => {
            map.insert("details".into(), other.clone());
        }
        None => {}
    }
    if let Some(status) = err.status_code {
        map.insert("status_code".into(), status.into());
    }
    if let Some(code) = &err.provider_code {
        map.insert("provider_code".into(), code.clone().into());
    }
    if err.is_timeout() {
        map.insert("reason".into(), "timeout".into());
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

pub type ToolResult<T> = Result<SuccessEnvelope<T>, ErrorResponse>;

/// Data, summary and degraded sections of a completed query.
pub type Outcome<T> = AzureResult<(T, String, Vec<PartialFailure>)>;

/// Correlation id and clock for one query.
#[derive(Debug)]
pub struct RequestContext {
    operation: &'static str,
    correlation_id: String,
    started: Instant,
}

impl RequestContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            correlation_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            timestamp: Utc::now(),
            correlation_id: self.correlation_id.clone(),
            execution_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    pub fn success<T>(&self, data: T, summary: String, partial_failures: Vec<PartialFailure>) -> SuccessEnvelope<T> {
        let metadata = self.metadata();
        info!(
            "{} [{}] completed in {}ms ({} partial failure(s))",
            self.operation,
            self.correlation_id,
            metadata.execution_time_ms,
            partial_failures.len()
        );
        SuccessEnvelope {
            data,
            metadata,
            summary,
            partial_failures,
        }
    }

    pub fn failure(&self, err: &AzureError) -> ErrorResponse {
        error!(
            "{} [{}] failed: {}",
            self.operation, self.correlation_id, err
        );
        if err.has_backtrace() {
            error!("{} [{}] backtrace:\n{}", self.operation, self.correlation_id, err.backtrace());
        }
        ErrorResponse::from_error(err, &self.correlation_id)
    }

    pub fn respond<T>(&self, outcome: Outcome<T>) -> ToolResult<T> {
        match outcome {
            Ok((data, summary, partial_failures)) => Ok(self.success(data, summary, partial_failures)),
            Err(err) => Err(self.failure(&err)),
        }
    }
}
