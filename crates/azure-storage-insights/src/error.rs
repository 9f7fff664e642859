//! Error taxonomy and classification.
//!
//! Every failure that can surface from a query (credential layer, ARM
//! transport, input validation, decoding) is represented by a single
//! [`AzureError`] carrying one [`AzureErrorKind`]. The kind decides the wire
//! `error_code`, whether the call is retried, and whether the failure aborts
//! the whole query or only degrades one section.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

// ─── Kinds ───────────────────────────────────────────────────────────

/// Sub-classification of failures returned by the ARM API itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFailure {
    Throttled,
    Transient,
    NotFound,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AzureErrorKind {
    Authentication,
    Permission,
    Validation,
    AzureApi(ApiFailure),
    Internal,
}

/// What the transport should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    RetryWithBackoff,
    Surface,
}

impl AzureErrorKind {
    pub const THROTTLED: Self = Self::AzureApi(ApiFailure::Throttled);
    pub const TRANSIENT: Self = Self::AzureApi(ApiFailure::Transient);
    pub const NOT_FOUND: Self = Self::AzureApi(ApiFailure::NotFound);
    pub const API_OTHER: Self = Self::AzureApi(ApiFailure::Other);

    /// Stable code rendered as `error_code` in responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationError",
            Self::Permission => "PermissionError",
            Self::Validation => "ValidationError",
            Self::AzureApi(ApiFailure::Throttled) => "Throttled",
            Self::AzureApi(ApiFailure::Transient) => "Transient",
            Self::AzureApi(ApiFailure::NotFound) => "NotFound",
            Self::AzureApi(ApiFailure::Other) => "AzureAPIError",
            Self::Internal => "InternalError",
        }
    }

    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::AzureApi(ApiFailure::Throttled) | Self::AzureApi(ApiFailure::Transient) => {
                RetryDisposition::RetryWithBackoff
            }
            _ => RetryDisposition::Surface,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == RetryDisposition::RetryWithBackoff
    }

    /// Authentication and permission failures end the query even when they
    /// come from an optional sub-call.
    pub fn aborts_query(&self) -> bool {
        matches!(self, Self::Authentication | Self::Permission)
    }

    /// Classify an HTTP status returned by ARM or a token endpoint.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::Permission,
            404 => Self::NOT_FOUND,
            429 => Self::THROTTLED,
            408 | 500 | 502 | 503 | 504 => Self::TRANSIENT,
            _ => Self::API_OTHER,
        }
    }
}

impl fmt::Display for AzureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "Authentication error"),
            Self::Permission => write!(f, "Permission denied"),
            Self::Validation => write!(f, "Validation error"),
            Self::AzureApi(ApiFailure::Throttled) => write!(f, "Throttled"),
            Self::AzureApi(ApiFailure::Transient) => write!(f, "Transient failure"),
            Self::AzureApi(ApiFailure::NotFound) => write!(f, "Resource not found"),
            Self::AzureApi(ApiFailure::Other) => write!(f, "Azure API error"),
            Self::Internal => write!(f, "Internal error"),
        }
    }
}

impl Serialize for AzureErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

// ─── Error ───────────────────────────────────────────────────────────

type BoxedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct AzureError {
    pub kind: AzureErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    /// `error.code` from an ARM error body, when one was returned.
    pub provider_code: Option<String>,
    pub details: Option<Value>,
    timed_out: bool,
    source: Option<BoxedCause>,
    backtrace: Arc<Backtrace>,
}

impl AzureError {
    pub fn new(kind: AzureErrorKind, message: impl Into<String>) -> Self {
        let backtrace = if kind == AzureErrorKind::Internal {
            Backtrace::force_capture()
        } else {
            Backtrace::capture()
        };
        Self {
            kind,
            message: message.into(),
            status_code: None,
            provider_code: None,
            details: None,
            timed_out: false,
            source: None,
            backtrace: Arc::new(backtrace),
        }
    }

    pub fn with_status(kind: AzureErrorKind, message: impl Into<String>, status: u16) -> Self {
        let mut e = Self::new(kind, message);
        e.status_code = Some(status);
        e
    }

    /// Build an error from a non-success HTTP response, parsing the standard
    /// ARM `{"error":{"code","message"}}` body when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = AzureErrorKind::from_status(status);
        let parsed: Option<Value> = serde_json::from_str(body).ok();

        let arm_error = parsed.as_ref().and_then(|v| v.get("error"));
        let provider_code = arm_error
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let provider_message = arm_error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            // token endpoints use the OAuth2 shape instead
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get("error_description"))
                    .and_then(Value::as_str)
            });

        let message = match provider_message {
            Some(m) => m.to_string(),
            None if body.trim().is_empty() => format!("HTTP {status}"),
            None => body.trim().to_string(),
        };

        let mut e = Self::with_status(kind, message, status);
        e.provider_code = provider_code;
        e.details = Some(json!({
            "status": status,
            "body": parsed.unwrap_or_else(|| Value::String(body.to_string())),
        }));
        e
    }

    pub fn validation(field: &str, message: impl AsRef<str>) -> Self {
        let mut e = Self::new(
            AzureErrorKind::Validation,
            format!("Invalid {field}: {}", message.as_ref()),
        );
        e.details = Some(json!({ "field": field }));
        e
    }

    /// Credential-layer failure naming the strategy that was attempted.
    pub fn authentication(strategy: &str, message: impl AsRef<str>) -> Self {
        let mut e = Self::new(
            AzureErrorKind::Authentication,
            format!("{strategy} authentication failed: {}", message.as_ref()),
        );
        e.details = Some(json!({ "strategy": strategy }));
        e
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AzureErrorKind::Internal, message)
    }

    /// A call abandoned because the query deadline elapsed.
    pub fn timeout(what: &str) -> Self {
        let mut e = Self::new(
            AzureErrorKind::TRANSIENT,
            format!("{what} did not complete before the query deadline"),
        );
        e.timed_out = true;
        e
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Re-label a failure from a different layer while keeping its cause.
    pub fn reclassify(mut self, kind: AzureErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn has_backtrace(&self) -> bool {
        self.backtrace.status() == BacktraceStatus::Captured
    }
}

impl fmt::Display for AzureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for AzureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<reqwest::Error> for AzureError {
    fn from(e: reqwest::Error) -> Self {
        let (kind, what) = if e.is_timeout() {
            (AzureErrorKind::TRANSIENT, "request timed out")
        } else if e.is_connect() || e.is_request() {
            (AzureErrorKind::TRANSIENT, "connection failed")
        } else if e.is_decode() {
            (AzureErrorKind::Internal, "response body could not be decoded")
        } else if let Some(status) = e.status() {
            (AzureErrorKind::from_status(status.as_u16()), "request failed")
        } else {
            (AzureErrorKind::Internal, "HTTP client error")
        };
        let mut err = Self::new(kind, format!("{what}: {e}"));
        err.status_code = e.status().map(|s| s.as_u16());
        err.with_source(e)
    }
}

impl From<serde_json::Error> for AzureError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(format!("JSON parse: {e}")).with_source(e)
    }
}

impl From<AzureError> for String {
    fn from(e: AzureError) -> String {
        e.to_string()
    }
}

pub type AzureResult<T> = Result<T, AzureError>;
