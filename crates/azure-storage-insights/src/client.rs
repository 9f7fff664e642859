//! HTTP client wrapper for Azure Resource Manager API.
//!
//! Handles bearer-token injection, throttling/transient retries with jittered
//! exponential backoff, pagination via `nextLink`, and standard ARM error
//! extraction.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;

use crate::config::RetryConfig;
use crate::credential::Credential;
use crate::error::{AzureError, AzureErrorKind, AzureResult};
use crate::types::{ArmList, ARM_SCOPE};

/// Authenticated, read-only ARM client shared by the service surfaces.
pub struct ArmClient {
    http: Client,
    credential: Arc<Credential>,
    base_url: String,
    retry: RetryConfig,
}

impl ArmClient {
    pub fn new(http: Client, credential: Arc<Credential>, base_url: &str, retry: RetryConfig) -> Self {
        Self {
            http,
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    pub fn credential(&self) -> &Arc<Credential> {
        &self.credential
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}{path}`; `path` may also be a full resource id.
    pub fn arm_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn subscription_url(&self, subscription_id: &str, suffix: &str) -> String {
        format!("{}/subscriptions/{}{}", self.base_url, subscription_id, suffix)
    }

    pub fn resource_group_url(&self, subscription_id: &str, rg: &str, suffix: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}{}",
            self.base_url, subscription_id, rg, suffix
        )
    }

    // ── Auth header builder ──────────────────────────────────────────

    async fn auth_headers(&self) -> AzureResult<HeaderMap> {
        let token = self.credential.access_token(ARM_SCOPE).await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                AzureError::new(AzureErrorKind::Authentication, format!("Header value error: {e}"))
            })?,
        );
        Ok(headers)
    }

    // ── Core ─────────────────────────────────────────────────────────

    /// Send with retries; returns the first successful response.
    async fn send(&self, method: Method, url: &str, query: &[(&str, &str)]) -> AzureResult<Response> {
        let headers = self.auth_headers().await?;
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self
                .http
                .request(method.clone(), url)
                .headers(headers.clone())
                .query(query)
                .send()
                .await;

            let (err, retry_after) = match outcome {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retry_after = retry_after(resp.headers());
                    let body = resp.text().await.unwrap_or_default();
                    (AzureError::from_status(status, &body), retry_after)
                }
                Err(e) => (AzureError::from(e), None),
            };

            if err.kind == AzureErrorKind::Authentication {
                // token was rejected; the next query fetches a fresh one
                self.credential.invalidate().await;
            }

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = retry_after
                .map(|d| d.min(Duration::from_millis(self.retry.max_backoff_ms)))
                .unwrap_or_else(|| self.retry.backoff(attempt - 1));
            warn!(
                "Azure {} {} → {} – retrying in {}ms (attempt {}/{})",
                method,
                url,
                err.code(),
                delay.as_millis(),
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> AzureResult<T> {
        let resp = self.send(Method::GET, url, query).await?;
        decode(resp).await
    }

    /// POST with an empty body (list actions such as `listKeys`).
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> AzureResult<T> {
        let resp = self.send(Method::POST, url, query).await?;
        decode(resp).await
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Follow `nextLink` to collect **all** items from a paginated ARM list endpoint.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        initial_url: &str,
        query: &[(&str, &str)],
    ) -> AzureResult<Vec<T>> {
        let mut all: Vec<T> = Vec::new();
        let mut page: ArmList<T> = self.get_json(initial_url, query).await?;

        loop {
            all.extend(page.value);
            match page.next_link {
                // nextLink already carries api-version and the skip token
                Some(next) if !next.is_empty() => {
                    debug!("Azure paginate: {}", next);
                    page = self.get_json(&next, &[]).await?;
                }
                _ => break,
            }
        }

        Ok(all)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn decode<T: DeserializeOwned>(resp: Response) -> AzureResult<T> {
    let body = resp.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| AzureError::internal(format!("Unexpected ARM response shape: {e}")).with_source(e))
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialKind;
    use crate::testing::StaticTokenSource;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    fn client(server: &MockServer) -> ArmClient {
        let credential = Arc::new(Credential::new(
            CredentialKind::ServicePrincipal,
            Box::new(StaticTokenSource::new("test-token")),
        ));
        ArmClient::new(Client::new(), credential, &server.uri(), fast_retry())
    }

    #[tokio::test]
    async fn sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/s1/thing"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("api-version", "2023-05-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let url = c.subscription_url("s1", "/thing");
        let v: Value = c.get_json(&url, &[("api-version", "2023-05-01")]).await.unwrap();
        assert_eq!(v["ok"], true);
    }

    #[tokio::test]
    async fn retries_throttled_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "n": 1 })))
            .mount(&server)
            .await;

        let c = client(&server);
        let v: Value = c.get_json(&c.arm_url("/r"), &[]).await.unwrap();
        assert_eq!(v["n"], 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.get_json::<Value>(&c.arm_url("/r"), &[]).await.unwrap_err();
        assert_eq!(err.kind, AzureErrorKind::TRANSIENT);
        assert_eq!(err.status_code, Some(503));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "The Resource was not found." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.get_json::<Value>(&c.arm_url("/r"), &[]).await.unwrap_err();
        assert_eq!(err.kind, AzureErrorKind::NOT_FOUND);
        assert_eq!(err.provider_code.as_deref(), Some("ResourceNotFound"));
    }

    #[tokio::test]
    async fn forbidden_maps_to_permission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/r/listKeys"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "AuthorizationFailed", "message": "no access" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.post_json::<Value>(&c.arm_url("/r/listKeys"), &[]).await.unwrap_err();
        assert_eq!(err.kind, AzureErrorKind::Permission);
    }

    #[tokio::test]
    async fn follows_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/page2?api-version=x&$skiptoken=abc", server.uri());
        Mock::given(method("GET"))
            .and(path("/page1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [1, 2],
                "nextLink": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .and(query_param("$skiptoken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [3] })))
            .mount(&server)
            .await;

        let c = client(&server);
        let all: Vec<u32> = c.get_all_pages(&c.arm_url("/page1"), &[("api-version", "x")]).await.unwrap();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn malformed_body_is_internal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.get_json::<Value>(&c.arm_url("/r"), &[]).await.unwrap_err();
        assert_eq!(err.kind, AzureErrorKind::Internal);
    }

    #[test]
    fn retry_after_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&h), Some(Duration::from_secs(7)));
        h.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&h), None);
    }

    #[test]
    fn url_builders_trim_trailing_slash() {
        let credential = Arc::new(Credential::new(
            CredentialKind::Cli,
            Box::new(StaticTokenSource::new("t")),
        ));
        let c = ArmClient::new(Client::new(), credential, "https://management.azure.com/", RetryConfig::default());
        assert_eq!(
            c.resource_group_url("s", "rg", "/providers/Microsoft.Storage/storageAccounts"),
            "https://management.azure.com/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts"
        );
    }
}
