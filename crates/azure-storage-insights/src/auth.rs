//! Token acquisition flows.
//!
//! Supports the client-credentials grant against the Microsoft Identity
//! Platform v2.0 endpoint, managed identity (IMDS or the App Service
//! identity endpoint), the Azure CLI session, and the device-code flow.
//! Every failure here is reported as an authentication error naming the
//! flow that was attempted.

use std::time::Duration as StdDuration;

use chrono::{Duration, Local, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::Secret;
use crate::error::{AzureError, AzureResult};
use crate::types::{
    AzureToken, CliTokenResponse, DeviceCodeResponse, OAuthErrorResponse, TokenResponse,
};

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_CODE_TTL_SECS: u64 = 900;

/// Token endpoint URL for a given tenant.
pub fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

pub fn device_code_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/devicecode",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// v1-style resource for a v2 scope (`https://x/.default` → `https://x/`).
pub fn resource_for_scope(scope: &str) -> String {
    let base = scope.trim_end_matches(".default").trim_end_matches('/');
    format!("{base}/")
}

pub fn token_from_response(resp: TokenResponse) -> AzureToken {
    let expires_at = match (resp.expires_on, resp.expires_in) {
        (Some(on), _) => Utc.timestamp_opt(on as i64, 0).single(),
        (None, Some(secs)) => Duration::from_std(StdDuration::from_secs(secs))
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl)),
        (None, None) => None,
    };

    AzureToken {
        access_token: resp.access_token,
        token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_at,
    }
}

fn credential_failure(strategy: &str, err: AzureError) -> AzureError {
    let mut wrapped = AzureError::authentication(strategy, &err.message);
    wrapped.status_code = err.status_code;
    wrapped.provider_code = err.provider_code.clone();
    wrapped.with_source(err)
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> AzureResult<T> {
    let status = resp.status();
    if status.is_success() {
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(AzureError::from_status(status.as_u16(), &body))
    }
}

async fn post_form<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    form: &[(&str, &str)],
) -> AzureResult<T> {
    let resp = http.post(url).form(form).send().await?;
    read_json(resp).await
}

// ── Client credentials ──────────────────────────────────────────────

pub async fn acquire_client_credentials_token(
    http: &Client,
    authority_host: &str,
    tenant_id: &str,
    client_id: &str,
    client_secret: &Secret,
    scope: &str,
) -> AzureResult<AzureToken> {
    const STRATEGY: &str = "service_principal";
    if client_id.is_empty() || client_secret.is_empty() || tenant_id.is_empty() {
        return Err(AzureError::authentication(
            STRATEGY,
            "client_id, client_secret, and tenant_id are all required",
        ));
    }

    let url = token_url(authority_host, tenant_id);
    debug!("Azure token request → {}", url);

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret.expose()),
        ("scope", scope),
    ];

    post_form::<TokenResponse>(http, &url, &form)
        .await
        .map(token_from_response)
        .map_err(|e| credential_failure(STRATEGY, e))
}

// ── Managed identity ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ManagedIdentityEndpoint {
    /// Instance Metadata Service on VMs, VMSS and AKS nodes.
    Imds { base_url: String },
    /// App Service / Functions / Container Apps identity endpoint.
    AppService { endpoint: String, header: Secret },
}

impl ManagedIdentityEndpoint {
    /// `IDENTITY_ENDPOINT` + `IDENTITY_HEADER` when both are set, IMDS otherwise.
    pub fn detect(imds_base_url: &str) -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT").ok().filter(|v| !v.is_empty()),
            std::env::var("IDENTITY_HEADER").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(endpoint), Some(header)) => Self::AppService {
                endpoint,
                header: Secret::new(header),
            },
            _ => Self::Imds {
                base_url: imds_base_url.to_string(),
            },
        }
    }
}

pub async fn acquire_managed_identity_token(
    http: &Client,
    endpoint: &ManagedIdentityEndpoint,
    client_id: Option<&str>,
    scope: &str,
    probe_timeout: Option<StdDuration>,
) -> AzureResult<AzureToken> {
    const STRATEGY: &str = "managed_identity";
    let resource = resource_for_scope(scope);
    let mut query: Vec<(&str, &str)> = vec![("resource", resource.as_str())];
    if let Some(id) = client_id {
        query.push(("client_id", id));
    }

    let mut request = match endpoint {
        ManagedIdentityEndpoint::Imds { base_url } => {
            let url = format!("{}/metadata/identity/oauth2/token", base_url.trim_end_matches('/'));
            debug!("Managed identity token request (IMDS) → {}", url);
            query.push(("api-version", IMDS_API_VERSION));
            http.get(url).header("Metadata", "true")
        }
        ManagedIdentityEndpoint::AppService { endpoint, header } => {
            debug!("Managed identity token request (App Service) → {}", endpoint);
            query.push(("api-version", APP_SERVICE_API_VERSION));
            http.get(endpoint).header("X-IDENTITY-HEADER", header.expose())
        }
    };

    if let Some(timeout) = probe_timeout {
        request = request.timeout(timeout);
    }
    let resp = request
        .query(&query)
        .send()
        .await
        .map_err(|e| credential_failure(STRATEGY, e.into()))?;
    read_json::<TokenResponse>(resp)
        .await
        .map(token_from_response)
        .map_err(|e| credential_failure(STRATEGY, e))
}

// ── Azure CLI ───────────────────────────────────────────────────────

/// Parse `az account get-access-token -o json` output.
pub fn parse_cli_token(stdout: &[u8]) -> AzureResult<AzureToken> {
    let resp: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| credential_failure("cli", AzureError::from(e)))?;

    let expires_at = resp
        .expires_on_epoch
        .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
        .or_else(|| {
            resp.expires_on.as_deref().and_then(|raw| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| Local.from_local_datetime(&naive).single())
                    .map(|local| local.with_timezone(&Utc))
            })
        });

    Ok(AzureToken {
        access_token: resp.access_token,
        token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_at,
    })
}

pub async fn acquire_cli_token(
    az_path: &str,
    tenant_id: Option<&str>,
    scope: &str,
) -> AzureResult<AzureToken> {
    const STRATEGY: &str = "cli";
    let resource = resource_for_scope(scope);
    let mut cmd = tokio::process::Command::new(az_path);
    cmd.args(["account", "get-access-token", "--output", "json", "--resource"])
        .arg(&resource);
    if let Some(tenant) = tenant_id {
        cmd.args(["--tenant", tenant]);
    }
    debug!("Azure CLI token request for {}", resource);

    let output = cmd.output().await.map_err(|e| {
        AzureError::authentication(STRATEGY, format!("could not run '{az_path}': {e}")).with_source(e)
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.trim();
        return Err(AzureError::authentication(
            STRATEGY,
            if reason.is_empty() {
                format!("'{az_path}' exited with {}", output.status)
            } else {
                format!("{reason} (run 'az login')")
            },
        ));
    }

    parse_cli_token(&output.stdout)
}

// ── Device code ─────────────────────────────────────────────────────

pub async fn request_device_code(
    http: &Client,
    authority_host: &str,
    tenant_id: &str,
    client_id: &str,
    scope: &str,
) -> AzureResult<DeviceCodeResponse> {
    let url = device_code_url(authority_host, tenant_id);
    debug!("Device code request → {}", url);
    post_form(http, &url, &[("client_id", client_id), ("scope", scope)])
        .await
        .map_err(|e| credential_failure("interactive", e))
}

/// Poll the token endpoint until the user completes sign-in or the code expires.
pub async fn poll_device_code(
    http: &Client,
    authority_host: &str,
    tenant_id: &str,
    client_id: &str,
    device: &DeviceCodeResponse,
) -> AzureResult<AzureToken> {
    const STRATEGY: &str = "interactive";
    let url = token_url(authority_host, tenant_id);
    let mut interval = device.interval.unwrap_or(5);
    let now = tokio::time::Instant::now();
    let deadline = now
        .checked_add(StdDuration::from_secs(device.expires_in.unwrap_or(DEVICE_CODE_TTL_SECS)))
        .unwrap_or_else(|| now + StdDuration::from_secs(DEVICE_CODE_TTL_SECS));

    loop {
        tokio::time::sleep(StdDuration::from_secs(interval)).await;
        if tokio::time::Instant::now() >= deadline {
            return Err(AzureError::authentication(STRATEGY, "device code expired before sign-in completed"));
        }

        let form = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", client_id),
            ("device_code", device.device_code.expose()),
        ];
        let resp = http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| credential_failure(STRATEGY, e.into()))?;

        if resp.status().is_success() {
            return read_json::<TokenResponse>(resp)
                .await
                .map(token_from_response)
                .map_err(|e| credential_failure(STRATEGY, e));
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthErrorResponse>(&body) {
            Ok(err) if err.error == "authorization_pending" => continue,
            Ok(err) if err.error == "slow_down" => {
                interval += 5;
                warn!("Device code polling asked to slow down, interval now {}s", interval);
            }
            _ => {
                return Err(credential_failure(
                    STRATEGY,
                    AzureError::from_status(status, &body),
                ))
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
