//! # Azure Storage Insights
//!
//! Read-only metadata aggregation over Azure Resource Manager (ARM) for
//! Storage Accounts, exposed as a small catalog of JSON tools.
//!
//! ## Features
//!
//! - **Credentials** – Azure CLI, managed identity, service principal, default chain, single-flight token cache
//! - **Storage Accounts** – inventory by subscription or resource group, soft-deleted accounts
//! - **Account Details** – properties, security posture, encryption, blob service, access policies, diagnostics
//! - **Network Rules** – firewall IP rules, VNet rules, resource access rules, bypass flags
//! - **Private Endpoints** – connection state plus NIC and private DNS enrichment
//! - **Metrics** – Azure Monitor time series with aggregation and unit reporting
//! - **Envelopes** – uniform success/error responses with correlation ids and partial failures

pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod fanout;
pub mod models;
pub mod monitor;
pub mod networking;
pub mod normalize;
pub mod service;
pub mod storage;
pub mod summary;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use commands::{dispatch, sanitize_parameters, tool_definitions, ToolDefinition};
pub use config::{AuthStrategy, InsightsConfig};
pub use envelope::{ErrorResponse, SuccessEnvelope, ToolResult};
pub use error::{AzureError, AzureErrorKind, AzureResult};
pub use service::StorageInsights;
