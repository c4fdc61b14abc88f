//! Backend provider adapters.
//!
//! Each adapter translates one normalized generation call into a vendor
//! request and back. The delegate only sees the [`ProviderHandler`] trait and
//! looks handlers up by provider name in a [`ProviderRegistry`].

mod anthropic;
mod google;
mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApiKey, ProviderConfig, ProviderKind};
use crate::router::{RouteDecision, RouteParameters};

/// Connect timeout shared by every adapter's HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream error bodies are cut to this many characters in messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Token counts as reported by a provider, before sanitizing.
///
/// Providers may omit any field or report nonsense (negative, fractional).
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderUsage {
    pub input_tokens: Option<f64>,
    pub output_tokens: Option<f64>,
    pub total_tokens: Option<f64>,
}

/// Successful provider call.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub output_text: String,
    pub usage: Option<ProviderUsage>,
    /// Vendor payload, passed through untouched
    pub raw: Option<serde_json::Value>,
}

/// Failure category of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Auth,
    Timeout,
    RateLimit,
    Network,
    Unknown,
}

impl ProviderErrorKind {
    /// Category for a non-success HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimit,
            _ => Self::Unknown,
        }
    }
}

/// Normalized provider failure. The message is always prefixed with the
/// provider name.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn missing_key(provider: &str) -> Self {
        Self::new(provider, ProviderErrorKind::Auth, "API key not configured")
    }

    /// Map a non-success upstream status and body.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let kind = ProviderErrorKind::from_status(status);
        let message = match kind {
            ProviderErrorKind::Auth => format!(
                "authentication failed (HTTP {}), check the API key and its scopes",
                status.as_u16()
            ),
            ProviderErrorKind::Timeout => {
                format!("upstream timed out (HTTP {})", status.as_u16())
            }
            ProviderErrorKind::RateLimit => {
                format!("rate limit reached (HTTP {})", status.as_u16())
            }
            _ => {
                let snippet: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
                if snippet.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    format!("HTTP {}: {}", status.as_u16(), snippet)
                }
            }
        };
        Self::new(provider, kind, message)
    }

    /// Map a transport-level failure (no HTTP response).
    pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(provider, ProviderErrorKind::Timeout, "request timed out")
        } else if err.is_connect() {
            Self::new(
                provider,
                ProviderErrorKind::Network,
                format!("connection failed: {}", err),
            )
        } else {
            Self::new(provider, ProviderErrorKind::Unknown, err.to_string())
        }
    }
}

/// One backend able to generate text.
///
/// Latency and timeouts are the handler's own concern; the delegate awaits
/// each call to completion.
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        decision: &RouteDecision,
        parameters: &RouteParameters,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Provider name to handler mapping.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    handlers: HashMap<String, Arc<dyn ProviderHandler>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one HTTP adapter per configured provider.
    pub fn from_config(providers: &[ProviderConfig]) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        for provider in providers {
            let handler: Arc<dyn ProviderHandler> = match provider.kind {
                ProviderKind::Openai => Arc::new(OpenAiProvider::new(provider)?),
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(provider)?),
                ProviderKind::Google => Arc::new(GoogleProvider::new(provider)?),
            };
            tracing::debug!(
                provider = %provider.name,
                kind = %provider.kind,
                url = %provider.base_url(),
                has_key = provider.api_key.is_some(),
                "Registered provider"
            );
            registry.register(provider.name.clone(), handler);
        }
        Ok(registry)
    }

    /// Add or replace the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ProviderHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Handler for `name`; `None` when the provider is not registered.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Connection settings shared by the HTTP adapters.
#[derive(Debug, Clone)]
struct HttpEndpoint {
    name: String,
    base_url: String,
    api_key: Option<ApiKey>,
    client: reqwest::Client,
}

impl HttpEndpoint {
    fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                ProviderError::new(
                    &config.name,
                    ProviderErrorKind::Unknown,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The configured key, or an `Auth` error before any request is sent.
    fn require_key(&self) -> Result<&ApiKey, ProviderError> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| ProviderError::missing_key(&self.name))
    }

    /// Send a request and decode a JSON success body.
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "Failed to reach provider");
            ProviderError::from_transport(&self.name, &e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = %self.name,
                status = %status,
                body = %body,
                "Provider returned error"
            );
            return Err(ProviderError::from_status(&self.name, status, &body));
        }

        response.json().await.map_err(|e| {
            ProviderError::new(
                &self.name,
                ProviderErrorKind::Unknown,
                format!("failed to parse response: {}", e),
            )
        })
    }
}

/// Numeric JSON field as `f64`, ignoring anything non-numeric.
fn number(value: &serde_json::Value, field: &str) -> Option<f64> {
    value.get(field).and_then(serde_json::Value::as_f64)
}
