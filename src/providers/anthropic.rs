//! Anthropic messages adapter.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    number, HttpEndpoint, ProviderError, ProviderHandler, ProviderResponse, ProviderUsage,
};
use crate::config::ProviderConfig;
use crate::router::{RouteDecision, RouteParameters};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `POST {url}/messages` authenticated with `x-api-key`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    endpoint: HttpEndpoint,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(config)?,
        })
    }
}

fn request_body(prompt: &str, decision: &RouteDecision, parameters: &RouteParameters) -> Value {
    json!({
        "model": decision.model,
        "max_tokens": parameters.max_output_tokens,
        "temperature": parameters.temperature,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

fn output_text(body: &Value) -> String {
    body.get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Anthropic reports input and output separately and never a total.
fn usage(body: &Value) -> Option<ProviderUsage> {
    let usage = body.get("usage").filter(|u| u.is_object())?;
    Some(ProviderUsage {
        input_tokens: number(usage, "input_tokens"),
        output_tokens: number(usage, "output_tokens"),
        total_tokens: None,
    })
}

#[async_trait]
impl ProviderHandler for AnthropicProvider {
    async fn generate(
        &self,
        prompt: &str,
        decision: &RouteDecision,
        parameters: &RouteParameters,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = self.endpoint.require_key()?;

        let request = self
            .endpoint
            .client
            .post(self.endpoint.url("messages"))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body(prompt, decision, parameters));

        let body = self.endpoint.send_json(request).await?;

        Ok(ProviderResponse {
            output_text: output_text(&body),
            usage: usage(&body),
            raw: Some(body),
        })
    }
}
