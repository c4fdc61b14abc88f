//! OpenAI chat completions adapter.

use async_trait::async_trait;
use reqwest::header;
use serde_json::{json, Value};

use super::{
    number, HttpEndpoint, ProviderError, ProviderHandler, ProviderResponse, ProviderUsage,
};
use crate::config::ProviderConfig;
use crate::router::{RouteDecision, RouteParameters};

/// `POST {url}/chat/completions` with bearer auth.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    endpoint: HttpEndpoint,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(config)?,
        })
    }
}

fn request_body(prompt: &str, decision: &RouteDecision, parameters: &RouteParameters) -> Value {
    json!({
        "model": decision.model,
        "messages": [{ "role": "user", "content": prompt }],
        "max_tokens": parameters.max_output_tokens,
        "temperature": parameters.temperature,
    })
}

/// Concatenated text of every choice's message content.
fn output_text(body: &Value) -> String {
    body.get("choices")
        .and_then(Value::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| choice.pointer("/message/content").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn usage(body: &Value) -> Option<ProviderUsage> {
    let usage = body.get("usage").filter(|u| u.is_object())?;
    Some(ProviderUsage {
        input_tokens: number(usage, "prompt_tokens"),
        output_tokens: number(usage, "completion_tokens"),
        total_tokens: number(usage, "total_tokens"),
    })
}

#[async_trait]
impl ProviderHandler for OpenAiProvider {
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
            .post(self.endpoint.url("chat/completions"))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(&request_body(prompt, decision, parameters));

        let body = self.endpoint.send_json(request).await?;

        Ok(ProviderResponse {
            output_text: output_text(&body),
            usage: usage(&body),
            raw: Some(body),
        })
    }
}
