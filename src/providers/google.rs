//! Google Gemini `generateContent` adapter.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    number, HttpEndpoint, ProviderError, ProviderHandler, ProviderResponse, ProviderUsage,
};
use crate::config::ProviderConfig;
use crate::router::{RouteDecision, RouteParameters};

/// `POST {url}/models/{model}:generateContent` authenticated with
/// `x-goog-api-key`.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    endpoint: HttpEndpoint,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(config)?,
        })
    }
}

/// Path for a model id given with or without the `models/` prefix.
fn generate_path(model: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!("models/{}:generateContent", model)
}

fn request_body(prompt: &str, parameters: &RouteParameters) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "maxOutputTokens": parameters.max_output_tokens,
            "temperature": parameters.temperature,
        },
    })
}

fn output_text(body: &Value) -> String {
    let mut text = String::new();
    for candidate in body
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        for part in candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                text.push_str(chunk);
            }
        }
    }
    text
}

fn usage(body: &Value) -> Option<ProviderUsage> {
    let usage = body.get("usageMetadata").filter(|u| u.is_object())?;
    Some(ProviderUsage {
        input_tokens: number(usage, "promptTokenCount"),
        output_tokens: number(usage, "candidatesTokenCount"),
        total_tokens: number(usage, "totalTokenCount"),
    })
}

#[async_trait]
impl ProviderHandler for GoogleProvider {
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
            .post(self.endpoint.url(&generate_path(&decision.model)))
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request_body(prompt, parameters));

        let body = self.endpoint.send_json(request).await?;

        Ok(ProviderResponse {
            output_text: output_text(&body),
            usage: usage(&body),
            raw: Some(body),
        })
    }
}
