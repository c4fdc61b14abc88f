//! Request and decision types shared by the router and the delegate.

use serde::{Deserialize, Serialize};

use crate::config::ModelSpec;

/// Caller-supplied output limits.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteCaps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Optional routing hints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A text-generation request awaiting a routing decision.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteRequest {
    /// Required; kept optional so a missing prompt surfaces as a routing error
    #[serde(default)]
    pub prompt: Option<String>,
    /// Alias or model key that bypasses alias selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<RouteCaps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RouteMetadata>,
}

impl RouteRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_force_model(mut self, target: impl Into<String>) -> Self {
        self.force_model = Some(target.into());
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.caps = Some(RouteCaps {
            max_output_tokens: Some(max_output_tokens),
        });
        self
    }

    pub fn with_metadata(mut self, metadata: RouteMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A resolved pointer to one backend target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteDecision {
    pub alias: String,
    pub model_key: String,
    pub provider: String,
    pub model: String,
}

impl RouteDecision {
    pub(crate) fn new(alias: &str, model_key: &str, spec: &ModelSpec) -> Self {
        Self {
            alias: alias.to_string(),
            model_key: model_key.to_string(),
            provider: spec.provider.clone(),
            model: spec.model.clone(),
        }
    }
}

/// Generation parameters sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RouteParameters {
    pub max_output_tokens: u32,
    pub temperature: f64,
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteResult {
    pub decision: RouteDecision,
    pub parameters: RouteParameters,
    /// Every decision point consulted, in evaluation order
    pub rationale: Vec<String>,
    pub fallbacks: Vec<RouteDecision>,
    pub estimated_input_tokens: u64,
    /// Policy/request cap before any model-specific limit
    pub target_max_output_tokens: u32,
}

impl RouteResult {
    /// Primary decision followed by the fallbacks, in attempt order.
    pub fn candidates(&self) -> impl Iterator<Item = &RouteDecision> {
        std::iter::once(&self.decision).chain(self.fallbacks.iter())
    }
}
