//! Response bodies of the informational endpoints.

use serde::Serialize;

use crate::config::{Config, ModelPricing, ModelsCatalog};
use crate::providers::ProviderRegistry;

/// One catalog entry as listed by `GET /v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    /// Model key
    pub id: String,
    pub object: &'static str,
    pub owned_by: String,
    pub model: String,
    pub aliases: Vec<String>,
    pub max_output_tokens: u32,
    pub pricing: ModelPricing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

impl ModelList {
    pub fn from_catalog(catalog: &ModelsCatalog) -> Self {
        let data = catalog
            .models
            .iter()
            .map(|(key, spec)| ModelEntry {
                id: key.clone(),
                object: "model",
                owned_by: spec.provider.clone(),
                model: spec.model.clone(),
                aliases: catalog
                    .aliases
                    .iter()
                    .filter(|(_, target)| *target == key)
                    .map(|(alias, _)| alias.clone())
                    .collect(),
                max_output_tokens: spec.max_output_tokens,
                pricing: spec.pricing.clone(),
            })
            .collect();

        Self {
            object: "list",
            data,
        }
    }
}

/// One configured provider as listed by `GET /providers`. Never carries the key.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderEntry {
    pub name: String,
    pub kind: String,
    pub url: String,
    pub has_api_key: bool,
    pub registered: bool,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderList {
    pub providers: Vec<ProviderEntry>,
}

impl ProviderList {
    pub fn new(config: &Config, registry: &ProviderRegistry) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|p| ProviderEntry {
                name: p.name.clone(),
                kind: p.kind.to_string(),
                url: p.base_url().to_string(),
                has_api_key: p.api_key.is_some(),
                registered: registry.contains(&p.name),
                models: config
                    .catalog
                    .models
                    .iter()
                    .filter(|(_, spec)| spec.provider == p.name)
                    .map(|(key, _)| key.clone())
                    .collect(),
            })
            .collect();

        Self { providers }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub providers: usize,
    pub models: usize,
}
