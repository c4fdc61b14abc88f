//! Alias selection and parameter resolution.

use std::collections::HashSet;
use std::sync::Arc;

use super::language::{detect_language, normalize_language};
use super::limits::{apply_cap_limits, clamp_temperature, estimate_tokens};
use super::types::{
    RouteCaps, RouteDecision, RouteMetadata, RouteParameters, RouteRequest, RouteResult,
};
use crate::config::{Config, ModelSpec, ModelsCatalog, PoliciesConfig};

/// Routing failures. Fatal for the current request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("prompt is missing")]
    MissingPrompt,

    #[error("unknown model or alias: {0}")]
    UnknownTarget(String),

    #[error("alias \"{alias}\" points at nonexistent model \"{model_key}\"")]
    DanglingAlias { alias: String, model_key: String },
}

/// A decision together with the catalog entry it was resolved from.
struct ResolvedModel<'a> {
    decision: RouteDecision,
    spec: &'a ModelSpec,
}

/// Router mapping requests to backend models.
#[derive(Debug, Clone)]
pub struct Router {
    catalog: Arc<ModelsCatalog>,
    policies: Arc<PoliciesConfig>,
}

impl Router {
    /// Create a new router over an already validated catalog and policy set.
    pub fn new(catalog: Arc<ModelsCatalog>, policies: Arc<PoliciesConfig>) -> Self {
        Self { catalog, policies }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.catalog(), config.policies())
    }

    pub fn catalog(&self) -> &ModelsCatalog {
        &self.catalog
    }

    pub fn policies(&self) -> &PoliciesConfig {
        &self.policies
    }

    /// Decide which model serves `request`, with which parameters and fallbacks.
    pub fn decide(&self, request: &RouteRequest) -> Result<RouteResult, RoutingError> {
        let prompt = request
            .prompt
            .as_deref()
            .ok_or(RoutingError::MissingPrompt)?;
        let mut rationale = Vec::new();

        let estimated_input_tokens = estimate_tokens(prompt);
        rationale.push(format!(
            "Estimated input tokens: ~{}.",
            estimated_input_tokens
        ));

        let no_metadata = RouteMetadata::default();
        let metadata = request.metadata.as_ref().unwrap_or(&no_metadata);

        let language = normalize_language(metadata.language.as_deref())
            .or_else(|| detect_language(prompt).map(str::to_string));
        if let Some(language) = &language {
            rationale.push(format!("Language considered: {}.", language));
        }

        rationale.push(format!(
            "Policy default alias: {}.",
            self.policies.routing.default_alias
        ));

        let forced = request
            .force_model
            .as_deref()
            .filter(|target| !target.trim().is_empty());

        // The language temperature only exists on the policy path; a forced
        // model keeps the model/policy base temperature.
        let (resolved, language_temperature) = match forced {
            Some(target) => {
                rationale.push(format!("force_model received: {}.", target));
                (self.resolve(target, &mut rationale)?, None)
            }
            None => {
                let (alias, temperature) = self.select_alias(
                    estimated_input_tokens,
                    language.as_deref(),
                    &mut rationale,
                );
                (self.resolve(&alias, &mut rationale)?, temperature)
            }
        };

        let policy_cap = self.policy_cap(metadata.tier.as_deref(), &mut rationale);
        let target_max_output_tokens =
            apply_request_cap(policy_cap, request.caps.as_ref(), &mut rationale);
        let max_output_tokens = apply_cap_limits(target_max_output_tokens, resolved.spec);
        rationale.push(format!(
            "Output cap for {}: {}.",
            resolved.decision.model_key, max_output_tokens
        ));

        let temperature =
            self.resolve_temperature(metadata, resolved.spec, language_temperature, &mut rationale);
        let fallbacks = self.resolve_fallbacks(&resolved.decision.alias, &mut rationale);

        tracing::debug!(
            alias = %resolved.decision.alias,
            provider = %resolved.decision.provider,
            model = %resolved.decision.model,
            max_output_tokens,
            temperature,
            fallbacks = fallbacks.len(),
            "Route decided"
        );

        Ok(RouteResult {
            decision: resolved.decision,
            parameters: RouteParameters {
                max_output_tokens,
                temperature,
            },
            rationale,
            fallbacks,
            estimated_input_tokens,
            target_max_output_tokens,
        })
    }

    /// Policy path: default alias, then token bucket, then language heuristic.
    ///
    /// Returns the chosen alias and the language temperature override, if any.
    fn select_alias(
        &self,
        estimated_tokens: u64,
        language: Option<&str>,
        rationale: &mut Vec<String>,
    ) -> (String, Option<f64>) {
        let routing = &self.policies.routing;
        let mut alias = routing.default_alias.clone();

        if let Some(bucket) = routing
            .token_buckets
            .iter()
            .find(|bucket| bucket.contains(estimated_tokens))
        {
            alias = bucket.alias.clone();
            rationale.push(format!("Token bucket selected alias {}.", bucket.alias));
        }

        let mut temperature = None;
        if let Some(heuristic) = language.and_then(|code| routing.language_heuristics.get(code)) {
            if let Some(language_alias) = &heuristic.alias {
                if *language_alias != alias {
                    alias = language_alias.clone();
                    rationale.push(format!("Language heuristic adjusted alias to {}.", alias));
                }
            }
            if let Some(value) = heuristic.temperature {
                temperature = Some(value);
                rationale.push(format!(
                    "Language heuristic suggested temperature {}.",
                    value
                ));
            }
        }

        (alias, temperature)
    }

    /// Resolve a target as an alias first, then as a direct model key.
    fn resolve(
        &self,
        target: &str,
        rationale: &mut Vec<String>,
    ) -> Result<ResolvedModel<'_>, RoutingError> {
        if let Some(model_key) = self.catalog.alias_target(target) {
            let spec =
                self.catalog
                    .model(model_key)
                    .ok_or_else(|| RoutingError::DanglingAlias {
                        alias: target.to_string(),
                        model_key: model_key.to_string(),
                    })?;
            rationale.push(format!(
                "Alias \"{}\" resolves to {}/{}.",
                target, spec.provider, spec.model
            ));
            return Ok(ResolvedModel {
                decision: RouteDecision::new(target, model_key, spec),
                spec,
            });
        }

        if let Some(spec) = self.catalog.model(target) {
            let alias = self.catalog.alias_for_model(target).unwrap_or(target);
            rationale.push(format!(
                "Model \"{}\" used directly ({}/{}).",
                target, spec.provider, spec.model
            ));
            return Ok(ResolvedModel {
                decision: RouteDecision::new(alias, target, spec),
                spec,
            });
        }

        Err(RoutingError::UnknownTarget(target.to_string()))
    }

    /// Tier cap if configured, otherwise the policy default.
    fn policy_cap(&self, tier: Option<&str>, rationale: &mut Vec<String>) -> u32 {
        let caps = &self.policies.caps;
        let tier = tier
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());

        match tier {
            Some(tier) => match caps.tier(&tier) {
                Some(cap) => {
                    rationale.push(format!("Tier \"{}\" cap: {}.", tier, cap));
                    cap
                }
                None => {
                    rationale.push(format!(
                        "Tier \"{}\" has no specific cap, using default {}.",
                        tier, caps.default
                    ));
                    caps.default
                }
            },
            None => {
                rationale.push(format!("Default cap applied: {}.", caps.default));
                caps.default
            }
        }
    }

    fn resolve_temperature(
        &self,
        metadata: &RouteMetadata,
        spec: &ModelSpec,
        language_override: Option<f64>,
        rationale: &mut Vec<String>,
    ) -> f64 {
        let temperatures = &self.policies.temperatures;
        let mut temperature = spec.temperature.unwrap_or(temperatures.default);
        rationale.push(format!(
            "Base temperature from model/policy: {}.",
            temperature
        ));

        if let Some(value) = language_override {
            temperature = value;
            rationale.push(format!(
                "Temperature adjusted by language heuristic: {}.",
                temperature
            ));
        }

        if let Some(domain) = metadata.domain.as_deref() {
            if let Some(value) = temperatures.domain(domain) {
                temperature = value;
                rationale.push(format!(
                    "Temperature adjusted by domain \"{}\": {}.",
                    domain, temperature
                ));
            }
        }

        if let Some(value) = metadata.temperature.filter(|t| !t.is_nan()) {
            temperature = value;
            rationale.push(format!(
                "Temperature set explicitly by the request: {}.",
                temperature
            ));
        }

        let temperature = clamp_temperature(temperature);
        rationale.push(format!("Final temperature after clamp: {}.", temperature));
        temperature
    }

    /// Resolve the fallback chain of `primary_alias`.
    ///
    /// Skips the primary alias and duplicates; unresolvable entries are noted
    /// in the rationale and dropped.
    fn resolve_fallbacks(
        &self,
        primary_alias: &str,
        rationale: &mut Vec<String>,
    ) -> Vec<RouteDecision> {
        let configured = self
            .policies
            .routing
            .fallbacks
            .get(primary_alias)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut seen: HashSet<String> = HashSet::from([primary_alias.to_string()]);
        let mut decisions = Vec::new();

        for alias in configured {
            if seen.contains(alias) {
                continue;
            }
            match self.resolve(alias, rationale) {
                Ok(resolved) => {
                    if seen.contains(&resolved.decision.alias) {
                        rationale.push(format!(
                            "Fallback \"{}\" skipped: already routed as \"{}\".",
                            alias, resolved.decision.alias
                        ));
                        continue;
                    }
                    seen.insert(alias.clone());
                    seen.insert(resolved.decision.alias.clone());
                    decisions.push(resolved.decision);
                }
                Err(err) => {
                    tracing::debug!(alias = %alias, error = %err, "Dropping fallback");
                    rationale.push(format!("Fallback \"{}\" ignored: {}.", alias, err));
                }
            }
        }

        if decisions.is_empty() {
            rationale.push("No fallback configured for the selected alias.".to_string());
        } else {
            let aliases: Vec<&str> = decisions.iter().map(|d| d.alias.as_str()).collect();
            rationale.push(format!("Fallbacks available: {}.", aliases.join(", ")));
        }

        decisions
    }
}

/// Lower the policy cap to a positive caller-requested cap.
fn apply_request_cap(policy_cap: u32, caps: Option<&RouteCaps>, rationale: &mut Vec<String>) -> u32 {
    match caps
        .and_then(|caps| caps.max_output_tokens)
        .filter(|requested| *requested > 0)
    {
        Some(requested) => {
            rationale.push(format!("Cap requested by the caller: {}.", requested));
            policy_cap.min(requested)
        }
        None => policy_cap,
    }
}
