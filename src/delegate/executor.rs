//! Sequential fallback execution.
//!
//! Candidates are tried strictly one after another: primary decision first,
//! then each fallback in order. The first success wins. Every attempt, failed
//! or not, lands in the attempt log returned to the caller.

use std::sync::Arc;

use super::usage::{normalize_usage, Cost};
use super::{AttemptLog, DelegateMeta, DelegateResult, DelegationError};
use crate::config::{Config, ModelsCatalog};
use crate::providers::ProviderRegistry;
use crate::router::limits::apply_cap_limits;
use crate::router::{RouteDecision, RouteParameters, RouteRequest, RouteResult};

/// Executes routed requests against registered providers.
#[derive(Debug, Clone)]
pub struct Delegate {
    catalog: Arc<ModelsCatalog>,
}

impl Delegate {
    pub fn new(catalog: Arc<ModelsCatalog>) -> Self {
        Self { catalog }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.catalog())
    }

    /// Run `route`'s candidates in order until one succeeds.
    ///
    /// Unregistered providers and failing handlers are recorded as failed
    /// attempts; only running out of candidates is an error.
    pub async fn execute(
        &self,
        request: &RouteRequest,
        route: &RouteResult,
        providers: &ProviderRegistry,
    ) -> Result<DelegateResult, DelegationError> {
        let prompt = request.prompt.as_deref().unwrap_or_default();
        let mut attempts: Vec<AttemptLog> = Vec::new();

        for (index, decision) in route.candidates().enumerate() {
            let Some(handler) = providers.get(&decision.provider) else {
                let message = format!("Provider \"{}\" is not registered.", decision.provider);
                tracing::warn!(
                    alias = %decision.alias,
                    provider = %decision.provider,
                    "Skipping candidate with unregistered provider"
                );
                attempts.push(AttemptLog::failed(decision, message));
                continue;
            };

            let Some(spec) = self.catalog.model(&decision.model_key) else {
                let message = format!(
                    "Model \"{}\" not found in the catalog.",
                    decision.model_key
                );
                tracing::warn!(model = %decision.model_key, "Skipping candidate missing from catalog");
                attempts.push(AttemptLog::failed(decision, message));
                continue;
            };

            // Each candidate gets its own cap; a tighter primary cap is not inherited.
            let parameters = RouteParameters {
                max_output_tokens: apply_cap_limits(route.target_max_output_tokens, spec),
                temperature: route.parameters.temperature,
            };

            tracing::debug!(
                attempt = index + 1,
                alias = %decision.alias,
                provider = %decision.provider,
                model = %decision.model,
                max_output_tokens = parameters.max_output_tokens,
                "Calling provider"
            );

            match handler.generate(prompt, decision, &parameters).await {
                Ok(response) => {
                    let (usage, usage_note) =
                        normalize_usage(response.usage.as_ref(), route.estimated_input_tokens);
                    let cost = Cost::compute(&usage, &spec.pricing);
                    let fallback_used = index > 0;

                    let mut rationale = route.rationale.clone();
                    if let Some(note) = usage_note {
                        tracing::debug!(
                            input_tokens = usage.input_tokens,
                            "Provider reported only a total token count"
                        );
                        rationale.push(note.to_string());
                    }
                    if fallback_used {
                        rationale.push(format!("Fallback used: {}.", decision.alias));
                    }

                    attempts.push(AttemptLog::succeeded(decision));

                    tracing::info!(
                        alias = %decision.alias,
                        provider = %decision.provider,
                        model = %decision.model,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        cost = cost.total,
                        fallback_used,
                        "Delegation succeeded"
                    );

                    return Ok(DelegateResult {
                        text: response.output_text,
                        decision: decision.clone(),
                        parameters,
                        rationale,
                        usage,
                        cost,
                        meta: DelegateMeta {
                            fallback_used,
                            attempts,
                            raw: response.raw,
                        },
                    });
                }
                Err(err) => {
                    tracing::error!(
                        alias = %decision.alias,
                        provider = %decision.provider,
                        model = %decision.model,
                        kind = ?err.kind,
                        error = %err,
                        "Provider call failed"
                    );
                    attempts.push(AttemptLog::failed(decision, err.to_string()));
                }
            }
        }

        Err(DelegationError::Exhausted { attempts })
    }
}

impl AttemptLog {
    fn succeeded(decision: &RouteDecision) -> Self {
        Self {
            alias: decision.alias.clone(),
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            success: true,
            error: None,
        }
    }

    fn failed(decision: &RouteDecision, error: String) -> Self {
        Self {
            alias: decision.alias.clone(),
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            success: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::usage::TOTAL_ONLY_NOTE;
    use crate::providers::{
        ProviderError, ProviderErrorKind, ProviderHandler, ProviderResponse, ProviderUsage,
    };
    use crate::router::Router;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const FIXTURE: &str = r#"
        [aliases]
        fast = "openai:gpt-4o-mini"
        reasoning = "anthropic:claude-3-5-sonnet"
        long-context = "google:gemini-1.5-pro"

        [models."openai:gpt-4o-mini"]
        provider = "openai"
        model = "gpt-4o-mini"
        max_output_tokens = 16384
        cap = { default = 4096 }
        pricing = { input = 0.000003, output = 0.000006 }

        [models."anthropic:claude-3-5-sonnet"]
        provider = "anthropic"
        model = "claude-3-5-sonnet"
        max_output_tokens = 8192
        cap = { default = 4096, hard = 8192 }
        pricing = { input = 0.000003, output = 0.000015, currency = "EUR" }

        [models."google:gemini-1.5-pro"]
        provider = "google"
        model = "gemini-1.5-pro"
        max_output_tokens = 8192
        cap = { default = 256 }
        pricing = { input = 0.00000125, output = 0.000005 }

        [policies.routing]
        default_alias = "fast"

        [policies.routing.fallbacks]
        fast = ["long-context", "reasoning"]

        [policies.caps]
        default = 1000

        [policies.temperatures]
        default = 0.7
    "#;

    /// Scripted handler recording every call it receives.
    struct Scripted {
        result: Result<ProviderResponse, ProviderError>,
        calls: Mutex<Vec<(String, RouteParameters)>>,
    }

    impl Scripted {
        fn ok(text: &str, usage: Option<ProviderUsage>) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(ProviderResponse {
                    output_text: text.to_string(),
                    usage,
                    raw: Some(serde_json::json!({ "id": "resp-1" })),
                }),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(provider: &str, message: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(ProviderError::new(
                    provider,
                    ProviderErrorKind::Unknown,
                    message,
                )),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, RouteParameters)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderHandler for Scripted {
        async fn generate(
            &self,
            _prompt: &str,
            decision: &RouteDecision,
            parameters: &RouteParameters,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((decision.alias.clone(), *parameters));
            self.result.clone()
        }
    }

    fn setup() -> (Router, Delegate) {
        let config = Config::parse_str(FIXTURE).unwrap();
        (Router::from_config(&config), Delegate::from_config(&config))
    }

    #[tokio::test]
    async fn test_primary_success() {
        let (router, delegate) = setup();
        let openai = Scripted::ok(
            "done",
            Some(ProviderUsage {
                input_tokens: Some(10.0),
                output_tokens: Some(5.0),
                total_tokens: Some(15.0),
            }),
        );
        let mut providers = ProviderRegistry::new();
        providers.register("openai", openai.clone());

        let request = RouteRequest::new("Write a function");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        assert_eq!(result.text, "done");
        assert_eq!(result.decision.alias, "fast");
        assert!(!result.meta.fallback_used);
        assert_eq!(result.meta.attempts.len(), 1);
        assert!(result.meta.attempts[0].success);
        assert_eq!(result.usage.total_tokens, 15);
        assert_eq!(result.cost.currency, "USD");
        assert_eq!(result.rationale, route.rationale);
        assert_eq!(result.meta.raw, Some(serde_json::json!({ "id": "resp-1" })));
        assert_eq!(openai.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_total_only_usage() {
        let (router, delegate) = setup();
        let mut providers = ProviderRegistry::new();
        providers.register(
            "openai",
            Scripted::ok(
                "ok",
                Some(ProviderUsage {
                    total_tokens: Some(150.0),
                    ..Default::default()
                }),
            ),
        );

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        assert_eq!(result.usage.input_tokens, 150);
        assert_eq!(result.usage.output_tokens, 0);
        assert_eq!(result.usage.total_tokens, 150);
        assert_eq!(result.cost.input, 150.0 * 0.000003);
        assert_eq!(result.cost.total, 150.0 * 0.000003);
        assert_eq!(result.rationale.last().unwrap(), TOTAL_ONLY_NOTE);
    }

    #[tokio::test]
    async fn test_fallback_after_failure() {
        let (router, delegate) = setup();
        let google = Scripted::ok("from fallback", None);
        let mut providers = ProviderRegistry::new();
        providers.register("openai", Scripted::failing("openai", "HTTP 500"));
        providers.register("google", google.clone());

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        assert!(result.meta.fallback_used);
        assert_eq!(result.text, "from fallback");
        assert_eq!(result.decision.alias, "long-context");
        assert_eq!(result.meta.attempts.len(), 2);
        assert!(!result.meta.attempts[0].success);
        assert_eq!(
            result.meta.attempts[0].error.as_deref(),
            Some("openai: HTTP 500")
        );
        assert!(result.meta.attempts[1].success);
        assert_eq!(result.meta.attempts[1].error, None);
        assert_eq!(
            result.rationale.last().unwrap(),
            "Fallback used: long-context."
        );
        assert_eq!(google.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_prices_with_its_own_model() {
        let (router, delegate) = setup();
        let mut providers = ProviderRegistry::new();
        providers.register("anthropic", Scripted::ok("ok", None));

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        assert_eq!(result.cost.currency, "EUR");
        assert_eq!(result.usage.input_tokens, route.estimated_input_tokens);
        assert_eq!(
            result.cost.input,
            route.estimated_input_tokens as f64 * 0.000003
        );
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_skipped() {
        let (router, delegate) = setup();
        let anthropic = Scripted::ok("ok", None);
        let mut providers = ProviderRegistry::new();
        providers.register("anthropic", anthropic.clone());

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        let aliases: Vec<&str> = result
            .meta
            .attempts
            .iter()
            .map(|a| a.alias.as_str())
            .collect();
        assert_eq!(aliases, vec!["fast", "long-context", "reasoning"]);
        assert_eq!(
            result.meta.attempts[0].error.as_deref(),
            Some("Provider \"openai\" is not registered.")
        );
        assert_eq!(
            result.meta.attempts[1].error.as_deref(),
            Some("Provider \"google\" is not registered.")
        );
        assert_eq!(result.decision.alias, "reasoning");
        assert!(result.meta.fallback_used);
    }

    #[tokio::test]
    async fn test_cap_recomputed_per_candidate() {
        let (router, delegate) = setup();
        let google = Scripted::failing("google", "quota");
        let anthropic = Scripted::ok("ok", None);
        let mut providers = ProviderRegistry::new();
        providers.register("openai", Scripted::failing("openai", "down"));
        providers.register("google", google.clone());
        providers.register("anthropic", anthropic.clone());

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        assert_eq!(route.target_max_output_tokens, 1000);
        assert_eq!(route.parameters.max_output_tokens, 1000);

        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        // gemini caps at 256, sonnet is back to the 1000 policy target
        assert_eq!(google.calls()[0].1.max_output_tokens, 256);
        assert_eq!(anthropic.calls()[0].1.max_output_tokens, 1000);
        assert_eq!(result.parameters.max_output_tokens, 1000);
        assert_eq!(result.parameters.temperature, route.parameters.temperature);
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let (router, delegate) = setup();
        let mut providers = ProviderRegistry::new();
        providers.register("openai", Scripted::failing("openai", "rate limit reached"));
        providers.register("anthropic", Scripted::failing("anthropic", "API key not configured"));

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let err = delegate
            .execute(&request, &route, &providers)
            .await
            .unwrap_err();

        let DelegationError::Exhausted { attempts } = &err;
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|a| !a.success));
        assert_eq!(
            err.to_string(),
            "all candidates failed (openai: rate limit reached; \
             Provider \"google\" is not registered.; \
             anthropic: API key not configured)"
        );
    }

    #[tokio::test]
    async fn test_first_success_stops_iteration() {
        let (router, delegate) = setup();
        let google = Scripted::ok("first", None);
        let anthropic = Scripted::ok("second", None);
        let mut providers = ProviderRegistry::new();
        providers.register("openai", Scripted::failing("openai", "down"));
        providers.register("google", google.clone());
        providers.register("anthropic", anthropic.clone());

        let request = RouteRequest::new("Test prompt");
        let route = router.decide(&request).unwrap();
        let result = delegate.execute(&request, &route, &providers).await.unwrap();

        assert_eq!(result.text, "first");
        assert_eq!(result.meta.attempts.len(), 2);
        assert!(anthropic.calls().is_empty());
    }
}
