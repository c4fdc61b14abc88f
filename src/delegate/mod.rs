//! Delegated execution with sequential fallback.
//!
//! Takes a [`RouteResult`], calls providers for each candidate in order,
//! reconciles usage and computes cost for the first success.

mod executor;
pub mod usage;

pub use executor::Delegate;
pub use usage::{Cost, Usage};

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::router::{RouteDecision, RouteParameters, RouteRequest, RouteResult, Router};

/// Outcome of one candidate attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptLog {
    pub alias: String,
    pub provider: String,
    pub model: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelegateMeta {
    /// True when a candidate other than the primary produced the result
    pub fallback_used: bool,
    pub attempts: Vec<AttemptLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// A successful delegated call.
#[derive(Debug, Clone, Serialize)]
pub struct DelegateResult {
    pub text: String,
    /// Candidate that actually answered
    pub decision: RouteDecision,
    /// Parameters sent to that candidate
    pub parameters: RouteParameters,
    pub rationale: Vec<String>,
    pub usage: Usage,
    pub cost: Cost,
    pub meta: DelegateMeta,
}

/// Delegation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DelegationError {
    /// Every candidate failed; the message lists each error in attempt order.
    #[error("all candidates failed ({})", join_errors(.attempts))]
    Exhausted { attempts: Vec<AttemptLog> },
}

fn join_errors(attempts: &[AttemptLog]) -> String {
    attempts
        .iter()
        .filter_map(|attempt| attempt.error.as_deref())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Router, delegate and provider registry wired together.
#[derive(Debug, Clone)]
pub struct DelegateContext {
    pub router: Arc<Router>,
    pub delegate: Arc<Delegate>,
    pub providers: Arc<ProviderRegistry>,
}

impl DelegateContext {
    pub fn new(router: Router, delegate: Delegate, providers: ProviderRegistry) -> Self {
        Self {
            router: Arc::new(router),
            delegate: Arc::new(delegate),
            providers: Arc::new(providers),
        }
    }

    /// Build the context with one HTTP adapter per configured provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let providers = ProviderRegistry::from_config(&config.providers)?;
        Ok(Self::new(
            Router::from_config(config),
            Delegate::from_config(config),
            providers,
        ))
    }

    /// Route `request` and execute the decision.
    pub async fn run(&self, request: &RouteRequest) -> Result<DelegateResult> {
        let route = self.router.decide(request)?;
        self.execute(request, &route).await
    }

    /// Execute an already computed route.
    pub async fn execute(
        &self,
        request: &RouteRequest,
        route: &RouteResult,
    ) -> Result<DelegateResult> {
        let result = self
            .delegate
            .execute(request, route, &self.providers)
            .await?;
        Ok(result)
    }
}
