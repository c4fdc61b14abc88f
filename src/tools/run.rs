use crate::delegate::{DelegateContext, DelegateResult};
use crate::error::Result;
use crate::router::RouteRequest;

/// `delegate.run`: route and execute `request` as is.
pub async fn run(context: &DelegateContext, request: &RouteRequest) -> Result<DelegateResult> {
    let result = context.run(request).await.map_err(|e| {
        tracing::error!(error = %e, "delegate.run failed");
        e
    })?;

    if result.meta.fallback_used {
        let attempts: Vec<String> = result
            .meta
            .attempts
            .iter()
            .map(|a| {
                format!(
                    "{}/{}:{}",
                    a.provider,
                    a.model,
                    if a.success { "ok" } else { "fail" }
                )
            })
            .collect();
        tracing::warn!(attempts = %attempts.join(", "), "delegate.run used a fallback");
    } else {
        tracing::info!(
            provider = %result.decision.provider,
            model = %result.decision.model,
            "delegate.run served by primary route"
        );
    }

    Ok(result)
}
