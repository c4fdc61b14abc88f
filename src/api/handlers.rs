//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::server::AppState;
use super::types::{HealthResponse, ModelList, ProviderList};
use crate::delegate::DelegateResult;
use crate::error::Error;
use crate::router::RouteRequest;
use crate::tools::{self, DiffInput, DocsInput, TestPlanInput};

/// Response header: correlation ID (UUID v4).
pub const AXCESS_REQUEST_ID_HEADER: &str = "x-axcess-request-id";
/// Response header: provider that produced the delegated result.
pub const AXCESS_PROVIDER_HEADER: &str = "x-axcess-provider";
/// Response header: total cost of the delegated call, in the model's currency.
pub const AXCESS_COST_HEADER: &str = "x-axcess-cost";
/// Response header: "true" when a fallback candidate answered.
pub const AXCESS_FALLBACK_HEADER: &str = "x-axcess-fallback";

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Attach axcess metadata headers to a response.
///
/// The request id is always set; provider, cost and fallback only when a
/// delegated result is available.
fn attach_axcess_headers(
    response: &mut Response,
    request_id: &str,
    delegated: Option<&DelegateResult>,
) {
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(AXCESS_REQUEST_ID_HEADER), value);
    }

    let Some(result) = delegated else {
        return;
    };

    if let Ok(value) = HeaderValue::from_str(&result.decision.provider) {
        headers.insert(HeaderName::from_static(AXCESS_PROVIDER_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", result.cost.total)) {
        headers.insert(HeaderName::from_static(AXCESS_COST_HEADER), value);
    }
    headers.insert(
        HeaderName::from_static(AXCESS_FALLBACK_HEADER),
        HeaderValue::from_static(if result.meta.fallback_used {
            "true"
        } else {
            "false"
        }),
    );
}

/// Unwrap a JSON body, turning extractor rejections into our error shape.
fn parse_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    body.map(|Json(value)| value)
        .map_err(|rejection| Error::BadRequest(rejection.body_text()))
}

fn json_response<T: Serialize>(request_id: &str, result: Result<T, Error>) -> Response {
    let mut response = match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    };
    attach_axcess_headers(&mut response, request_id, None);
    response
}

fn delegate_response(
    request_id: &str,
    operation: &str,
    result: Result<DelegateResult, Error>,
) -> Response {
    match result {
        Ok(result) => {
            tracing::info!(
                request_id = %request_id,
                operation,
                provider = %result.decision.provider,
                model = %result.decision.model,
                fallback_used = result.meta.fallback_used,
                "Delegated request completed"
            );
            let mut response = Json(&result).into_response();
            attach_axcess_headers(&mut response, request_id, Some(&result));
            response
        }
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                operation,
                error = %err,
                "Delegated request failed"
            );
            let mut response = err.into_response();
            attach_axcess_headers(&mut response, request_id, None);
            response
        }
    }
}

/// Handle POST /v1/route - dry-run routing decision, no provider call
pub async fn route(
    State(state): State<AppState>,
    body: Result<Json<RouteRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = parse_json(body).and_then(|request| {
        state
            .context
            .router
            .decide(&request)
            .map_err(Error::from)
    });

    if let Ok(route) = &result {
        tracing::info!(
            request_id = %request_id,
            alias = %route.decision.alias,
            provider = %route.decision.provider,
            model = %route.decision.model,
            fallbacks = route.fallbacks.len(),
            "Routed request"
        );
    }

    json_response(&request_id, result)
}

/// Handle POST /v1/delegate/run
pub async fn delegate_run(
    State(state): State<AppState>,
    body: Result<Json<RouteRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = match parse_json(body) {
        Ok(request) => tools::run(&state.context, &request).await,
        Err(err) => Err(err),
    };
    delegate_response(&request_id, "delegate.run", result)
}

/// Handle POST /v1/delegate/diff
pub async fn delegate_diff(
    State(state): State<AppState>,
    body: Result<Json<DiffInput>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = match parse_json(body) {
        Ok(input) => tools::diff(&state.context, &input).await,
        Err(err) => Err(err),
    };
    delegate_response(&request_id, "delegate.diff", result)
}

/// Handle POST /v1/delegate/tests
pub async fn delegate_tests(
    State(state): State<AppState>,
    body: Result<Json<TestPlanInput>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = match parse_json(body) {
        Ok(input) => tools::test_plan(&state.context, &input).await,
        Err(err) => Err(err),
    };
    delegate_response(&request_id, "delegate.tests", result)
}

/// Handle POST /v1/delegate/docs
pub async fn delegate_docs(
    State(state): State<AppState>,
    body: Result<Json<DocsInput>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = match parse_json(body) {
        Ok(input) => tools::docs(&state.context, &input).await,
        Err(err) => Err(err),
    };
    delegate_response(&request_id, "delegate.docs", result)
}

/// Handle GET /v1/models - list the models catalog with aliases
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(ModelList::from_catalog(state.context.router.catalog()))
}

/// Handle GET /providers - configured providers and registration state
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    Json(ProviderList::new(&state.config, &state.context.providers))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "axcess",
        version: env!("CARGO_PKG_VERSION"),
        providers: state.context.providers.len(),
        models: state.context.router.catalog().models.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{AttemptLog, Cost, DelegateMeta, Usage};
    use crate::router::{RouteDecision, RouteParameters};
    use axum::body::Body;
    use axum::http::StatusCode;

    fn empty_response() -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap()
    }

    fn delegated(fallback_used: bool, total: f64) -> DelegateResult {
        let decision = RouteDecision {
            alias: "fast".to_string(),
            model_key: "openai:gpt-4o-mini".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        DelegateResult {
            text: "ok".to_string(),
            decision: decision.clone(),
            parameters: RouteParameters {
                max_output_tokens: 100,
                temperature: 0.7,
            },
            rationale: vec![],
            usage: Usage::default(),
            cost: Cost {
                currency: "USD".to_string(),
                input: total,
                output: 0.0,
                total,
            },
            meta: DelegateMeta {
                fallback_used,
                attempts: vec![AttemptLog {
                    alias: decision.alias,
                    provider: decision.provider,
                    model: decision.model,
                    success: true,
                    error: None,
                }],
                raw: None,
            },
        }
    }

    #[test]
    fn test_attach_headers_delegated() {
        let mut response = empty_response();
        attach_axcess_headers(
            &mut response,
            "550e8400-e29b-41d4-a716-446655440000",
            Some(&delegated(true, 0.00045)),
        );
        let headers = response.headers();
        assert_eq!(
            headers.get("x-axcess-request-id").unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(headers.get("x-axcess-provider").unwrap(), "openai");
        assert_eq!(headers.get("x-axcess-cost").unwrap(), "0.000450");
        assert_eq!(headers.get("x-axcess-fallback").unwrap(), "true");
    }

    #[test]
    fn test_attach_headers_without_result() {
        let mut response = empty_response();
        attach_axcess_headers(&mut response, "abcd1234-0000-0000-0000-000000000000", None);
        let headers = response.headers();
        assert!(headers.get("x-axcess-request-id").is_some());
        assert!(headers.get("x-axcess-provider").is_none());
        assert!(headers.get("x-axcess-cost").is_none());
        assert!(headers.get("x-axcess-fallback").is_none());
    }

    #[test]
    fn test_primary_result_reports_no_fallback() {
        let mut response = empty_response();
        attach_axcess_headers(&mut response, "id", Some(&delegated(false, 0.0)));
        assert_eq!(response.headers().get("x-axcess-fallback").unwrap(), "false");
        assert_eq!(response.headers().get("x-axcess-cost").unwrap(), "0.000000");
    }

    #[test]
    fn test_request_ids_are_unique_uuids() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }
}
