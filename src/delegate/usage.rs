//! Usage reconciliation and cost computation.

use serde::Serialize;

use crate::config::ModelPricing;
use crate::providers::ProviderUsage;

/// Rationale note added when a provider reported only a total.
pub const TOTAL_ONLY_NOTE: &str =
    "Provider reported only total_tokens; counting the total as input_tokens with output_tokens=0.";

/// Token accounting for one delegated call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub estimated_input_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Cost of one delegated call, in the model's pricing currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cost {
    pub currency: String,
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

impl Cost {
    pub fn compute(usage: &Usage, pricing: &ModelPricing) -> Self {
        let input = usage.input_tokens as f64 * pricing.input;
        let output = usage.output_tokens as f64 * pricing.output;
        Self {
            currency: pricing.currency().to_string(),
            input,
            output,
            total: input + output,
        }
    }
}

/// Reject non-finite counts, clamp negatives to zero, round to an integer.
pub fn sanitize_tokens(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round() as u64)
}

/// Reconcile provider-reported usage with the router's estimate.
///
/// Missing input falls back to the estimate and missing output to zero. A
/// lone total is booked entirely as input, which is a simplification and not
/// a real split; the returned note says so. Otherwise a missing side is the
/// total minus the other side, floored at zero.
pub fn normalize_usage(
    reported: Option<&ProviderUsage>,
    estimated_input_tokens: u64,
) -> (Usage, Option<&'static str>) {
    let reported = reported.copied().unwrap_or_default();
    let input = sanitize_tokens(reported.input_tokens);
    let output = sanitize_tokens(reported.output_tokens);
    let total = sanitize_tokens(reported.total_tokens);

    let mut input_tokens = input.unwrap_or(estimated_input_tokens);
    let mut output_tokens = output.unwrap_or(0);
    let mut note = None;

    match (input, output, total) {
        (None, None, Some(total)) => {
            input_tokens = total;
            output_tokens = 0;
            note = Some(TOTAL_ONLY_NOTE);
        }
        (_, _, Some(total)) => {
            if input.is_none() {
                input_tokens = total.saturating_sub(output_tokens);
            }
            if output.is_none() {
                output_tokens = total.saturating_sub(input_tokens);
            }
        }
        _ => {}
    }

    let usage = Usage {
        estimated_input_tokens,
        input_tokens,
        output_tokens,
        total_tokens: total.unwrap_or(input_tokens.saturating_add(output_tokens)),
    };
    (usage, note)
}
