//! Token estimation, output caps and temperature bounds.

use crate::config::ModelSpec;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Crude length-based input token estimate: one token per three characters.
///
/// Not a tokenizer. The empty string estimates to 0.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    if chars == 0 {
        return 0;
    }
    chars.div_ceil(3).max(1)
}

/// Most restrictive of the target cap and the model's own limits, never below 1.
///
/// Zero-valued bounds are ignored.
pub fn apply_cap_limits(target_cap: u32, spec: &ModelSpec) -> u32 {
    [
        Some(target_cap),
        Some(spec.cap.default),
        Some(spec.max_output_tokens),
        spec.cap.hard,
    ]
    .into_iter()
    .flatten()
    .filter(|limit| *limit > 0)
    .min()
    .unwrap_or(1)
    .max(1)
}

pub fn clamp_temperature(temperature: f64) -> f64 {
    temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}
