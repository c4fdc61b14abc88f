//! Named delegate operations.
//!
//! Each tool wraps the caller's instructions in an operation-specific prompt,
//! routes it through the [`DelegateContext`] and checks the shape of the
//! returned text:
//! - `delegate.run`: plain routed generation
//! - `delegate.diff`: unified diff
//! - `delegate.tests`: `## Commands` / `## Files` test plan
//! - `delegate.docs`: short Markdown document

mod diff;
mod docs;
mod run;
mod test_plan;

pub use diff::{diff, DiffInput, FileContext};
pub use docs::{docs, DocsInput};
pub use run::run;
pub use test_plan::{test_plan, TestPlanInput};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::router::{RouteCaps, RouteMetadata, RouteRequest};

/// Routing knobs shared by every tool input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolOptions {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub force_model: Option<String>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl ToolOptions {
    /// Route request for `prompt` in `domain`, carrying these options.
    fn route_request(&self, prompt: String, domain: &str) -> RouteRequest {
        RouteRequest {
            prompt: Some(prompt),
            force_model: self.force_model.clone(),
            caps: self
                .max_output_tokens
                .filter(|max| *max > 0)
                .map(|max| RouteCaps {
                    max_output_tokens: Some(max),
                }),
            metadata: Some(RouteMetadata {
                language: self.language.clone(),
                tier: self.tier.clone(),
                domain: Some(domain.to_string()),
                temperature: self.temperature,
            }),
        }
    }
}

/// Trimmed instructions, or a bad request naming the tool.
fn require_instructions<'a>(tool: &str, instructions: &'a str) -> Result<&'a str> {
    let trimmed = instructions.trim();
    if trimmed.is_empty() {
        return Err(Error::BadRequest(format!(
            "{}: \"instructions\" is required",
            tool
        )));
    }
    Ok(trimmed)
}

/// `"\n{label}:\n{value}"` for a present, non-blank value.
fn section(label: &str, value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => format!("\n{}:\n{}", label, value),
        None => String::new(),
    }
}

/// `"\n{label}: {value}."` for a present, non-blank value.
fn line(label: &str, value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => format!("\n{}: {}.", label, value),
        None => String::new(),
    }
}
