use serde::Deserialize;

use super::{line, require_instructions, section, ToolOptions};
use crate::delegate::{DelegateContext, DelegateResult};
use crate::error::{Error, Result};

const TOOL: &str = "delegate.docs";

/// Longest document accepted, in lines.
const MAX_LINES: usize = 200;

const RULES: &[&str] = &[
    "You are delegate.docs, a technical writer producing concise Markdown.",
    "Return a short document under 200 lines.",
    "Begin with a single H1 heading summarizing the document.",
    "Organize content into focused sections using H2 or H3 headings.",
    "Avoid introductions, apologies, or filler text.",
    "Use bullet lists only when conveying steps or key points.",
    "Do not include code fences unless strictly necessary for snippets.",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocsInput {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(flatten)]
    pub options: ToolOptions,
}

fn build_prompt(input: &DocsInput, instructions: &str) -> String {
    format!(
        "{}{}{}{}\n\nUser instructions:\n{}\n",
        RULES.join("\n"),
        line("Target audience", input.audience.as_deref()),
        line("Tone", input.tone.as_deref()),
        section("Context", input.context.as_deref()),
        instructions
    )
}

fn validate(document: &str) -> Result<()> {
    if !document.starts_with("# ") {
        return Err(Error::InvalidOutput {
            tool: TOOL,
            message: "document must start with an H1 heading".to_string(),
        });
    }
    let lines = document.lines().count();
    if lines > MAX_LINES {
        return Err(Error::InvalidOutput {
            tool: TOOL,
            message: format!("document has {} lines, limit is {}", lines, MAX_LINES),
        });
    }
    Ok(())
}

/// `delegate.docs`: ask for a short Markdown document.
pub async fn docs(context: &DelegateContext, input: &DocsInput) -> Result<DelegateResult> {
    let instructions = require_instructions(TOOL, &input.instructions)?;
    let request = input
        .options
        .route_request(build_prompt(input, instructions), "default");

    let mut result = context.run(&request).await?;
    let document = result.text.trim().to_string();
    validate(&document)?;

    result.text = document;
    Ok(result)
}
