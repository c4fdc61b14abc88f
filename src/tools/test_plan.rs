use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use super::{line, require_instructions, section, ToolOptions};
use crate::delegate::{DelegateContext, DelegateResult};
use crate::error::{Error, Result};

const TOOL: &str = "delegate.tests";

const RULES: &[&str] = &[
    "You are delegate.tests, an assistant that designs deterministic testing plans.",
    "Return Markdown with exactly two sections: \"## Commands\" and \"## Files\" in this order.",
    "In \"## Commands\" list shell commands using bullet points with inline code.",
    "In \"## Files\" provide one or more fenced code blocks labelled with the file path, like ```path/to/file.ext`.",
    "Use deterministic seeds and avoid external services.",
    "Do not add commentary outside of these sections.",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestPlanInput {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub context: Option<String>,
    /// Preferred test framework, e.g. "cargo test" or "vitest"
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(flatten)]
    pub options: ToolOptions,
}

struct Patterns {
    commands_heading: Regex,
    files_heading: Regex,
    inline_code: Regex,
    fenced_block: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("test plan patterns are valid");
        Patterns {
            commands_heading: compile(r"(?m)^## Commands"),
            files_heading: compile(r"(?m)^## Files"),
            inline_code: compile(r"`[^`\n]+`"),
            fenced_block: compile(r"(?s)```[^\n]*\n.+?```"),
        }
    })
}

fn build_prompt(input: &TestPlanInput, instructions: &str) -> String {
    format!(
        "{}{}{}\n\nUser instructions:\n{}\n",
        RULES.join("\n"),
        line("Preferred framework", input.framework.as_deref()),
        section("Context", input.context.as_deref()),
        instructions
    )
}

fn invalid(message: &str) -> Error {
    Error::InvalidOutput {
        tool: TOOL,
        message: message.to_string(),
    }
}

fn validate(plan: &str) -> Result<()> {
    let patterns = patterns();
    if !patterns.commands_heading.is_match(plan) {
        return Err(invalid("missing \"## Commands\" section"));
    }
    if !patterns.files_heading.is_match(plan) {
        return Err(invalid("missing \"## Files\" section"));
    }

    let (commands, files) = match plan.find("## Files") {
        Some(idx) => plan.split_at(idx),
        None => (plan, ""),
    };
    if !patterns.inline_code.is_match(commands) {
        return Err(invalid("no command found in the Commands section"));
    }
    if !patterns.fenced_block.is_match(files) {
        return Err(invalid("no fenced file block found in the Files section"));
    }
    Ok(())
}

/// `delegate.tests`: ask for a test plan with commands and files.
pub async fn test_plan(
    context: &DelegateContext,
    input: &TestPlanInput,
) -> Result<DelegateResult> {
    let instructions = require_instructions(TOOL, &input.instructions)?;
    let request = input
        .options
        .route_request(build_prompt(input, instructions), "code");

    let mut result = context.run(&request).await?;
    let plan = result.text.trim().to_string();
    validate(&plan)?;

    result.text = plan;
    Ok(result)
}
