use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use super::{require_instructions, section, ToolOptions};
use crate::delegate::{DelegateContext, DelegateResult};
use crate::error::{Error, Result};

const TOOL: &str = "delegate.diff";

const RULES: &[&str] = &[
    "You are delegate.diff, an assistant that returns Git patches.",
    "Respond with a unified diff using \"diff --git\" headers and @@ hunks.",
    "Do not include explanations, commentary, or code fences.",
    "Only include files that actually change.",
    "Use LF line endings and preserve existing indentation.",
    "If no change is required, return an empty diff that only contains diff --git headers with no modifications.",
];

/// A file shown to the model as patch context.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileContext {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiffInput {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub files: Vec<FileContext>,
    #[serde(flatten)]
    pub options: ToolOptions,
}

fn render_files(files: &[FileContext]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = files
        .iter()
        .map(|file| {
            let header = format!("File: {}", file.path);
            let separator = "-".repeat(header.chars().count());
            format!("{}\n{}\n{}", header, separator, file.contents.trim_end())
        })
        .collect();
    format!("\nProvided files:\n{}", rendered.join("\n\n"))
}

fn build_prompt(input: &DiffInput, instructions: &str) -> String {
    format!(
        "{}{}{}\n\nUser instructions:\n{}\n",
        RULES.join("\n"),
        section("Additional context", input.context.as_deref()),
        render_files(&input.files),
        instructions
    )
}

/// Remove one fence wrapping the whole reply, if present.
fn strip_code_fence(text: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A```[a-zA-Z0-9:-]*\n(.*?)\n```\z").expect("fence pattern is valid")
    });

    let trimmed = text.trim();
    match fence.captures(trimmed).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn validate(patch: &str) -> Result<()> {
    if !patch.starts_with("diff --git ") {
        return Err(Error::InvalidOutput {
            tool: TOOL,
            message: "reply is not a unified patch starting with \"diff --git\"".to_string(),
        });
    }
    if !patch.contains("\n@@") {
        return Err(Error::InvalidOutput {
            tool: TOOL,
            message: "patch has no @@ hunks".to_string(),
        });
    }
    Ok(())
}

/// `delegate.diff`: ask for a unified diff and check its shape.
pub async fn diff(context: &DelegateContext, input: &DiffInput) -> Result<DelegateResult> {
    let instructions = require_instructions(TOOL, &input.instructions)?;
    let request = input
        .options
        .route_request(build_prompt(input, instructions), "code");

    let mut result = context.run(&request).await?;
    let patch = strip_code_fence(&result.text);
    validate(&patch)?;

    tracing::debug!(bytes = patch.len(), "delegate.diff produced a patch");
    result.text = patch;
    Ok(result)
}
