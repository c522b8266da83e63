//! Tool rounds and task results for agent mode.
//!
//! Every [`ToolUse`] of a round ends up with exactly one [`ToolResult`]:
//! the tool's output, its error, or the interruption notice.

use std::sync::OnceLock;

use chat_provider::{ToolResult, ToolUse};
use regex::Regex;

use crate::tools::ToolRegistry;

pub const TOOL_INTERRUPTED: &str = "Tool was interrupted by user.";
pub const TOOL_COMPLETED: &str = "Tool completed successfully.";
pub const EMPTY_RESULT: &str = "Returns nothing.";

/// Runs one tool. Errors become the result content.
#[must_use]
pub fn run_tool(registry: &ToolRegistry, tool_use: &ToolUse) -> ToolResult {
    let content = match registry.run(tool_use) {
        Ok(Some(content)) => content,
        Ok(None) => TOOL_COMPLETED.to_string(),
        Err(error) => {
            tracing::warn!(tool = %tool_use.tool_name, %error, "tool failed");
            error.to_string()
        }
    };
    ToolResult::new(tool_use.tool_use_id.clone(), content)
}

/// Asks `confirm` for each tool in order and returns how many were approved
/// before the first refusal.
pub fn approved_prefix<F>(tool_uses: &[ToolUse], mut confirm: F) -> usize
where
    F: FnMut(&ToolUse) -> bool,
{
    tool_uses
        .iter()
        .position(|tool_use| !confirm(tool_use))
        .unwrap_or(tool_uses.len())
}

/// One result per tool use, in tool-use order. Tools without a result are
/// resolved as interrupted.
#[must_use]
pub fn complete_results(tool_uses: &[ToolUse], mut results: Vec<ToolResult>) -> Vec<ToolResult> {
    tool_uses
        .iter()
        .map(|tool_use| {
            match results
                .iter()
                .position(|result| result.tool_use_id == tool_use.tool_use_id)
            {
                Some(index) => results.remove(index),
                None => ToolResult::new(tool_use.tool_use_id.clone(), TOOL_INTERRUPTED),
            }
        })
        .collect()
}

/// Body of the first `<result>…</result>` block, trimmed.
#[must_use]
pub fn extract_result(text: &str) -> Option<String> {
    static RESULT: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = RESULT
        .get_or_init(|| Regex::new(r"(?s)<result>(.*?)</result>").ok())
        .as_ref()?;
    let body = pattern.captures(text)?.get(1)?.as_str().trim();
    if body.is_empty() {
        Some(EMPTY_RESULT.to_string())
    } else {
        Some(body.to_string())
    }
}
