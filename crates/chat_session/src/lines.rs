//! Projection of a conversation onto menu lines.
//!
//! Every message becomes one or more [`Line`]s tagged with the message index
//! and a per-message subindex, so the menu can be rebuilt from the
//! conversation at any time.

use chat_provider::{Message, Role, ToolResult, ToolUse};
use conversation_store::{truncate_text, PREVIEW_MAX_CHARS};
use tape_menu::Color;

/// Characters of an image URL shown before the ellipsis.
pub const IMAGE_URL_PREVIEW_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Text,
    Reasoning(String),
    Context(String),
    Image(String),
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub role: Role,
    pub msg_index: usize,
    pub subindex: usize,
    /// Plain text for [`LineKind::Text`]; empty for payload lines.
    pub text: String,
    pub kind: LineKind,
}

impl Line {
    #[must_use]
    pub fn text(role: Role, msg_index: usize, subindex: usize, text: impl Into<String>) -> Self {
        Self {
            role,
            msg_index,
            subindex,
            text: text.into(),
            kind: LineKind::Text,
        }
    }

    #[must_use]
    pub fn payload(role: Role, msg_index: usize, subindex: usize, kind: LineKind) -> Self {
        Self {
            role,
            msg_index,
            subindex,
            text: String::new(),
            kind,
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.kind, LineKind::Text)
    }

    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    #[must_use]
    pub fn display_text(&self) -> String {
        match &self.kind {
            LineKind::Text => self.text.clone(),
            LineKind::Reasoning(reasoning) => {
                format!("► reasoning: {}", truncate_text(reasoning, PREVIEW_MAX_CHARS))
            }
            LineKind::Context(context) => {
                format!("► context: “{}”", truncate_text(context, PREVIEW_MAX_CHARS))
            }
            LineKind::Image(url) => {
                let head: String = url.chars().take(IMAGE_URL_PREVIEW_CHARS).collect();
                format!("► image: {head}...")
            }
            LineKind::ToolUse(tool_use) => format!(
                "► tool_use: {}: {}",
                tool_use.tool_name,
                truncate_text(&tool_use.args.to_string(), PREVIEW_MAX_CHARS)
            ),
            LineKind::ToolResult(tool_result) => format!(
                "► tool_result: {}",
                truncate_text(&tool_result.content, PREVIEW_MAX_CHARS)
            ),
        }
    }

    /// Full, untruncated payload for the detail view.
    #[must_use]
    pub fn detail_text(&self) -> Option<String> {
        match &self.kind {
            LineKind::Text => None,
            LineKind::Reasoning(text) | LineKind::Context(text) | LineKind::Image(text) => {
                Some(text.clone())
            }
            LineKind::ToolUse(tool_use) => Some(format!(
                "{}\n{}",
                tool_use.tool_name,
                serde_json::to_string_pretty(&tool_use.args).unwrap_or_default()
            )),
            LineKind::ToolResult(tool_result) => Some(tool_result.content.clone()),
        }
    }

    #[must_use]
    pub fn color(&self) -> Color {
        match self.role {
            Role::Assistant => Color::White,
            _ => Color::Cyan,
        }
    }
}

/// Lines of one message: reasoning, text, context (only with text), images,
/// tool uses, tool results.
#[must_use]
pub fn message_lines(msg_index: usize, message: &Message) -> Vec<Line> {
    let role = message.role;
    let mut kinds: Vec<LineKind> = Vec::new();
    let mut lines = Vec::new();

    if let Some(reasoning) = message.reasoning.as_ref().filter(|text| !text.is_empty()) {
        lines.push(Line::payload(
            role,
            msg_index,
            0,
            LineKind::Reasoning(reasoning.clone()),
        ));
    }
    if !message.text.is_empty() {
        // Same segmentation as streaming, so a trailing newline keeps its row.
        for text in message.text.split('\n') {
            lines.push(Line::text(role, msg_index, lines.len(), text));
        }
        kinds.extend(message.context.iter().cloned().map(LineKind::Context));
    }
    kinds.extend(message.image_urls.iter().cloned().map(LineKind::Image));
    kinds.extend(message.tool_use.iter().cloned().map(LineKind::ToolUse));
    kinds.extend(message.tool_result.iter().cloned().map(LineKind::ToolResult));
    for kind in kinds {
        lines.push(Line::payload(role, msg_index, lines.len(), kind));
    }
    lines
}

#[must_use]
pub fn conversation_lines(messages: &[Message]) -> Vec<Line> {
    messages
        .iter()
        .enumerate()
        .flat_map(|(index, message)| message_lines(index, message))
        .collect()
}

/// Subindex the next line of `msg_index` gets.
#[must_use]
pub fn next_subindex(lines: &[Line], msg_index: usize) -> usize {
    lines
        .iter()
        .rev()
        .take_while(|line| line.msg_index == msg_index)
        .map(|line| line.subindex + 1)
        .max()
        .unwrap_or(0)
}

/// Gutter text: the 1-based message number on a message's first line, blank
/// padding of the same width on the rest.
#[must_use]
pub fn line_number_text(line: &Line) -> String {
    let number = (line.msg_index + 1).to_string();
    if line.subindex == 0 {
        number
    } else {
        " ".repeat(number.len())
    }
}

#[cfg(test)]
mod tests {
    use chat_provider::{Message, Role, ToolResult, ToolUse};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tape_menu::Color;

    use super::{conversation_lines, line_number_text, message_lines, next_subindex, Line};

    fn displayed(lines: &[Line]) -> Vec<String> {
        lines.iter().map(Line::display_text).collect()
    }

    #[test]
    fn lines_follow_the_rebuild_order() {
        let mut message = Message::assistant("first\nsecond")
            .with_context(vec!["ctx".to_string()])
            .with_image_urls(vec!["data:image/png;base64,".to_string() + &"A".repeat(40)])
            .with_tool_uses(vec![ToolUse::new("t1", "list_dir", json!({"path": "."}))]);
        message.reasoning = Some("thinking".to_string());

        let lines = message_lines(3, &message);

        assert_eq!(
            displayed(&lines),
            vec![
                "► reasoning: thinking".to_string(),
                "first".to_string(),
                "second".to_string(),
                "► context: “ctx”".to_string(),
                "► image: data:image/png;base64,AAAAAAAAAA...".to_string(),
                "► tool_use: list_dir: {\"path\":\".\"}".to_string(),
            ]
        );
        assert!(lines.iter().all(|line| line.msg_index == 3));
        assert_eq!(
            lines.iter().map(|line| line.subindex).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn trailing_newlines_keep_an_empty_row() {
        let lines = message_lines(0, &Message::assistant("Hello\n"));
        assert_eq!(displayed(&lines), vec!["Hello".to_string(), String::new()]);

        let lines = message_lines(0, &Message::assistant("a\n\nb"));
        assert_eq!(
            displayed(&lines),
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }

    #[test]
    fn context_is_hidden_without_text() {
        let message = Message::user("")
            .with_context(vec!["ctx".to_string()])
            .with_tool_results(vec![ToolResult::new("t1", "line one\nline two")]);

        assert_eq!(
            displayed(&message_lines(0, &message)),
            vec!["► tool_result: line one line two".to_string()]
        );
    }

    #[test]
    fn long_payloads_are_truncated() {
        let message = Message::user("").with_tool_results(vec![ToolResult::new("t1", "x".repeat(80))]);
        let lines = message_lines(0, &message);
        assert_eq!(lines[0].display_text(), format!("► tool_result: {}...", "x".repeat(60)));
        assert_eq!(lines[0].detail_text(), Some("x".repeat(80)));
    }

    #[test]
    fn gutter_colors_and_subindexes() {
        let lines = conversation_lines(&[
            Message::user("hi"),
            Message::assistant("a\nb"),
        ]);

        assert_eq!(
            lines.iter().map(line_number_text).collect::<Vec<_>>(),
            vec!["1", "2", " "]
        );
        assert_eq!(lines[0].color(), Color::Cyan);
        assert_eq!(lines[1].color(), Color::White);
        assert_eq!(next_subindex(&lines, 1), 2);
        assert_eq!(next_subindex(&lines, 2), 0);
        assert_eq!(lines[2].role, Role::Assistant);
    }
}
