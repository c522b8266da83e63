//! Provider-neutral contract for streaming chat completions.
//!
//! This crate defines the conversation records shared by the session and the
//! store, the chunks a provider streams back, and the [`CompletionProvider`]
//! trait. It carries no transport or protocol code.

use std::fmt;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Separator placed between a message and its attached context blocks.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model-initiated call of a host tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool_use_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolUse {
    #[must_use]
    pub fn new(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: impl Into<Value>,
    ) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            args: args.into(),
        }
    }

    /// Returns the string argument `name`, if present.
    #[must_use]
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

/// Outcome of one [`ToolUse`], correlated by `tool_use_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
}

impl ToolResult {
    #[must_use]
    pub fn new(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }
}

/// One conversation turn.
///
/// Optional lists are omitted from the serialized record when empty, so a
/// plain text turn persists as `{role, text, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub text: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_use: Vec<ToolUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_result: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Message {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: now_timestamp(),
            image_urls: Vec::new(),
            tool_use: Vec::new(),
            tool_result: Vec::new(),
            context: Vec::new(),
            reasoning: None,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    #[must_use]
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_image_urls(mut self, image_urls: Vec<String>) -> Self {
        self.image_urls = image_urls;
        self
    }

    #[must_use]
    pub fn with_tool_results(mut self, tool_result: Vec<ToolResult>) -> Self {
        self.tool_result = tool_result;
        self
    }

    #[must_use]
    pub fn with_tool_uses(mut self, tool_use: Vec<ToolUse>) -> Self {
        self.tool_use = tool_use;
        self
    }
}

/// Current wall-clock time as floating Unix seconds.
#[must_use]
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Copies `messages` for sending, inlining the first message's context blocks
/// into its text.
#[must_use]
pub fn expand_context(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            if index != 0 || message.context.is_empty() {
                return message.clone();
            }
            let mut expanded = message.clone();
            expanded.text = format!(
                "{}{CONTEXT_SEPARATOR}{}",
                message.text,
                message.context.join(CONTEXT_SEPARATOR)
            );
            expanded
        })
        .collect()
}

/// Host tool advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Incremental piece of an assistant response.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatChunk {
    Text(String),
    Reasoning(String),
    /// Image as a data or remote URL.
    Image(String),
    ToolUse(ToolUse),
}

/// Input for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub web_search: bool,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            system_prompt: String::new(),
            tools: Vec::new(),
            web_search: false,
        }
    }

    /// Text of the newest user message, or an empty string.
    #[must_use]
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.text.as_str())
            .unwrap_or("")
    }
}

/// Failure reported by a provider. Cancellation is never reported this way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("provider configuration error: {message}")]
    Config { message: String },
}

impl ProviderError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Stream of chunks for one completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ProviderError>> + Send>>;

/// Streams completions for a conversation.
///
/// Consumers cancel by dropping the stream; implementations must not rely on
/// being polled to completion.
pub trait CompletionProvider: Send + Sync + 'static {
    /// Stable identifier shown in status lines.
    fn provider_id(&self) -> &str;

    /// Starts a completion. Errors surface as stream items.
    fn stream(&self, request: CompletionRequest) -> ChunkStream;
}

#[cfg(test)]
mod tests {
    use futures_util::{stream, FutureExt, StreamExt};
    use serde_json::json;

    use super::{
        expand_context, ChatChunk, ChunkStream, CompletionProvider, CompletionRequest, Message,
        ProviderError, Role, ToolResult, ToolUse,
    };

    struct FixedProvider;

    impl CompletionProvider for FixedProvider {
        fn provider_id(&self) -> &str {
            "fixed"
        }

        fn stream(&self, request: CompletionRequest) -> ChunkStream {
            let reply = format!("re: {}", request.last_user_text());
            Box::pin(stream::iter(vec![Ok::<_, ProviderError>(ChatChunk::Text(reply))]))
        }
    }

    #[test]
    fn provider_streams_chunks_for_the_last_user_message() {
        let provider = FixedProvider;
        let request = CompletionRequest::new(
            vec![Message::user("first"), Message::assistant("ok"), Message::user("second")],
            "any",
        );
        let mut chunks = provider.stream(request);

        let first = chunks.next().now_or_never().flatten();
        assert_eq!(first, Some(Ok(ChatChunk::Text("re: second".to_string()))));
        assert_eq!(chunks.next().now_or_never().flatten(), None);
        assert_eq!(provider.provider_id(), "fixed");
    }

    #[test]
    fn plain_messages_serialize_without_empty_lists() {
        let mut message = Message::user("hello");
        message.timestamp = 1.5;

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value, json!({"role": "user", "text": "hello", "timestamp": 1.5}));
    }

    #[test]
    fn tool_records_use_stable_field_names() {
        let mut message = Message::assistant("")
            .with_tool_uses(vec![ToolUse::new("t1", "read_file", json!({"path": "a.txt"}))]);
        message.timestamp = 2.0;
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value["tool_use"],
            json!([{"tool_use_id": "t1", "tool_name": "read_file", "args": {"path": "a.txt"}}])
        );

        let reply = Message::user("").with_tool_results(vec![ToolResult::new("t1", "data")]);
        let value = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(value["tool_result"], json!([{"tool_use_id": "t1", "content": "data"}]));
    }

    #[test]
    fn missing_optional_fields_deserialize_to_defaults() {
        let message: Message =
            serde_json::from_str(r#"{"role": "assistant", "text": "hi"}"#).expect("parse");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.timestamp, 0.0);
        assert!(message.tool_use.is_empty());
        assert!(message.reasoning.is_none());
    }

    #[test]
    fn context_is_expanded_on_the_first_message_only() {
        let first = Message::user("summarize").with_context(vec!["a".into(), "b".into()]);
        let later = Message::user("again").with_context(vec!["c".into()]);

        let expanded = expand_context(&[first.clone(), later.clone()]);

        assert_eq!(expanded[0].text, "summarize\n---\na\n---\nb");
        assert_eq!(expanded[1].text, "again");
        assert_eq!(first.text, "summarize");
    }

    #[test]
    fn tool_use_reads_string_arguments() {
        let tool_use = ToolUse::new("t", "run_bash_command", json!({"command": "ls", "n": 1}));
        assert_eq!(tool_use.arg_str("command"), Some("ls"));
        assert_eq!(tool_use.arg_str("n"), None);
        assert_eq!(tool_use.arg_str("missing"), None);
    }

    #[test]
    fn provider_errors_describe_their_cause() {
        assert_eq!(
            ProviderError::transport("connection reset").to_string(),
            "transport error: connection reset"
        );
        let status = ProviderError::Status {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(status.to_string(), "provider returned status 429: slow down");
    }
}
