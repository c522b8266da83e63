//! Deterministic scripted implementation of the `chat_provider` contract.
//!
//! No network is involved. Each call to `stream` plays the next queued
//! [`Script`]; with the queue empty the provider echoes the last user message.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chat_provider::{
    ChatChunk, ChunkStream, CompletionProvider, CompletionRequest, ProviderError, ToolUse,
};
use futures_util::{stream, StreamExt};
use serde_json::Value;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Ordered chunks (and failures) for one completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    items: Vec<Result<ChatChunk, ProviderError>>,
    hold_open: bool,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One text chunk per entry, in order.
    #[must_use]
    pub fn from_text_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        chunks
            .into_iter()
            .fold(Self::new(), |script, chunk| script.text(chunk))
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.items.push(Ok(ChatChunk::Text(text.into())));
        self
    }

    #[must_use]
    pub fn reasoning(mut self, text: impl Into<String>) -> Self {
        self.items.push(Ok(ChatChunk::Reasoning(text.into())));
        self
    }

    #[must_use]
    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.items.push(Ok(ChatChunk::Image(url.into())));
        self
    }

    #[must_use]
    pub fn tool_use(
        mut self,
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        self.items.push(Ok(ChatChunk::ToolUse(ToolUse::new(
            tool_use_id,
            tool_name,
            args,
        ))));
        self
    }

    /// Fails the stream after the chunks queued so far.
    #[must_use]
    pub fn fail(mut self, error: ProviderError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Keeps the stream pending after the last chunk, so only cancellation
    /// ends it.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Scripted provider used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
    chunk_delay: Duration,
}

impl ScriptedProvider {
    /// Echo-only provider without delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps `delay` before each chunk.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    #[must_use]
    pub fn with_script(self, script: Script) -> Self {
        self.push_script(script);
        self
    }

    /// Queues `script` for a later completion.
    pub fn push_script(&self, script: Script) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    pub fn pending_scripts(&self) -> usize {
        lock_unpoisoned(&self.scripts).len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    fn next_script(&self, request: &CompletionRequest) -> Script {
        lock_unpoisoned(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| echo_script(request.last_user_text()))
    }
}

impl CompletionProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        MOCK_PROVIDER_ID
    }

    fn stream(&self, request: CompletionRequest) -> ChunkStream {
        let script = self.next_script(&request);
        lock_unpoisoned(&self.requests).push(request);

        let delay = self.chunk_delay;
        let body = stream::iter(script.items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });

        if script.hold_open {
            Box::pin(body.chain(stream::pending()))
        } else {
            Box::pin(body)
        }
    }
}

/// Splits `text` into word-sized chunks, keeping separators on the left.
#[must_use]
pub fn echo_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut pending = String::new();
    for ch in text.chars() {
        pending.push(ch);
        if matches!(ch, ' ' | '\n') {
            chunks.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        chunks.push(pending);
    }
    chunks
}

fn echo_script(text: &str) -> Script {
    if text.is_empty() {
        return Script::new().text("(empty message)");
    }
    Script::from_text_chunks(echo_chunks(text))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chat_provider::{ChatChunk, CompletionProvider, CompletionRequest, Message, ProviderError};
    use futures_util::{FutureExt, StreamExt};
    use serde_json::json;

    use super::{echo_chunks, Script, ScriptedProvider, MOCK_PROVIDER_ID};

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![Message::user(text)], "mock")
    }

    async fn collect(provider: &ScriptedProvider, text: &str) -> Vec<Result<ChatChunk, ProviderError>> {
        provider.stream(request(text)).collect().await
    }

    #[tokio::test]
    async fn empty_queue_echoes_the_last_user_message() {
        let provider = ScriptedProvider::new();
        let chunks = collect(&provider, "hello big world").await;

        assert_eq!(
            chunks,
            vec![
                Ok(ChatChunk::Text("hello ".to_string())),
                Ok(ChatChunk::Text("big ".to_string())),
                Ok(ChatChunk::Text("world".to_string())),
            ]
        );
        assert_eq!(provider.provider_id(), MOCK_PROVIDER_ID);
    }

    #[tokio::test]
    async fn scripts_play_in_order_then_fall_back_to_echo() {
        let provider = ScriptedProvider::new()
            .with_script(Script::new().reasoning("thinking").text("one"))
            .with_script(Script::new().tool_use("t1", "list_dir", json!({"path": "."})));

        let first = collect(&provider, "a").await;
        let second = collect(&provider, "b").await;
        let third = collect(&provider, "c").await;

        assert_eq!(first.len(), 2);
        assert!(matches!(&first[0], Ok(ChatChunk::Reasoning(text)) if text == "thinking"));
        assert!(matches!(&second[0], Ok(ChatChunk::ToolUse(tool)) if tool.tool_name == "list_dir"));
        assert_eq!(third, vec![Ok(ChatChunk::Text("c".to_string()))]);
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(provider.pending_scripts(), 0);
    }

    #[tokio::test]
    async fn failure_is_delivered_after_the_preceding_chunks() {
        let provider = ScriptedProvider::new().with_script(
            Script::from_text_chunks(["a", "b"]).fail(ProviderError::transport("reset")),
        );
        let chunks = collect(&provider, "x").await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Err(ProviderError::transport("reset")));
    }

    #[tokio::test]
    async fn held_stream_stays_pending_after_its_chunks() {
        let provider = ScriptedProvider::new()
            .with_chunk_delay(Duration::from_millis(1))
            .with_script(Script::from_text_chunks(["only"]).hold_open());
        let mut chunks = provider.stream(request("x"));

        assert_eq!(chunks.next().await, Some(Ok(ChatChunk::Text("only".to_string()))));
        assert!(chunks.next().now_or_never().is_none());
    }

    #[test]
    fn echo_chunks_keep_separators() {
        assert_eq!(echo_chunks("a b\nc"), vec!["a ", "b\n", "c"]);
        assert!(echo_chunks("").is_empty());
    }
}
