//! The streaming chat session.
//!
//! A [`ChatSession`] is a [`MenuHost`] whose items are the [`Line`]s of the
//! conversation. Completions stream on the session's [`TaskRunner`]; every
//! chunk comes back through the foreground queue tagged with its generation
//! id, so events of a cancelled or replaced generation are ignored.
//!
//! States: idle, generating (one completion in flight) and running tools
//! (one tool round in flight). `send_message` is a no-op unless idle.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chat_provider::{
    expand_context, ChatChunk, CompletionProvider, CompletionRequest, Message, ProviderError,
    Role, ToolResult, ToolUse,
};
use conversation_store::{save_conversation, ConversationSummary, HistoryManager};
use futures_util::StreamExt;
use tape_menu::widgets::{choose, confirm, list_menu, ListHost};
use tape_menu::{
    Color, ForegroundQueue, Menu, MenuHost, MenuIo, MenuOptions, MenuOutcome, MenuState,
    TaskContext, TaskHandle, TaskOutcome, TaskRunner,
};

use crate::agent::{approved_prefix, complete_results, extract_result, run_tool};
use crate::editor::{ExternalEditor, MessageEditor};
use crate::error::SessionError;
use crate::lines::{self, conversation_lines, message_lines, next_subindex, Line, LineKind};
use crate::settings::{ChatSettings, SETTINGS_FILE_NAME};
use crate::tools::ToolRegistry;

pub const MAX_CHAT_HISTORY: usize = 200;
pub const CHAT_FILE_PREFIX: &str = "chat_";
pub const CHAT_FILE_EXT: &str = ".json";
pub const INTERRUPTED_MARKER: &str = "[INTERRUPTED]";

/// How a streamed completion ended. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(ProviderError),
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Holds `settings.json` and the `conversations/` history.
    pub data_dir: PathBuf,
    pub prompt: String,
    pub system_prompt: String,
    /// Sent as soon as the menu opens.
    pub first_message: Option<String>,
    /// Attached to the next user message.
    pub context: Vec<String>,
    pub image_urls: Vec<String>,
    /// Receives the first completed answer; the menu then closes.
    pub out_file: Option<PathBuf>,
    /// Overrides the persisted model for this session.
    pub model: Option<String>,
    /// Advertise tools to the provider.
    pub agent: bool,
    pub confirm_tools: bool,
    /// Close once an answer carries a `<result>` block.
    pub run_once: bool,
    pub cancellable: bool,
    pub idle_poll: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            prompt: "u".to_string(),
            system_prompt: String::new(),
            first_message: None,
            context: Vec::new(),
            image_urls: Vec::new(),
            out_file: None,
            model: None,
            agent: false,
            confirm_tools: false,
            run_once: false,
            cancellable: false,
            idle_poll: Duration::from_millis(1000),
        }
    }
}

/// `$HOME/.config/tape_chat`, or a directory under the temp dir.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join("tape_chat"))
        .unwrap_or_else(|| env::temp_dir().join("tape_chat"))
}

type TaskSeq = u64;

struct Generation {
    id: TaskSeq,
    handle: TaskHandle,
    message: Message,
    /// Text chunks extend the last line while it is an open text line.
    text_line_open: bool,
}

struct ToolRound {
    id: TaskSeq,
    handle: TaskHandle,
    tool_uses: Vec<ToolUse>,
}

pub struct ChatSession {
    menu: MenuState<Line>,
    options: ChatOptions,
    settings: ChatSettings,
    settings_path: PathBuf,
    runner: TaskRunner<ChatSession>,
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    editor: Box<dyn MessageEditor>,
    history: HistoryManager,
    chat_file: PathBuf,
    messages: Vec<Message>,
    pending_context: Vec<String>,
    pending_images: Vec<String>,
    generation: Option<Generation>,
    tool_round: Option<ToolRound>,
    /// Tool uses of the last answer, resolved on the next tick.
    pending_tool_uses: Option<Vec<ToolUse>>,
    /// Failure waiting for the retry/dismiss prompt.
    pending_error: Option<ProviderError>,
    next_task_seq: TaskSeq,
    retry_count: u32,
    task_result: Option<String>,
    last_response: Option<String>,
    fatal_error: Option<SessionError>,
}

impl ChatSession {
    pub fn new(
        options: ChatOptions,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self, SessionError> {
        let settings_path = options.data_dir.join(SETTINGS_FILE_NAME);
        let mut settings = ChatSettings::load(&settings_path)?;
        if let Some(model) = &options.model {
            settings.model = model.clone();
        }
        let history = HistoryManager::new(
            options.data_dir.join("conversations"),
            CHAT_FILE_PREFIX,
            CHAT_FILE_EXT,
        )
        .with_max_history(MAX_CHAT_HISTORY);
        let chat_file = history.new_file_path()?;
        let runner = TaskRunner::new(ForegroundQueue::new())?;

        let menu_options = MenuOptions {
            cancellable: options.cancellable,
            close_on_selection: false,
            search_mode: false,
            wrap_text: true,
            line_number: true,
            follow: true,
            idle_poll: options.idle_poll,
            ..MenuOptions::default()
        }
        .with_prompt(options.prompt.clone());

        tracing::info!(
            provider = provider.provider_id(),
            model = %settings.model,
            chat_file = %chat_file.display(),
            "chat session created"
        );
        Ok(Self {
            menu: MenuState::new(Vec::new(), Line::display_text, menu_options),
            pending_context: options.context.clone(),
            pending_images: options.image_urls.clone(),
            options,
            settings,
            settings_path,
            runner,
            provider,
            tools: Arc::new(ToolRegistry::with_builtins()),
            editor: Box::new(ExternalEditor::from_env()),
            history,
            chat_file,
            messages: Vec::new(),
            generation: None,
            tool_round: None,
            pending_tool_uses: None,
            pending_error: None,
            next_task_seq: 1,
            retry_count: 0,
            task_result: None,
            last_response: None,
            fatal_error: None,
        })
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    #[must_use]
    pub fn with_editor(mut self, editor: impl MessageEditor + 'static) -> Self {
        self.editor = Box::new(editor);
        self
    }

    // --- accessors ---

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn lines(&self) -> &[Line] {
        self.menu.items()
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn chat_file(&self) -> &Path {
        &self.chat_file
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn pending_context(&self) -> &[String] {
        &self.pending_context
    }

    pub fn pending_images(&self) -> &[String] {
        &self.pending_images
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    pub fn is_running_tools(&self) -> bool {
        self.tool_round.is_some()
    }

    /// Generating, running tools, or holding an unresolved tool round.
    pub fn is_busy(&self) -> bool {
        self.generation.is_some() || self.tool_round.is_some() || self.pending_tool_uses.is_some()
    }

    pub fn generation_handle(&self) -> Option<&TaskHandle> {
        self.generation.as_ref().map(|generation| &generation.handle)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Body of the last `<result>` block an answer produced.
    pub fn task_result(&self) -> Option<&str> {
        self.task_result.as_deref()
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Error that closed the menu, if any.
    pub fn take_fatal_error(&mut self) -> Option<SessionError> {
        self.fatal_error.take()
    }

    /// Queue through which background work reaches the session.
    pub fn foreground(&self) -> &ForegroundQueue<ChatSession> {
        self.runner.foreground()
    }

    pub fn add_context(&mut self, context: impl Into<String>) {
        self.pending_context.push(context.into());
        self.menu.mark_dirty();
    }

    pub fn add_image_url(&mut self, url: impl Into<String>) {
        self.pending_images.push(url.into());
        self.menu.mark_dirty();
    }

    // --- sending and streaming ---

    /// Records a user message (when there is text or tool results) and
    /// starts a completion. Returns false while busy.
    pub fn send_message(&mut self, text: &str, tool_results: Vec<ToolResult>) -> bool {
        if self.is_busy() {
            tracing::debug!("send ignored while busy");
            return false;
        }
        self.menu.clear_input();
        if !text.is_empty() || !tool_results.is_empty() {
            let message = Message::user(text)
                .with_context(std::mem::take(&mut self.pending_context))
                .with_image_urls(std::mem::take(&mut self.pending_images))
                .with_tool_results(tool_results);
            self.push_message(message);
            self.persist();
        }
        self.menu.set_follow(true);
        self.retry_count = 0;
        self.start_generation("generating");
        true
    }

    fn start_generation(&mut self, status: &str) {
        if self.generation.is_some() {
            return;
        }
        let id = self.allocate_task_seq();
        let mut request =
            CompletionRequest::new(expand_context(&self.messages), self.settings.model.clone());
        request.system_prompt = self.options.system_prompt.clone();
        request.web_search = self.settings.web_search;
        if self.options.agent {
            request.tools = self.tools.definitions();
        }
        tracing::info!(
            generation = id,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "generation started"
        );

        let provider = Arc::clone(&self.provider);
        let handle = self.runner.submit_guarded(
            move |ctx| stream_completion(ctx, provider, request, id),
            move |session: &mut ChatSession| {
                session.finish_generation(
                    id,
                    StreamOutcome::Failed(ProviderError::protocol("completion task panicked")),
                );
            },
        );
        self.generation = Some(Generation {
            id,
            handle,
            message: Message::assistant(""),
            text_line_open: false,
        });
        self.menu.set_message(status);
    }

    fn allocate_task_seq(&mut self) -> TaskSeq {
        let id = self.next_task_seq;
        self.next_task_seq += 1;
        id
    }

    /// Applies one streamed chunk of generation `id`.
    pub fn apply_chunk(&mut self, id: TaskSeq, chunk: ChatChunk) {
        if self.generation.as_ref().map(|generation| generation.id) != Some(id) {
            tracing::trace!(generation = id, "stale chunk ignored");
            return;
        }
        match chunk {
            ChatChunk::Text(text) => self.append_text_chunk(&text),
            ChatChunk::Reasoning(text) => self.append_reasoning_chunk(&text),
            ChatChunk::Image(url) => {
                if let Some(generation) = self.generation.as_mut() {
                    generation.message.image_urls.push(url.clone());
                }
                self.append_payload_line(LineKind::Image(url));
            }
            ChatChunk::ToolUse(tool_use) => {
                if let Some(generation) = self.generation.as_mut() {
                    generation.message.tool_use.push(tool_use.clone());
                }
                self.append_payload_line(LineKind::ToolUse(tool_use));
            }
        }
    }

    fn append_text_chunk(&mut self, chunk: &str) {
        let msg_index = self.messages.len();
        let Some(generation) = self.generation.as_mut() else {
            return;
        };
        generation.message.text.push_str(chunk);
        let mut open = generation.text_line_open;
        generation.text_line_open = true;

        for (segment_index, segment) in chunk.split('\n').enumerate() {
            if segment_index > 0 || !open {
                let subindex = next_subindex(self.menu.items(), msg_index);
                self.menu
                    .append_item(Line::text(Role::Assistant, msg_index, subindex, ""));
                open = true;
            }
            let last = self.menu.len().saturating_sub(1);
            if let Some(line) = self.menu.item_mut(last) {
                line.text.push_str(segment);
            }
        }
    }

    fn append_reasoning_chunk(&mut self, chunk: &str) {
        let msg_index = self.messages.len();
        if let Some(generation) = self.generation.as_mut() {
            generation
                .message
                .reasoning
                .get_or_insert_with(String::new)
                .push_str(chunk);
        }
        let last = self.menu.len().saturating_sub(1);
        if let Some(line) = self.menu.item_mut(last) {
            if line.msg_index == msg_index {
                if let LineKind::Reasoning(reasoning) = &mut line.kind {
                    reasoning.push_str(chunk);
                    return;
                }
            }
        }
        self.append_payload_line(LineKind::Reasoning(chunk.to_string()));
    }

    fn append_payload_line(&mut self, kind: LineKind) {
        let msg_index = self.messages.len();
        if let Some(generation) = self.generation.as_mut() {
            generation.text_line_open = false;
        }
        let subindex = next_subindex(self.menu.items(), msg_index);
        self.menu
            .append_item(Line::payload(Role::Assistant, msg_index, subindex, kind));
    }

    /// Ends generation `id`. Events of other generations are ignored.
    pub fn finish_generation(&mut self, id: TaskSeq, outcome: StreamOutcome) {
        if self.generation.as_ref().map(|generation| generation.id) != Some(id) {
            tracing::trace!(generation = id, "stale finish ignored");
            return;
        }
        if let Some(generation) = self.generation.take() {
            self.commit_generation(generation, outcome);
        }
    }

    /// Cancels the in-flight completion and commits its partial answer.
    /// Returns false when nothing was generating.
    pub fn cancel_generation(&mut self) -> bool {
        let Some(generation) = self.generation.take() else {
            return false;
        };
        self.runner.cancel(&generation.handle);
        self.commit_generation(generation, StreamOutcome::Cancelled);
        true
    }

    fn commit_generation(&mut self, generation: Generation, outcome: StreamOutcome) {
        let Generation {
            id, mut message, ..
        } = generation;
        match outcome {
            StreamOutcome::Completed => {
                let text = message.text.clone();
                let tool_uses = message.tool_use.clone();
                self.messages.push(message);
                self.persist();
                self.menu.set_message("done");
                tracing::info!(generation = id, chars = text.len(), tool_uses = tool_uses.len(), "generation finished");
                self.last_response = Some(text.clone());
                if let Some(path) = self.options.out_file.clone() {
                    match fs::write(&path, &text) {
                        Ok(()) => self.menu.close(),
                        Err(source) => {
                            self.fail(SessionError::io("writing out file", path, source));
                        }
                    }
                }
                self.on_message(&text, tool_uses);
            }
            StreamOutcome::Cancelled => {
                message.text.push('\n');
                message.text.push_str(INTERRUPTED_MARKER);
                let msg_index = self.messages.len();
                let subindex = next_subindex(self.menu.items(), msg_index);
                self.menu.append_item(Line::text(
                    Role::Assistant,
                    msg_index,
                    subindex,
                    INTERRUPTED_MARKER,
                ));
                self.messages.push(message);
                self.persist();
                self.menu.set_message("cancelled");
                tracing::info!(generation = id, "generation cancelled");
            }
            StreamOutcome::Failed(error) => {
                tracing::warn!(generation = id, %error, "generation failed");
                self.refresh_lines();
                if self.settings.retry {
                    self.retry_count += 1;
                    let status = format!("retry {}: {error}", self.retry_count);
                    self.start_generation(&status);
                } else {
                    self.menu.set_message(format!("error: {error}"));
                    self.pending_error = Some(error);
                }
            }
        }
    }

    fn on_message(&mut self, text: &str, tool_uses: Vec<ToolUse>) {
        if !tool_uses.is_empty() {
            self.pending_tool_uses = Some(tool_uses);
            return;
        }
        if let Some(result) = extract_result(text) {
            tracing::info!(chars = result.len(), "task result extracted");
            self.task_result = Some(result);
            if self.options.run_once {
                self.menu.close();
            }
        }
    }

    fn prompt_provider_error(&mut self, io: &mut MenuIo<'_>, error: ProviderError) {
        let prompt = format!("error: {error}");
        if choose(io, &prompt, &["retry", "dismiss"]) == Some(0) {
            self.retry_count += 1;
            let status = format!("retry {}: {error}", self.retry_count);
            self.start_generation(&status);
        } else {
            self.menu.set_message(prompt);
        }
    }

    // --- tool rounds ---

    fn start_tool_round(&mut self, io: &mut MenuIo<'_>, tool_uses: Vec<ToolUse>) {
        let approved = if self.options.confirm_tools {
            approved_prefix(&tool_uses, |tool_use| {
                confirm(io, &format!("Run tool ({})?", tool_use.tool_name))
            })
        } else {
            tool_uses.len()
        };
        if let Some(refused) = tool_uses.get(approved) {
            tracing::info!(tool = %refused.tool_name, "tool round interrupted by user");
        }
        if approved == 0 {
            let results = complete_results(&tool_uses, Vec::new());
            self.send_message("", results);
            return;
        }

        let id = self.allocate_task_seq();
        let runnable = tool_uses[..approved].to_vec();
        let registry = Arc::clone(&self.tools);
        tracing::info!(round = id, tools = approved, "tool round started");
        let handle = self.runner.submit_guarded(
            move |ctx| async move {
                let mut results = Vec::new();
                for tool_use in runnable {
                    let registry = Arc::clone(&registry);
                    let tool_use_id = tool_use.tool_use_id.clone();
                    let work = tokio::task::spawn_blocking(move || run_tool(&registry, &tool_use));
                    match ctx.cancellable(work).await {
                        TaskOutcome::Completed(Ok(result)) => results.push(result),
                        TaskOutcome::Completed(Err(error)) => results.push(ToolResult::new(
                            tool_use_id,
                            format!("tool task failed: {error}"),
                        )),
                        TaskOutcome::Cancelled => return,
                    }
                }
                ctx.post_to_foreground(move |session: &mut ChatSession| {
                    session.finish_tool_round(id, results);
                });
            },
            move |session: &mut ChatSession| session.finish_tool_round(id, Vec::new()),
        );
        self.tool_round = Some(ToolRound {
            id,
            handle,
            tool_uses,
        });
        self.menu.set_message(format!("running {approved} tool(s)"));
    }

    /// Sends the results of tool round `id` as the next user message.
    pub fn finish_tool_round(&mut self, id: TaskSeq, results: Vec<ToolResult>) {
        if self.tool_round.as_ref().map(|round| round.id) != Some(id) {
            return;
        }
        let Some(round) = self.tool_round.take() else {
            return;
        };
        let results = complete_results(&round.tool_uses, results);
        tracing::info!(round = id, results = results.len(), "tool round finished");
        self.send_message("", results);
    }

    /// Interrupts a running or pending tool round. Every tool use of the
    /// round is answered with the interruption notice; no completion starts.
    pub fn cancel_tool_round(&mut self) -> bool {
        let tool_uses = if let Some(round) = self.tool_round.take() {
            self.runner.cancel(&round.handle);
            round.tool_uses
        } else if let Some(tool_uses) = self.pending_tool_uses.take() {
            tool_uses
        } else {
            return false;
        };
        let results = complete_results(&tool_uses, Vec::new());
        self.push_message(Message::user("").with_tool_results(results));
        self.persist();
        self.menu.set_message("cancelled");
        true
    }

    /// Cancels whatever is in flight.
    pub fn interrupt(&mut self) -> bool {
        let generating = self.cancel_generation();
        let tools = self.cancel_tool_round();
        generating || tools
    }

    // --- conversation editing ---

    /// Replaces the text of message `index` and drops every later message.
    /// A user message is answered again.
    pub fn edit_message(&mut self, index: usize, new_text: &str) -> bool {
        if self.is_busy() {
            self.menu.set_message("busy: wait or press escape");
            return false;
        }
        let Some(message) = self.messages.get_mut(index) else {
            return false;
        };
        if message.text == new_text {
            return false;
        }
        message.text = new_text.to_string();
        let role = message.role;
        self.messages.truncate(index + 1);
        self.refresh_lines();
        self.persist();
        tracing::info!(index, %role, "message edited");

        if role == Role::User {
            self.retry_count = 0;
            self.menu.set_follow(true);
            self.start_generation("generating");
        } else {
            self.menu.set_message("message edited");
        }
        true
    }

    fn edit_selected_message(&mut self, io: &mut MenuIo<'_>) {
        let Some(index) = self.selected_message_index() else {
            self.menu.set_message("no message selected");
            return;
        };
        let text = self.messages[index].text.clone();
        let editor = &mut self.editor;
        match io.suspend(|| editor.edit(&text)) {
            Some(Ok(edited)) => {
                self.edit_message(index, &edited);
            }
            Some(Err(error)) => self.menu.set_message(format!("editor failed: {error}")),
            None => {}
        }
    }

    /// Removes messages from `from` on. If the oldest removed message was
    /// written by the user, its text, images and context return to the input.
    pub fn revert_messages(&mut self, from: usize) -> Vec<Message> {
        if self.is_busy() || from >= self.messages.len() {
            return Vec::new();
        }
        let removed = self.messages.split_off(from);
        self.refresh_lines();
        match removed.first().filter(|message| message.role == Role::User) {
            Some(message) => {
                self.menu.set_input(message.text.clone());
                self.pending_images = message.image_urls.clone();
                self.pending_context = message.context.clone();
            }
            None => self.menu.clear_input(),
        }
        self.persist();
        self.menu
            .set_message(format!("reverted {} message(s)", removed.len()));
        removed
    }

    fn revert_selected(&mut self) {
        if let Some(index) = self.selected_message_index() {
            self.revert_messages(index);
        }
    }

    /// Selects the first line of the next (or previous) message.
    pub fn goto_message(&mut self, forward: bool) -> bool {
        let Some(current) = self.menu.selected_index() else {
            return false;
        };
        let Some(msg_index) = self.menu.item(current).map(|line| line.msg_index) else {
            return false;
        };
        let starts = |line: &Line| line.subindex == 0 && line.msg_index != msg_index;
        let items = self.menu.items();
        let target = if forward {
            items
                .iter()
                .enumerate()
                .skip(current + 1)
                .find(|(_, line)| starts(line))
                .map(|(index, _)| index)
        } else {
            items[..current]
                .iter()
                .enumerate()
                .rev()
                .find(|(_, line)| starts(line))
                .map(|(index, _)| index)
        };
        match target {
            Some(index) => self.menu.select_item_index(index),
            None => false,
        }
    }

    fn selected_message_index(&self) -> Option<usize> {
        self.menu
            .selected_item()
            .map(|line| line.msg_index)
            .filter(|index| *index < self.messages.len())
    }

    // --- conversation files ---

    /// Starts over in a fresh history file.
    pub fn new_conversation(&mut self) {
        self.interrupt();
        self.pending_error = None;
        match self.history.new_file_path() {
            Ok(path) => self.chat_file = path,
            Err(error) => {
                self.fail(error.into());
                return;
            }
        }
        self.messages.clear();
        self.menu.clear_items();
        self.menu.clear_input();
        self.menu.set_follow(true);
        self.pending_context.clear();
        self.pending_images.clear();
        self.retry_count = 0;
        self.task_result = None;
        self.menu.set_message("new chat");
        tracing::info!(chat_file = %self.chat_file.display(), "new conversation");
    }

    /// Drops every message. Whatever is in flight is cancelled first so no
    /// late answer lands in the emptied conversation.
    pub fn clear_messages(&mut self) {
        self.interrupt();
        self.pending_error = None;
        self.retry_count = 0;
        self.messages.clear();
        self.menu.clear_items();
        self.menu.set_follow(true);
        self.menu.set_message("cleared");
    }

    /// Continues the conversation stored at `path`.
    pub fn load_conversation(&mut self, path: &Path) -> Result<(), SessionError> {
        let messages = conversation_store::load_conversation(path)?;
        self.interrupt();
        self.pending_error = None;
        self.messages = messages;
        self.chat_file = path.to_path_buf();
        self.refresh_lines();
        self.menu.set_follow(true);
        self.menu.set_message(format!("loaded {}", path.display()));
        tracing::info!(path = %path.display(), messages = self.messages.len(), "conversation loaded");
        Ok(())
    }

    /// Writes the conversation and rotates old history files.
    pub fn save(&mut self) -> Result<PathBuf, SessionError> {
        save_conversation(&self.chat_file, &self.messages)?;
        self.history.delete_old_files()?;
        self.menu
            .set_message(format!("chat saved to {}", self.chat_file.display()));
        Ok(self.chat_file.clone())
    }

    /// Moves the conversation to a named file in the history directory.
    pub fn save_as(&mut self, name: &str) -> Result<PathBuf, SessionError> {
        self.chat_file = self.history.named_file_path(name)?;
        self.save()
    }

    fn save_as_from_input(&mut self) {
        let name = self.menu.input().text().to_string();
        match self.save_as(&name) {
            Ok(_) => self.menu.clear_input(),
            Err(error) => self.report(&error),
        }
    }

    fn persist(&mut self) {
        let saved = save_conversation(&self.chat_file, &self.messages)
            .and_then(|()| self.history.delete_old_files().map(|_| ()));
        if let Err(error) = saved {
            self.fail(error.into());
        }
    }

    fn refresh_lines(&mut self) {
        self.menu.set_items(conversation_lines(&self.messages));
    }

    fn push_message(&mut self, message: Message) {
        for line in message_lines(self.messages.len(), &message) {
            self.menu.append_item(line);
        }
        self.messages.push(message);
    }

    fn report(&mut self, error: &SessionError) {
        tracing::warn!(%error, "command failed");
        self.menu.set_message(format!("error: {error}"));
    }

    /// Records an unrecoverable error and closes the menu.
    fn fail(&mut self, error: SessionError) {
        tracing::error!(%error, "chat session failed");
        self.fatal_error = Some(error);
        self.menu.close();
    }

    // --- nested menus ---

    fn pick_setting(&mut self, io: &mut MenuIo<'_>) {
        let labels = self.settings.toggle_labels();
        let choices: Vec<&str> = labels.iter().map(String::as_str).collect();
        let Some(index) = choose(io, "settings", &choices) else {
            return;
        };
        if !self.settings.toggle(index) {
            return;
        }
        match self.settings.save(&self.settings_path) {
            Ok(()) => self.menu.set_message(self.settings.summary()),
            Err(error) => self.report(&error),
        }
    }

    fn pick_conversation(&mut self, io: &mut MenuIo<'_>) {
        let files = match self.history.saved_files_desc() {
            Ok(files) => files,
            Err(error) => return self.report(&error.into()),
        };
        let entries: Vec<SavedConversation> = files
            .iter()
            .filter_map(|path| ConversationSummary::read(path).ok())
            .filter_map(|summary| {
                let preview = summary.preview().ok()?;
                Some(SavedConversation {
                    path: summary.path,
                    preview,
                })
            })
            .collect();
        if entries.is_empty() {
            self.menu.set_message("no saved conversations");
            return;
        }

        let mut picker = list_menu(
            entries,
            MenuOptions {
                idle_poll: self.options.idle_poll,
                enable_command_palette: false,
                ..MenuOptions::default()
            }
            .with_prompt("load"),
        );
        picker.add_command(
            "delete conversation",
            "ctrl+k",
            |host: &mut ListHost<SavedConversation>, _io: &mut MenuIo<'_>| delete_selected(host),
        );
        if io.nested(&mut picker) != MenuOutcome::Closed {
            return;
        }
        let Some(path) = picker.host().selected().map(|entry| entry.path.clone()) else {
            return;
        };
        if let Err(error) = self.load_conversation(&path) {
            self.report(&error);
        }
    }

    /// Opens the full payload of the selected line. Plain text lines are
    /// copied into the input instead.
    fn show_selected_detail(&mut self, io: &mut MenuIo<'_>) {
        let Some(line) = self.menu.selected_item() else {
            return;
        };
        let Some(detail) = line.detail_text() else {
            let text = line.text.clone();
            self.menu.set_input(text);
            return;
        };
        let rows: Vec<String> = detail.lines().map(str::to_string).collect();
        let mut viewer = list_menu(
            rows,
            MenuOptions {
                idle_poll: self.options.idle_poll,
                enable_command_palette: false,
                wrap_text: true,
                ..MenuOptions::default()
            }
            .with_prompt("detail"),
        );
        io.nested(&mut viewer);
    }
}

/// A history file as listed by the load picker.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedConversation {
    pub path: PathBuf,
    pub preview: String,
}

impl fmt::Display for SavedConversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview)
    }
}

fn delete_selected(host: &mut ListHost<SavedConversation>) {
    let menu = host.menu_mut();
    let Some(index) = menu.selected_index() else {
        return;
    };
    let Some(path) = menu.item(index).map(|entry| entry.path.clone()) else {
        return;
    };
    match fs::remove_file(&path) {
        Ok(()) => {
            menu.remove_item(index);
            menu.set_message(format!("deleted {}", path.display()));
        }
        Err(error) => menu.set_message(format!("delete failed: {error}")),
    }
}

async fn stream_completion(
    ctx: TaskContext<ChatSession>,
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
    id: TaskSeq,
) {
    let mut stream = provider.stream(request);
    loop {
        match ctx.cancellable(stream.next()).await {
            TaskOutcome::Completed(Some(Ok(chunk))) => {
                ctx.post_to_foreground(move |session: &mut ChatSession| {
                    session.apply_chunk(id, chunk);
                });
            }
            TaskOutcome::Completed(Some(Err(error))) => {
                ctx.post_to_foreground(move |session: &mut ChatSession| {
                    session.finish_generation(id, StreamOutcome::Failed(error));
                });
                return;
            }
            TaskOutcome::Completed(None) => {
                ctx.post_to_foreground(move |session: &mut ChatSession| {
                    session.finish_generation(id, StreamOutcome::Completed);
                });
                return;
            }
            TaskOutcome::Cancelled => {
                ctx.post_to_foreground(move |session: &mut ChatSession| {
                    session.finish_generation(id, StreamOutcome::Cancelled);
                });
                return;
            }
        }
    }
}

impl MenuHost for ChatSession {
    type Item = Line;

    fn menu(&self) -> &MenuState<Line> {
        &self.menu
    }

    fn menu_mut(&mut self) -> &mut MenuState<Line> {
        &mut self.menu
    }

    fn on_created(&mut self, _io: &mut MenuIo<'_>) {
        if let Some(text) = self.options.first_message.take() {
            self.send_message(&text, Vec::new());
        }
    }

    fn on_tick(&mut self, io: &mut MenuIo<'_>) {
        if let Some(tool_uses) = self.pending_tool_uses.take() {
            self.start_tool_round(io, tool_uses);
        }
        if let Some(error) = self.pending_error.take() {
            self.prompt_provider_error(io, error);
        }
    }

    fn on_enter(&mut self, _io: &mut MenuIo<'_>) {
        if self.is_busy() {
            return;
        }
        let text = self.menu.input().text().to_string();
        if text.trim().is_empty() {
            return;
        }
        self.send_message(&text, Vec::new());
    }

    fn on_escape(&mut self, _io: &mut MenuIo<'_>) -> bool {
        self.interrupt()
    }

    fn on_close(&mut self) {
        self.interrupt();
    }

    fn item_color(&self, item: &Line) -> Option<Color> {
        Some(item.color())
    }

    fn item_wrap(&self, item: &Line) -> bool {
        item.has_text()
    }

    fn line_number_text(&self, _index: usize, item: &Line) -> String {
        lines::line_number_text(item)
    }

    fn status_text(&self) -> String {
        format!("{}\n{}", self.settings.summary(), self.menu.message())
    }

    fn prompt_text(&self) -> String {
        let mut prompt = self.options.prompt.clone();
        if !self.pending_context.is_empty() {
            prompt.push_str(&format!(" ({} context)", self.pending_context.len()));
        }
        if !self.pending_images.is_empty() {
            prompt.push_str(&format!(" ({} images)", self.pending_images.len()));
        }
        prompt
    }
}

/// Wraps `session` in a menu with the chat hotkeys and its foreground queue
/// attached.
pub fn chat_menu(session: ChatSession) -> Menu<ChatSession> {
    let queue = session.foreground().clone();
    let mut menu = Menu::new(session);
    menu.attach_foreground(queue);

    menu.add_command(
        "new conversation",
        "ctrl+n",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| session.new_conversation(),
    );
    menu.add_command(
        "save conversation",
        "ctrl+s",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| {
            if let Err(error) = session.save() {
                session.report(&error);
            }
        },
    );
    menu.add_command(
        "save conversation as (name from input)",
        "",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| session.save_as_from_input(),
    );
    menu.add_command_when(
        "revert messages",
        "ctrl+z",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| session.revert_selected(),
        |session: &ChatSession| !session.is_busy(),
    );
    menu.add_command_when(
        "edit message",
        "alt+e",
        |session: &mut ChatSession, io: &mut MenuIo<'_>| session.edit_selected_message(io),
        |session: &ChatSession| !session.is_busy(),
    );
    menu.add_command(
        "settings",
        "alt+s",
        |session: &mut ChatSession, io: &mut MenuIo<'_>| session.pick_setting(io),
    );
    menu.add_command(
        "load conversation",
        "ctrl+l",
        |session: &mut ChatSession, io: &mut MenuIo<'_>| session.pick_conversation(io),
    );
    menu.add_command(
        "previous message",
        "alt+u",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| {
            session.goto_message(false);
        },
    );
    menu.add_command(
        "next message",
        "alt+d",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| {
            session.goto_message(true);
        },
    );
    menu.add_command(
        "show details",
        "tab",
        |session: &mut ChatSession, io: &mut MenuIo<'_>| session.show_selected_detail(io),
    );
    menu.add_command(
        "clear messages",
        "",
        |session: &mut ChatSession, _io: &mut MenuIo<'_>| session.clear_messages(),
    );
    menu
}
