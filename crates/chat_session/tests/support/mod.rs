#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_provider::CompletionProvider;
use chat_provider_mock::ScriptedProvider;
use chat_session::{chat_menu, ChatOptions, ChatSession, Line, MessageEditor};
use tape_menu::{BufferScreen, EventSource, Menu, MenuHost, MenuIo, MenuOutcome, TaskHandle};
use tempfile::TempDir;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Editor that records what it was given and returns fixed text.
#[derive(Clone)]
pub struct ScriptedEditor {
    replacement: String,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEditor {
    pub fn new(replacement: &str) -> Self {
        Self {
            replacement: replacement.to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MessageEditor for ScriptedEditor {
    fn edit(&mut self, text: &str) -> io::Result<String> {
        lock_unpoisoned(&self.seen).push(text.to_string());
        Ok(self.replacement.clone())
    }
}

/// A chat menu on an in-memory screen, driven one tick at a time.
pub struct ChatHarness {
    pub dir: TempDir,
    pub events: EventSource,
    pub screen: BufferScreen,
    pub menu: Menu<ChatSession>,
    pub provider: Arc<ScriptedProvider>,
}

impl ChatHarness {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self::build(provider, |_| {}, |session| session)
    }

    pub fn with_options(provider: ScriptedProvider, configure: impl FnOnce(&mut ChatOptions)) -> Self {
        Self::build(provider, configure, |session| session)
    }

    pub fn build(
        provider: ScriptedProvider,
        configure: impl FnOnce(&mut ChatOptions),
        finish: impl FnOnce(ChatSession) -> ChatSession,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = ChatOptions {
            data_dir: dir.path().join("data"),
            model: Some("test-model".to_string()),
            idle_poll: Duration::from_millis(20),
            ..ChatOptions::default()
        };
        configure(&mut options);

        let provider = Arc::new(provider);
        let shared: Arc<dyn CompletionProvider> = provider.clone();
        let session = ChatSession::new(options, shared).expect("session");
        Self {
            dir,
            events: EventSource::new(),
            screen: BufferScreen::new(20, 80),
            menu: chat_menu(finish(session)),
            provider,
        }
    }

    pub fn session(&self) -> &ChatSession {
        self.menu.host()
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        self.menu.host_mut()
    }

    pub fn pump(&mut self) -> Option<MenuOutcome> {
        let mut io = MenuIo::new(&mut self.screen, &self.events);
        self.menu.pump(&mut io)
    }

    /// Queues `keys` and ticks until every sequence was dispatched.
    pub fn press(&mut self, keys: &str) {
        self.events.push_keys(keys);
        while self.events.has_pending_input() {
            self.pump();
        }
    }

    pub fn send(&mut self, text: &str) {
        self.press(&format!("{text}\r"));
    }

    /// Ticks until `condition` holds for the session.
    pub fn pump_until(&mut self, what: &str, condition: impl Fn(&ChatSession) -> bool) {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            self.pump();
            if condition(self.session()) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn pump_until_idle(&mut self) {
        self.pump_until("idle session", |session| !session.is_busy());
    }

    /// Handle of the running generation, to wait on without ticking.
    pub fn generation_handle(&self) -> TaskHandle {
        self.session()
            .generation_handle()
            .cloned()
            .expect("generation in flight")
    }

    pub fn is_finished(&self) -> bool {
        self.session().menu().is_finished()
    }
}

pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn texts_of(lines: &[Line], msg_index: usize) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.msg_index == msg_index)
        .map(Line::display_text)
        .collect()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
