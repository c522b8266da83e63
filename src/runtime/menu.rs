//! The menu event loop.
//!
//! A [`Menu`] owns its host and the host's hotkey table. Every tick drains
//! the foreground queue, re-matches, renders when something changed, then
//! waits for one event and dispatches it. Nested menus (palette, prompts)
//! run on the same screen and event source through [`MenuIo::nested`].

use std::time::Duration;

use crate::core::input::{decode_input, InputEvent, Key, KeyEvent, Modifiers};
use crate::core::keybindings::{is_reserved_editor_key, Chord, HotkeyTable};
use crate::core::screen::{Color, Screen};
use crate::core::terminal::{Terminal, TerminalGuard, TerminalHandlers};
use crate::error::MenuError;
use crate::render::menu_view;
use crate::render::terminal_screen::TerminalScreen;
use crate::runtime::foreground::ForegroundQueue;
use crate::runtime::state::MenuState;
use crate::runtime::wake::{EventSource, LoopEvent};

pub use crate::runtime::state::MenuOutcome;

/// Columns moved by one horizontal scroll step.
pub const SCROLL_STEP: isize = 10;

/// Screen and event source shared by a menu and the menus it nests.
pub struct MenuIo<'a> {
    screen: &'a mut dyn Screen,
    events: &'a EventSource,
    redraw: bool,
}

impl<'a> MenuIo<'a> {
    pub fn new(screen: &'a mut dyn Screen, events: &'a EventSource) -> Self {
        Self {
            screen,
            events,
            redraw: false,
        }
    }

    pub fn screen(&mut self) -> &mut dyn Screen {
        &mut *self.screen
    }

    pub fn events(&self) -> &EventSource {
        self.events
    }

    /// Runs `menu` to completion on this screen, then forces a full redraw
    /// of the calling menu.
    pub fn nested<H: MenuHost>(&mut self, menu: &mut Menu<H>) -> MenuOutcome {
        let outcome = menu.exec(self);
        self.screen.invalidate();
        self.redraw = true;
        outcome
    }

    /// Runs `run` with the terminal released, e.g. to launch an editor.
    /// `None` only if the screen never invoked it.
    pub fn suspend<R>(&mut self, run: impl FnOnce() -> R) -> Option<R> {
        let handlers = TerminalHandlers {
            on_input: self.events.input_handler(),
            on_resize: self.events.resize_handler(),
        };
        let mut run = Some(run);
        let mut result = None;
        self.screen.suspend(handlers, &mut || {
            if let Some(run) = run.take() {
                result = Some(run());
            }
        });
        self.redraw = true;
        result
    }

    fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }
}

/// Owner of a [`MenuState`] plus the hooks the loop calls.
pub trait MenuHost: 'static {
    type Item;

    fn menu(&self) -> &MenuState<Self::Item>;
    fn menu_mut(&mut self) -> &mut MenuState<Self::Item>;

    /// Once, before the first render.
    fn on_created(&mut self, _io: &mut MenuIo<'_>) {}

    /// Every tick, after posted callbacks were applied.
    fn on_tick(&mut self, _io: &mut MenuIo<'_>) {}

    fn on_enter(&mut self, _io: &mut MenuIo<'_>) {
        let menu = self.menu_mut();
        if menu.selected_index().is_some() && menu.options().close_on_selection {
            menu.close();
        }
    }

    /// Returns `true` when Escape was handled.
    fn on_escape(&mut self, _io: &mut MenuIo<'_>) -> bool {
        false
    }

    /// Called when the poll times out without an event.
    fn on_idle(&mut self, _io: &mut MenuIo<'_>) {}

    fn on_selection_changed(&mut self) {}

    fn on_close(&mut self) {}

    fn item_color(&self, _item: &Self::Item) -> Option<Color> {
        None
    }

    fn item_wrap(&self, _item: &Self::Item) -> bool {
        self.menu().options().wrap_text
    }

    /// Gutter text shown when line numbers are on.
    fn line_number_text(&self, index: usize, _item: &Self::Item) -> String {
        (index + 1).to_string()
    }

    fn status_text(&self) -> String {
        self.menu().message().to_string()
    }

    fn prompt_text(&self) -> String {
        self.menu().options().prompt.clone()
    }
}

pub type Command<H> = Box<dyn FnMut(&mut H, &mut MenuIo<'_>)>;

pub struct Menu<H: MenuHost> {
    host: H,
    hotkeys: HotkeyTable<H, Command<H>>,
    foreground: Option<ForegroundQueue<H>>,
    created: bool,
}

impl<H: MenuHost> Menu<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            hotkeys: HotkeyTable::new(),
            foreground: None,
            created: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Registers a command. An empty or unparsable chord leaves it palette-only.
    pub fn add_command<F>(&mut self, label: impl Into<String>, chord: &str, command: F) -> usize
    where
        F: FnMut(&mut H, &mut MenuIo<'_>) + 'static,
    {
        let chord = parse_chord(chord);
        self.hotkeys.register(label, chord, Box::new(command))
    }

    /// Registers a command that only dispatches while `enabled(host)` holds.
    pub fn add_command_when<F, E>(
        &mut self,
        label: impl Into<String>,
        chord: &str,
        command: F,
        enabled: E,
    ) -> usize
    where
        F: FnMut(&mut H, &mut MenuIo<'_>) + 'static,
        E: Fn(&H) -> bool + 'static,
    {
        let chord = parse_chord(chord);
        self.hotkeys.register_when(label, chord, Box::new(command), enabled)
    }

    pub fn hotkeys(&self) -> &HotkeyTable<H, Command<H>> {
        &self.hotkeys
    }

    /// Callbacks posted to `queue` are applied to the host before each render.
    pub fn attach_foreground(&mut self, queue: ForegroundQueue<H>) {
        self.foreground = Some(queue);
    }

    /// Takes over `terminal`, runs until the menu closes and always releases
    /// the terminal again.
    pub fn run<T: Terminal>(&mut self, mut terminal: T) -> Result<MenuOutcome, MenuError> {
        let events = EventSource::new();
        terminal
            .start(events.input_handler(), events.resize_handler())
            .map_err(MenuError::terminal_start)?;
        let mut guard = TerminalGuard::new(terminal);
        let outcome = {
            let mut screen = TerminalScreen::new(guard.terminal_mut());
            let mut io = MenuIo::new(&mut screen, &events);
            self.exec(&mut io)
        };
        guard.release().map_err(MenuError::terminal_stop)?;
        Ok(outcome)
    }

    /// Runs the loop on an existing screen until the menu closes.
    pub fn exec(&mut self, io: &mut MenuIo<'_>) -> MenuOutcome {
        if self.host.menu().is_finished() {
            self.host.menu_mut().reopen();
        }
        self.host.menu_mut().set_running();
        self.host.menu_mut().mark_dirty();
        if let Some(queue) = &self.foreground {
            queue.set_waker(io.events().waker());
        }
        io.screen().invalidate();

        let idle = self.host.menu().options().idle_poll;
        let outcome = loop {
            if let Some(outcome) = self.tick(io, idle) {
                break outcome;
            }
        };
        tracing::debug!(?outcome, "menu finished");
        self.host.on_close();
        outcome
    }

    /// One non-blocking tick. Returns the outcome once the menu finished.
    pub fn pump(&mut self, io: &mut MenuIo<'_>) -> Option<MenuOutcome> {
        self.host.menu_mut().set_running();
        self.tick(io, Duration::ZERO)
    }

    fn tick(&mut self, io: &mut MenuIo<'_>, timeout: Duration) -> Option<MenuOutcome> {
        if !self.created {
            self.created = true;
            self.host.on_created(io);
        }
        if let Some(queue) = &self.foreground {
            let applied = queue.drain_into(&mut self.host);
            if applied > 0 {
                tracing::trace!(applied, "foreground callbacks applied");
                self.host.menu_mut().mark_dirty();
            }
        }
        self.host.on_tick(io);
        self.host.menu_mut().refresh_matches();
        if io.take_redraw() {
            self.host.menu_mut().mark_dirty();
        }
        if let Some(outcome) = self.host.menu().outcome() {
            return Some(outcome);
        }

        if self.host.menu_mut().take_dirty() {
            menu_view::render(&mut self.host, io.screen());
        }

        let before = self.host.menu().selected_index();
        match io.events().poll(timeout) {
            LoopEvent::Input(data) => self.dispatch_input(&data, io),
            LoopEvent::Resize => {
                io.screen().sync_size();
                self.host.menu_mut().mark_dirty();
            }
            LoopEvent::Notified => {}
            LoopEvent::Timeout => self.host.on_idle(io),
        }
        if io.take_redraw() {
            self.host.menu_mut().mark_dirty();
        }
        self.host.menu_mut().refresh_matches();
        if self.host.menu().selected_index() != before {
            self.host.on_selection_changed();
        }
        self.host.menu().outcome()
    }

    fn dispatch_input(&mut self, data: &str, io: &mut MenuIo<'_>) {
        match decode_input(data) {
            Some(InputEvent::Paste(text)) => {
                if self.host.menu().options().allow_input {
                    self.host.menu_mut().input_mut().insert_str(&text);
                }
            }
            Some(InputEvent::Key(event)) => {
                if self.host.menu().options().debug_keys {
                    self.host
                        .menu_mut()
                        .set_message(format!("key {event} {data:?}"));
                }
                self.handle_key(event, io);
            }
            None => tracing::trace!(?data, "unrecognized input sequence"),
        }
    }

    fn run_command(&mut self, index: usize, io: &mut MenuIo<'_>) {
        if !self.hotkeys.is_enabled(&self.host, index) {
            return;
        }
        tracing::debug!(label = self.hotkeys.label(index).unwrap_or_default(), "command");
        if let Some(command) = self.hotkeys.command_mut(index) {
            command(&mut self.host, io);
        }
    }

    fn handle_key(&mut self, event: KeyEvent, io: &mut MenuIo<'_>) {
        let allow_input = self.host.menu().options().allow_input;

        if event.text() == Some(' ') && self.host.menu().input().text() == " " {
            if let Some(index) = self.hotkeys.lookup_chord(&self.host, &Chord::double_space()) {
                self.host.menu_mut().input_mut().clear();
                self.run_command(index, io);
                return;
            }
        }

        // Bound chords win over typing, printable ones included.
        if !is_reserved_editor_key(&event) {
            if let Some(index) = self.hotkeys.lookup(&self.host, &event) {
                self.run_command(index, io);
                return;
            }
        }

        if let Some(ch) = event.text() {
            if allow_input {
                self.host.menu_mut().input_mut().insert_char(ch);
            }
            return;
        }

        let Modifiers { ctrl, alt, shift } = event.modifiers;
        let menu = self.host.menu_mut();
        match event.key {
            Key::Char('a') if ctrl => menu.input_mut().move_home(),
            Key::Char('u') if ctrl => menu.input_mut().clear(),
            Key::Char('w') if ctrl => menu.input_mut().delete_word(),
            Key::Char('e') if ctrl => menu.input_mut().move_end(),
            Key::Char('x') if ctrl => menu.toggle_multi_select(),
            Key::Char('c') if ctrl => {
                if !menu.cancel() {
                    menu.close();
                }
            }
            Key::Char('p') if ctrl => {
                if menu.options().enable_command_palette {
                    self.run_palette(io);
                }
            }
            Key::Char('u') if alt => {
                if menu.options().search_mode {
                    menu.recall_search();
                }
            }
            Key::Backspace => {
                menu.input_mut().backspace();
            }
            Key::Delete => {
                menu.input_mut().delete();
            }
            Key::Up => menu.move_selection(-1, shift),
            Key::Down => menu.move_selection(1, shift),
            Key::PageUp => menu.page_up(),
            Key::PageDown => menu.page_down(),
            Key::Home => menu.select_first(),
            Key::End => menu.select_end(),
            Key::Left => {
                if menu.input().is_empty() {
                    menu.scroll_by(-SCROLL_STEP);
                } else {
                    menu.input_mut().move_left();
                }
            }
            Key::Right => {
                if menu.input().is_empty() {
                    menu.scroll_by(SCROLL_STEP);
                } else {
                    menu.input_mut().move_right();
                }
            }
            Key::Tab => {
                if let Some(text) = menu.selected_item().map(|item| menu.display_text(item)) {
                    menu.set_input(text);
                }
            }
            Key::Enter => {
                if menu.options().search_on_enter && menu.has_pending_search() {
                    menu.search();
                } else {
                    self.host.on_enter(io);
                }
            }
            Key::Escape => {
                if !self.host.on_escape(io) {
                    let menu = self.host.menu_mut();
                    if !menu.cancel() {
                        menu.clear_input();
                    }
                }
            }
            _ => tracing::trace!(%event, "unhandled key"),
        }
    }

    /// Lists the enabled commands in a nested menu and runs the chosen one.
    fn run_palette(&mut self, io: &mut MenuIo<'_>) {
        let entries = self.hotkeys.entries(&self.host);
        if entries.is_empty() {
            self.host.menu_mut().set_message("no commands");
            return;
        }
        let mut palette = crate::widgets::list_menu::list_menu(
            entries,
            crate::runtime::state::MenuOptions {
                idle_poll: self.host.menu().options().idle_poll,
                enable_command_palette: false,
                ..Default::default()
            }
            .with_prompt("command"),
        );
        if io.nested(&mut palette) != MenuOutcome::Closed {
            return;
        }
        let chosen = palette.host().menu().selected_item().map(|entry| entry.index);
        if let Some(index) = chosen {
            self.run_command(index, io);
        }
    }
}

fn parse_chord(text: &str) -> Option<Chord> {
    if text.trim().is_empty() {
        return None;
    }
    let chord = Chord::parse(text);
    if chord.is_none() {
        tracing::warn!(chord = text, "unparsable hotkey; command is palette-only");
    }
    chord
}
