//! Menu state: items, matches, selection, query and lifecycle.
//!
//! Everything here is owned by the UI thread. Hosts reach it through
//! [`crate::runtime::menu::MenuHost::menu_mut`].

use std::time::Duration;

use regex::{Regex, RegexBuilder};

use crate::config::MenuConfig;
use crate::core::editor::InputEditor;
use crate::core::matcher::{MatchMode, Matcher};
use crate::core::screen::Color;
use crate::core::viewport::Viewport;

/// Colors every item whose display text matches `pattern`.
#[derive(Debug, Clone)]
pub struct HighlightRule {
    pub pattern: Regex,
    pub color: Color,
}

impl HighlightRule {
    pub fn new(pattern: &str, color: Color) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { pattern, color })
    }
}

#[derive(Debug, Clone)]
pub struct MenuOptions {
    pub prompt: String,
    pub cancellable: bool,
    pub close_on_selection: bool,
    pub allow_input: bool,
    /// When false the query never filters; it is just text for the host.
    pub search_mode: bool,
    /// Only re-match when Enter is pressed with a changed query.
    pub search_on_enter: bool,
    pub match_mode: MatchMode,
    pub wrap_text: bool,
    pub line_number: bool,
    pub follow: bool,
    /// Item to select when the menu opens.
    pub selected_index: Option<usize>,
    pub highlight: Vec<HighlightRule>,
    pub idle_poll: Duration,
    pub enable_command_palette: bool,
    pub debug_keys: bool,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            cancellable: true,
            close_on_selection: true,
            allow_input: true,
            search_mode: true,
            search_on_enter: false,
            match_mode: MatchMode::Tokens,
            wrap_text: false,
            line_number: false,
            follow: false,
            selected_index: None,
            highlight: Vec::new(),
            idle_poll: Duration::from_millis(1000),
            enable_command_palette: true,
            debug_keys: false,
        }
    }
}

impl MenuOptions {
    pub fn from_config(config: &MenuConfig) -> Self {
        Self {
            idle_poll: config.idle_poll(),
            debug_keys: config.debug_keys,
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuPhase {
    Open,
    Running,
    Closed,
    Cancelled,
}

type DisplayFn<T> = Box<dyn Fn(&T) -> String>;

pub struct MenuState<T> {
    items: Vec<T>,
    display: DisplayFn<T>,
    options: MenuOptions,
    input: InputEditor,
    matcher: Matcher,
    matched: Vec<usize>,
    /// Item count and query the match list was computed for.
    matched_item_count: usize,
    matched_query: String,
    selection_begin: isize,
    selection_end: isize,
    multi_select: bool,
    follow: bool,
    scroll_x: usize,
    message: String,
    search_history: Vec<String>,
    recalled_query: bool,
    viewport: Viewport,
    phase: MenuPhase,
    dirty: bool,
}

impl<T> MenuState<T> {
    pub fn new<F>(items: Vec<T>, display: F, options: MenuOptions) -> Self
    where
        F: Fn(&T) -> String + 'static,
    {
        let mut state = Self {
            items,
            display: Box::new(display),
            matcher: Matcher::new("", options.match_mode),
            follow: options.follow,
            options,
            input: InputEditor::new(),
            matched: Vec::new(),
            matched_item_count: 0,
            matched_query: String::new(),
            selection_begin: -1,
            selection_end: -1,
            multi_select: false,
            scroll_x: 0,
            message: String::new(),
            search_history: Vec::new(),
            recalled_query: false,
            viewport: Viewport::new(1),
            phase: MenuPhase::Open,
            dirty: true,
        };
        state.recompute(false);
        if let Some(index) = state.options.selected_index {
            state.select_item_index(index);
        } else if state.follow {
            state.select_last();
        }
        state
    }

    pub fn options(&self) -> &MenuOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut MenuOptions {
        self.dirty = true;
        &mut self.options
    }

    // --- items ---

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Mutates an item in place. The match list is kept as is.
    pub fn item_mut(&mut self, index: usize) -> Option<&mut T> {
        self.dirty = true;
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn display_text(&self, item: &T) -> String {
        (self.display)(item)
    }

    /// Appends one item, matching just that item against the current query.
    pub fn append_item(&mut self, item: T) {
        let index = self.items.len();
        let in_sync = self.matched_item_count == index;
        let visible = !self.options.search_mode || self.matcher.matches(&(self.display)(&item), index);
        self.items.push(item);
        if in_sync {
            if visible {
                self.matched.push(index);
            }
            self.matched_item_count = self.items.len();
        }
        if self.follow {
            self.select_last();
        } else if self.selection_end < 0 && !self.matched.is_empty() {
            self.set_rows(0, 0);
        }
        self.dirty = true;
    }

    /// Replaces every item. The selection is clamped, or follows the tail.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.recompute(false);
    }

    /// Removes one item. The selection stays on its row, clamped to the
    /// shorter list.
    pub fn remove_item(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.recompute(false);
        Some(item)
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
        self.recompute(false);
    }

    // --- matching ---

    pub fn matched(&self) -> &[usize] {
        &self.matched
    }

    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    /// Re-matches when the query or the item count changed since the last run.
    /// Returns whether anything was recomputed.
    pub fn refresh_matches(&mut self) -> bool {
        let query_changed = self.options.search_mode
            && !self.options.search_on_enter
            && self.input.text() != self.matched_query;
        if query_changed {
            self.recompute(true);
            return true;
        }
        if self.items.len() != self.matched_item_count {
            self.recompute(false);
            return true;
        }
        false
    }

    pub fn has_pending_search(&self) -> bool {
        self.options.search_mode && self.input.text() != self.matched_query
    }

    /// Forces a re-match against the current query.
    pub fn search(&mut self) {
        self.recompute(true);
    }

    /// Full rescan. `reset` moves the selection back to the first row and
    /// switches follow off; otherwise the current row is clamped.
    fn recompute(&mut self, reset: bool) {
        let query = self.input.text().to_string();
        if query != self.matched_query {
            if !self.recalled_query
                && !self.matched_query.is_empty()
                && self.search_history.last() != Some(&self.matched_query)
            {
                self.search_history.push(self.matched_query.clone());
            }
            self.recalled_query = false;
            self.matcher = Matcher::new(&query, self.options.match_mode);
            self.matched_query = query;
        }

        self.matched = if self.options.search_mode {
            self.matcher.matched_indices(&self.items, |item| (self.display)(item))
        } else {
            (0..self.items.len()).collect()
        };
        self.matched_item_count = self.items.len();

        if reset {
            self.follow = false;
            self.multi_select = false;
            self.scroll_x = 0;
            self.set_rows(0, 0);
        } else if self.follow {
            self.select_last();
        } else {
            let (begin, end) = (self.selection_begin, self.selection_end);
            self.set_rows(begin.max(0), end.max(0));
        }
        self.dirty = true;
    }

    pub fn search_history(&self) -> &[String] {
        &self.search_history
    }

    /// Puts the most recent history entry back into the query.
    pub fn recall_search(&mut self) -> bool {
        let Some(query) = self.search_history.pop() else {
            return false;
        };
        self.input.set_text(query);
        self.recalled_query = true;
        self.dirty = true;
        true
    }

    // --- selection ---

    fn last_row(&self) -> isize {
        self.matched.len() as isize - 1
    }

    fn set_rows(&mut self, begin: isize, end: isize) {
        let count = self.matched.len();
        self.selection_begin = Viewport::clamp(begin, count);
        self.selection_end = Viewport::clamp(end, count);
        if !self.multi_select {
            self.selection_begin = self.selection_end;
        }
        self.dirty = true;
    }

    fn select_last(&mut self) {
        let last = self.last_row();
        let begin = if self.multi_select {
            self.selection_begin
        } else {
            last
        };
        self.set_rows(begin, last);
    }

    /// Selected row in the match list, `-1` when nothing matched.
    pub fn selected_row(&self) -> isize {
        self.selection_end
    }

    /// Ordered `(first, last)` rows of the selection.
    pub fn selection_rows(&self) -> (isize, isize) {
        let (a, b) = (self.selection_begin, self.selection_end);
        (a.min(b), a.max(b))
    }

    pub fn is_row_selected(&self, row: usize) -> bool {
        let (first, last) = self.selection_rows();
        first >= 0 && (first..=last).contains(&(row as isize))
    }

    /// Absolute item index of the selected row.
    pub fn selected_index(&self) -> Option<usize> {
        usize::try_from(self.selection_end)
            .ok()
            .and_then(|row| self.matched.get(row).copied())
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.selected_index().and_then(|index| self.items.get(index))
    }

    /// Absolute item indices of the whole selection range, in row order.
    pub fn selected_indices(&self) -> Vec<usize> {
        let (first, last) = self.selection_rows();
        if first < 0 {
            return Vec::new();
        }
        self.matched[first as usize..=last as usize].to_vec()
    }

    /// Selects rows `begin..=end`; `end == -1` means the last row.
    /// Landing on the last row turns follow on.
    pub fn set_selection(&mut self, begin: isize, end: isize) {
        let end = if end < 0 { self.last_row() } else { end };
        if begin != end {
            self.multi_select = true;
        }
        self.set_rows(begin, end);
        self.follow = self.selection_end >= 0 && self.selection_end == self.last_row();
    }

    pub fn select_row(&mut self, row: isize) {
        self.set_selection(row, row);
    }

    /// Moves the selection by `delta` rows. `extend` grows a multi-selection.
    pub fn move_selection(&mut self, delta: isize, extend: bool) {
        if extend {
            self.multi_select = true;
        }
        let end = Viewport::step(self.selection_end, delta, self.matched.len());
        self.navigate_to(end);
    }

    fn navigate_to(&mut self, end: isize) {
        let begin = if self.multi_select {
            self.selection_begin
        } else {
            end
        };
        self.set_rows(begin, end);
        self.follow = self.follow && self.selection_end == self.last_row();
    }

    pub fn page_up(&mut self) {
        let end = self.viewport.page_up(self.selection_end, self.matched.len());
        self.navigate_to(end);
    }

    pub fn page_down(&mut self) {
        let end = self.viewport.page_down(self.selection_end, self.matched.len());
        self.navigate_to(end);
    }

    pub fn select_first(&mut self) {
        self.navigate_to(0);
    }

    pub fn select_end(&mut self) {
        let last = self.last_row();
        self.navigate_to(last);
    }

    pub fn multi_select(&self) -> bool {
        self.multi_select
    }

    /// Leaving multi-select collapses the range onto its end row.
    pub fn toggle_multi_select(&mut self) {
        self.multi_select = !self.multi_select;
        if !self.multi_select {
            self.selection_begin = self.selection_end;
        }
        self.dirty = true;
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
        if follow {
            self.select_last();
        }
        self.dirty = true;
    }

    /// Selects the row showing item `index`. Returns false when it is filtered out.
    pub fn select_item_index(&mut self, index: usize) -> bool {
        match self.matched.iter().position(|&matched| matched == index) {
            Some(row) => {
                self.select_row(row as isize);
                true
            }
            None => false,
        }
    }

    /// Selects the first row whose item equals `item`, clearing the query if
    /// the item is filtered out.
    pub fn set_selected_item(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let Some(index) = self.items.iter().position(|candidate| candidate == item) else {
            return false;
        };
        if self.select_item_index(index) {
            return true;
        }
        self.input.clear();
        self.recompute(true);
        self.select_item_index(index)
    }

    // --- query ---

    pub fn input(&self) -> &InputEditor {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputEditor {
        self.dirty = true;
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input.set_text(text);
        self.dirty = true;
    }

    /// Clears the query and keeps the same item selected.
    pub fn clear_input(&mut self) {
        let selected = self.selected_index();
        self.input.clear();
        if self.options.search_mode {
            self.recompute(true);
            if let Some(index) = selected {
                self.select_item_index(index);
            }
        }
        self.dirty = true;
    }

    // --- view ---

    pub fn scroll_x(&self) -> usize {
        self.scroll_x
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll_x = self.scroll_x.saturating_add_signed(delta);
        self.dirty = true;
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_items_per_page(&mut self, items_per_page: usize) {
        self.viewport.resize(items_per_page);
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.dirty = true;
    }

    /// Right side of the status bar: `MultiSel`, `Follow`, `pos/total`.
    /// Empty while nothing matches.
    pub fn status_indicators(&self) -> String {
        if self.matched.is_empty() {
            return String::new();
        }
        let mut parts = Vec::new();
        if self.multi_select {
            parts.push("MultiSel".to_string());
        }
        if self.follow {
            parts.push("Follow".to_string());
        }
        parts.push(format!("{}/{}", self.selection_end + 1, self.matched.len()));
        parts.join(" ")
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // --- lifecycle ---

    pub fn phase(&self) -> MenuPhase {
        self.phase
    }

    pub(crate) fn set_running(&mut self) {
        if self.phase == MenuPhase::Open {
            self.phase = MenuPhase::Running;
        }
    }

    pub(crate) fn reopen(&mut self) {
        self.phase = MenuPhase::Open;
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, MenuPhase::Closed | MenuPhase::Cancelled)
    }

    pub fn outcome(&self) -> Option<MenuOutcome> {
        match self.phase {
            MenuPhase::Closed => Some(MenuOutcome::Closed),
            MenuPhase::Cancelled => Some(MenuOutcome::Cancelled),
            MenuPhase::Open | MenuPhase::Running => None,
        }
    }

    pub fn close(&mut self) {
        if !self.is_finished() {
            self.phase = MenuPhase::Closed;
        }
    }

    /// Cancels a cancellable menu. Non-cancellable menus ignore it.
    pub fn cancel(&mut self) -> bool {
        if !self.options.cancellable {
            tracing::debug!("cancel ignored on a non-cancellable menu");
            return false;
        }
        if !self.is_finished() {
            self.phase = MenuPhase::Cancelled;
        }
        true
    }
}
