//! Single-line query buffer with a character caret.

use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputEditor {
    text: String,
    /// Caret in characters, `0..=char_count`.
    caret: usize,
    ascii_only: bool,
}

impl InputEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let mut editor = Self::default();
        editor.set_text(text);
        editor
    }

    /// Drops every non-ASCII character on insertion.
    pub fn set_ascii_only(&mut self, ascii_only: bool) {
        self.ascii_only = ascii_only;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map_or(self.text.len(), |(offset, _)| offset)
    }

    /// Replaces the text and moves the caret to the end.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if self.ascii_only {
            self.text.retain(|ch| ch.is_ascii());
        }
        self.caret = self.char_count();
    }

    pub fn insert_char(&mut self, ch: char) {
        if self.ascii_only && !ch.is_ascii() {
            return;
        }
        let offset = self.byte_offset(self.caret);
        self.text.insert(offset, ch);
        self.caret += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.insert_char(ch);
        }
    }

    /// Deletes the character before the caret.
    pub fn backspace(&mut self) -> bool {
        if self.caret == 0 {
            return false;
        }
        self.caret -= 1;
        let offset = self.byte_offset(self.caret);
        self.text.remove(offset);
        true
    }

    /// Deletes the character at the caret.
    pub fn delete(&mut self) -> bool {
        if self.caret >= self.char_count() {
            return false;
        }
        let offset = self.byte_offset(self.caret);
        self.text.remove(offset);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.caret == 0 {
            return false;
        }
        self.caret -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.caret >= self.char_count() {
            return false;
        }
        self.caret += 1;
        true
    }

    pub fn move_home(&mut self) {
        self.caret = 0;
    }

    pub fn move_end(&mut self) {
        self.caret = self.char_count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.caret = 0;
    }

    /// Truncates to just after the last space of the right-trimmed text and
    /// moves the caret to the end.
    pub fn delete_word(&mut self) {
        let trimmed = self.text.trim_end_matches(' ');
        let keep = trimmed.rfind(' ').map_or(0, |index| index + 1);
        self.text.truncate(keep);
        self.caret = self.char_count();
    }

    /// Display column of the caret, counting wide characters as two cells.
    pub fn caret_column(&self) -> usize {
        self.text
            .chars()
            .take(self.caret)
            .map(|ch| ch.width().unwrap_or(0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::InputEditor;

    #[test]
    fn insert_respects_caret_position() {
        let mut editor = InputEditor::with_text("ac");
        editor.move_left();
        editor.insert_char('b');
        assert_eq!(editor.text(), "abc");
        assert_eq!(editor.caret(), 2);
    }

    #[test]
    fn backspace_and_delete_stay_in_bounds() {
        let mut editor = InputEditor::with_text("ab");
        assert!(!editor.delete());
        assert!(editor.backspace());
        assert!(editor.backspace());
        assert!(!editor.backspace());
        assert_eq!(editor.text(), "");
        assert_eq!(editor.caret(), 0);
    }

    #[test]
    fn caret_moves_in_characters_not_bytes() {
        let mut editor = InputEditor::with_text("héllo");
        editor.move_home();
        editor.move_right();
        editor.move_right();
        editor.insert_char('X');
        assert_eq!(editor.text(), "héXllo");
        editor.backspace();
        editor.delete();
        assert_eq!(editor.text(), "hélo");
    }

    #[test]
    fn delete_word_trims_back_to_previous_space() {
        let mut editor = InputEditor::with_text("git commit --amend  ");
        editor.move_home();
        editor.delete_word();
        assert_eq!(editor.text(), "git commit ");
        assert_eq!(editor.caret(), 11);
        editor.delete_word();
        assert_eq!(editor.text(), "git ");
        editor.delete_word();
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn clear_and_home() {
        let mut editor = InputEditor::with_text("query");
        editor.move_home();
        assert_eq!(editor.caret(), 0);
        editor.clear();
        assert!(editor.is_empty());
        assert_eq!(editor.caret(), 0);
    }

    #[test]
    fn ascii_only_filters_insertions() {
        let mut editor = InputEditor::new();
        editor.set_ascii_only(true);
        editor.insert_str("aé b");
        assert_eq!(editor.text(), "a b");
    }

    #[test]
    fn caret_column_counts_wide_chars() {
        let editor = InputEditor::with_text("日本a");
        assert_eq!(editor.caret_column(), 5);
    }
}
