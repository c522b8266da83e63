//! Key decoding for raw terminal input.
//!
//! The terminal delivers one complete sequence per callback (see
//! `platform::stdin_buffer`). `decode_input` turns such a sequence into an
//! [`InputEvent`]. Unknown sequences decode to `None` and are dropped.

use std::fmt;

const MOD_SHIFT: u8 = 1;
const MOD_ALT: u8 = 2;
const MOD_CTRL: u8 = 4;
const MOD_META: u8 = 8;

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
    };
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
        shift: false,
    };
    pub const ALT: Self = Self {
        ctrl: false,
        alt: true,
        shift: false,
    };
    pub const SHIFT: Self = Self {
        ctrl: false,
        alt: false,
        shift: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift
    }

    /// Decodes an xterm modifier parameter (`1 + bitmask`).
    fn from_xterm_param(param: u32) -> Self {
        let bits = param.saturating_sub(1).min(u32::from(u8::MAX)) as u8;
        Self {
            ctrl: bits & MOD_CTRL != 0,
            alt: bits & (MOD_ALT | MOD_META) != 0,
            shift: bits & MOD_SHIFT != 0,
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
            shift: self.shift || other.shift,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A character as typed; uppercase letters keep their case.
    Char(char),
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl Key {
    /// Lowercase key name used in chords.
    pub fn name(&self) -> String {
        match self {
            Key::Char(' ') => "space".to_string(),
            Key::Char(ch) => ch.to_lowercase().collect(),
            Key::Enter => "enter".to_string(),
            Key::Escape => "escape".to_string(),
            Key::Tab => "tab".to_string(),
            Key::Backspace => "backspace".to_string(),
            Key::Delete => "delete".to_string(),
            Key::Insert => "insert".to_string(),
            Key::Up => "up".to_string(),
            Key::Down => "down".to_string(),
            Key::Left => "left".to_string(),
            Key::Right => "right".to_string(),
            Key::Home => "home".to_string(),
            Key::End => "end".to_string(),
            Key::PageUp => "pageup".to_string(),
            Key::PageDown => "pagedown".to_string(),
            Key::F(n) => format!("f{n}"),
        }
    }

    /// Looks a chord key name back up. Accepts a few common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        let key = match lowered.as_str() {
            "space" => Key::Char(' '),
            "enter" | "return" => Key::Enter,
            "escape" | "esc" => Key::Escape,
            "tab" => Key::Tab,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "insert" | "ins" => Key::Insert,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            other => {
                if let Some(n) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=24).contains(&n) {
                        return Some(Key::F(n));
                    }
                }
                let mut chars = other.chars();
                let ch = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                Key::Char(ch)
            }
        };
        Some(key)
    }

    /// Characters are the only keys whose shift state is part of the text.
    pub fn is_char(&self) -> bool {
        matches!(self, Key::Char(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::NONE)
    }

    pub fn ctrl(ch: char) -> Self {
        Self::new(Key::Char(ch), Modifiers::CTRL)
    }

    pub fn alt(ch: char) -> Self {
        Self::new(Key::Char(ch), Modifiers::ALT)
    }

    /// The character to insert into the query, if this key types one.
    pub fn text(&self) -> Option<char> {
        match self.key {
            Key::Char(ch) if !self.modifiers.ctrl && !self.modifiers.alt && !ch.is_control() => {
                Some(ch)
            }
            _ => None,
        }
    }
}

impl fmt::Display for KeyEvent {
    /// Canonical chord form: `ctrl+alt+shift+key`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.alt {
            f.write_str("alt+")?;
        }
        if self.modifiers.shift {
            f.write_str("shift+")?;
        }
        f.write_str(&self.key.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Paste(String),
}

/// Decodes one complete input sequence.
pub fn decode_input(data: &str) -> Option<InputEvent> {
    if let Some(inner) = data
        .strip_prefix(PASTE_START)
        .and_then(|rest| rest.strip_suffix(PASTE_END))
    {
        return Some(InputEvent::Paste(inner.to_string()));
    }
    decode_key(data).map(InputEvent::Key)
}

/// Decodes one complete key sequence.
pub fn decode_key(data: &str) -> Option<KeyEvent> {
    if data.is_empty() {
        return None;
    }
    if data == "\x1b" {
        return Some(KeyEvent::plain(Key::Escape));
    }
    if let Some(rest) = data.strip_prefix("\x1b[") {
        return decode_csi(rest);
    }
    if let Some(rest) = data.strip_prefix("\x1bO") {
        if !rest.is_empty() {
            return decode_ss3(rest);
        }
    }
    if let Some(rest) = data.strip_prefix('\x1b') {
        // ESC prefix marks alt.
        let inner = decode_key(rest)?;
        let modifiers = inner.modifiers.union(Modifiers::ALT);
        return Some(KeyEvent::new(inner.key, modifiers));
    }

    let mut chars = data.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(decode_single_char(ch))
}

fn decode_single_char(ch: char) -> KeyEvent {
    match ch {
        '\r' | '\n' => KeyEvent::plain(Key::Enter),
        '\t' => KeyEvent::plain(Key::Tab),
        '\x7f' | '\x08' => KeyEvent::plain(Key::Backspace),
        '\x00' => KeyEvent::ctrl(' '),
        '\x01'..='\x1a' => KeyEvent::ctrl(char::from(ch as u8 + b'a' - 1)),
        '\x1c' => KeyEvent::ctrl('\\'),
        '\x1d' => KeyEvent::ctrl(']'),
        '\x1e' => KeyEvent::ctrl('^'),
        '\x1f' => KeyEvent::ctrl('_'),
        ch if ch.is_uppercase() => KeyEvent::new(Key::Char(ch), Modifiers::SHIFT),
        ch => KeyEvent::plain(Key::Char(ch)),
    }
}

fn decode_ss3(rest: &str) -> Option<KeyEvent> {
    let key = match rest {
        "A" => Key::Up,
        "B" => Key::Down,
        "C" => Key::Right,
        "D" => Key::Left,
        "H" => Key::Home,
        "F" => Key::End,
        "M" => Key::Enter,
        "P" => Key::F(1),
        "Q" => Key::F(2),
        "R" => Key::F(3),
        "S" => Key::F(4),
        "a" => return Some(KeyEvent::new(Key::Up, Modifiers::CTRL)),
        "b" => return Some(KeyEvent::new(Key::Down, Modifiers::CTRL)),
        "c" => return Some(KeyEvent::new(Key::Right, Modifiers::CTRL)),
        "d" => return Some(KeyEvent::new(Key::Left, Modifiers::CTRL)),
        _ => return None,
    };
    Some(KeyEvent::plain(key))
}

fn decode_csi(rest: &str) -> Option<KeyEvent> {
    // rxvt-style shifted arrows.
    match rest {
        "a" => return Some(KeyEvent::new(Key::Up, Modifiers::SHIFT)),
        "b" => return Some(KeyEvent::new(Key::Down, Modifiers::SHIFT)),
        "c" => return Some(KeyEvent::new(Key::Right, Modifiers::SHIFT)),
        "d" => return Some(KeyEvent::new(Key::Left, Modifiers::SHIFT)),
        "Z" => return Some(KeyEvent::new(Key::Tab, Modifiers::SHIFT)),
        _ => {}
    }

    let final_char = rest.chars().last()?;
    let params = &rest[..rest.len() - final_char.len_utf8()];
    let mut fields = params.split(';');
    let first = fields.next().unwrap_or_default();
    let modifiers = fields
        .next()
        .and_then(|field| field.split(':').next())
        .and_then(|field| field.parse::<u32>().ok())
        .map(Modifiers::from_xterm_param)
        .unwrap_or_default();

    let key = match final_char {
        'A' => Key::Up,
        'B' => Key::Down,
        'C' => Key::Right,
        'D' => Key::Left,
        'H' => Key::Home,
        'F' => Key::End,
        'P' => Key::F(1),
        'Q' => Key::F(2),
        'R' => Key::F(3),
        'S' => Key::F(4),
        '~' => tilde_key(first.parse().ok()?)?,
        'u' => {
            let codepoint: u32 = first.split(':').next()?.parse().ok()?;
            return decode_codepoint(codepoint, modifiers);
        }
        '$' => return tilde_key(first.parse().ok()?).map(|k| KeyEvent::new(k, Modifiers::SHIFT)),
        '^' => return tilde_key(first.parse().ok()?).map(|k| KeyEvent::new(k, Modifiers::CTRL)),
        _ => return None,
    };
    Some(KeyEvent::new(key, modifiers))
}

fn tilde_key(code: u32) -> Option<Key> {
    let key = match code {
        1 | 7 => Key::Home,
        2 => Key::Insert,
        3 => Key::Delete,
        4 | 8 => Key::End,
        5 => Key::PageUp,
        6 => Key::PageDown,
        11..=15 => Key::F((code - 10) as u8),
        17..=21 => Key::F((code - 11) as u8),
        23 | 24 => Key::F((code - 12) as u8),
        _ => return None,
    };
    Some(key)
}

/// Kitty/fixterms `CSI codepoint ; mods u`.
fn decode_codepoint(codepoint: u32, modifiers: Modifiers) -> Option<KeyEvent> {
    let key = match codepoint {
        9 => Key::Tab,
        13 => Key::Enter,
        27 => Key::Escape,
        127 => Key::Backspace,
        cp => Key::Char(char::from_u32(cp)?),
    };
    Some(KeyEvent::new(key, modifiers))
}

#[cfg(test)]
mod tests {
    use super::{decode_input, decode_key, InputEvent, Key, KeyEvent, Modifiers};

    fn chord(data: &str) -> String {
        decode_key(data)
            .map(|event| event.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }

    #[test]
    fn decodes_plain_and_control_keys() {
        assert_eq!(chord("a"), "a");
        assert_eq!(chord("\r"), "enter");
        assert_eq!(chord("\t"), "tab");
        assert_eq!(chord("\x7f"), "backspace");
        assert_eq!(chord("\x1b"), "escape");
        assert_eq!(chord("\x15"), "ctrl+u");
        assert_eq!(chord("\x17"), "ctrl+w");
        assert_eq!(chord("\x01"), "ctrl+a");
        assert_eq!(chord("\x00"), "ctrl+space");
        assert_eq!(chord(" "), "space");
    }

    #[test]
    fn uppercase_letter_is_shifted_but_keeps_its_text() {
        let event = decode_key("X").expect("key");
        assert_eq!(event.to_string(), "shift+x");
        assert_eq!(event.text(), Some('X'));
    }

    #[test]
    fn escape_prefix_adds_alt() {
        assert_eq!(chord("\x1bu"), "alt+u");
        assert_eq!(chord("\x1bD"), "alt+shift+d");
        assert_eq!(chord("\x1b\x7f"), "alt+backspace");
        assert_eq!(chord("\x1b\x1b[A"), "alt+up");
    }

    #[test]
    fn decodes_navigation_sequences() {
        assert_eq!(chord("\x1b[A"), "up");
        assert_eq!(chord("\x1bOB"), "down");
        assert_eq!(chord("\x1b[5~"), "pageup");
        assert_eq!(chord("\x1b[6~"), "pagedown");
        assert_eq!(chord("\x1b[1~"), "home");
        assert_eq!(chord("\x1b[F"), "end");
        assert_eq!(chord("\x1b[3~"), "delete");
        assert_eq!(chord("\x1b[15~"), "f5");
        assert_eq!(chord("\x1b[Z"), "shift+tab");
    }

    #[test]
    fn decodes_xterm_modifier_parameters() {
        assert_eq!(chord("\x1b[1;2A"), "shift+up");
        assert_eq!(chord("\x1b[1;3B"), "alt+down");
        assert_eq!(chord("\x1b[1;5C"), "ctrl+right");
        assert_eq!(chord("\x1b[1;8D"), "ctrl+alt+shift+left");
        assert_eq!(chord("\x1b[5;5~"), "ctrl+pageup");
        assert_eq!(chord("\x1b[120;5u"), "ctrl+x");
    }

    #[test]
    fn unknown_sequences_decode_to_none() {
        assert_eq!(decode_key("\x1b[99q"), None);
        assert_eq!(decode_key("ab"), None);
        assert_eq!(decode_key(""), None);
    }

    #[test]
    fn bracketed_paste_decodes_to_paste_event() {
        assert_eq!(
            decode_input("\x1b[200~hello\nworld\x1b[201~"),
            Some(InputEvent::Paste("hello\nworld".to_string()))
        );
        assert_eq!(
            decode_input("q"),
            Some(InputEvent::Key(KeyEvent::new(Key::Char('q'), Modifiers::NONE)))
        );
    }

    #[test]
    fn control_chars_never_produce_text() {
        assert_eq!(decode_key("\x15").and_then(|event| event.text()), None);
        assert_eq!(decode_key("\x1bx").and_then(|event| event.text()), None);
    }
}
