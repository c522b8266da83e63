//! Hotkey chords and the per-menu dispatch table.

use std::collections::HashMap;
use std::fmt;

use crate::core::input::{Key, KeyEvent, Modifiers};

/// A normalized key chord. Modifier order never matters:
/// `ctrl+shift+x` and `shift+ctrl+x` parse to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub key: Key,
    /// `space space`: a second space typed while the query is a single space.
    pub doubled: bool,
}

impl Chord {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self {
            modifiers,
            key: normalize_key(key),
            doubled: false,
        }
    }

    pub fn double_space() -> Self {
        Self {
            modifiers: Modifiers::NONE,
            key: Key::Char(' '),
            doubled: true,
        }
    }

    /// Parses `ctrl+alt+x`, `shift+pageup`, `space space`, ...
    ///
    /// Case-insensitive. `control` is accepted for ctrl, `option` and `meta`
    /// for alt.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.trim().to_lowercase();
        if lowered.split_whitespace().collect::<Vec<_>>() == ["space", "space"] {
            return Some(Self::double_space());
        }

        let mut modifiers = Modifiers::NONE;
        let mut parts: Vec<&str> = lowered.split('+').collect();
        // A trailing empty part means the key itself is '+'.
        let key_name = match parts.pop()? {
            "" if parts.last() == Some(&"") => {
                parts.pop();
                "+"
            }
            "" => return None,
            name => name,
        };
        for part in parts {
            match part.trim() {
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" | "option" | "meta" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                _ => return None,
            }
        }

        let key = Key::from_name(key_name.trim())?;
        Some(Self::new(key, modifiers))
    }

    fn with_shift_alt_swapped(self) -> Self {
        let mut modifiers = self.modifiers;
        std::mem::swap(&mut modifiers.shift, &mut modifiers.alt);
        Self { modifiers, ..self }
    }
}

fn normalize_key(key: Key) -> Key {
    match key {
        Key::Char(ch) => Key::Char(ch.to_lowercase().next().unwrap_or(ch)),
        other => other,
    }
}

impl From<KeyEvent> for Chord {
    fn from(event: KeyEvent) -> Self {
        Self::new(event.key, event.modifiers)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.doubled {
            return f.write_str("space space");
        }
        fmt::Display::fmt(&KeyEvent::new(self.key, self.modifiers), f)
    }
}

/// Editor keys the hotkey table never sees.
pub fn is_reserved_editor_key(event: &KeyEvent) -> bool {
    let m = event.modifiers;
    if m.is_empty() {
        return matches!(
            event.key,
            Key::Up
                | Key::Down
                | Key::PageUp
                | Key::PageDown
                | Key::Home
                | Key::End
                | Key::Backspace
                | Key::Delete
                | Key::Enter
        );
    }
    m == Modifiers::CTRL && matches!(event.key, Key::Char('a' | 'u' | 'w'))
}

type EnabledFn<H> = Box<dyn Fn(&H) -> bool>;

struct Binding<H, C> {
    label: String,
    chord: Option<Chord>,
    command: C,
    enabled: Option<EnabledFn<H>>,
}

/// A registered command as listed by the command palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub index: usize,
    pub label: String,
    pub chord: Option<Chord>,
}

impl fmt::Display for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chord {
            Some(chord) => write!(f, "{} ({chord})", self.label),
            None => f.write_str(&self.label),
        }
    }
}

/// Maps chords to commands for a host of type `H`.
///
/// Commands without a chord are still listed for the palette.
pub struct HotkeyTable<H, C> {
    bindings: Vec<Binding<H, C>>,
    by_chord: HashMap<Chord, usize>,
}

impl<H, C> Default for HotkeyTable<H, C> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            by_chord: HashMap::new(),
        }
    }
}

impl<H, C> HotkeyTable<H, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. A chord that is already bound is moved to the new command.
    pub fn register(&mut self, label: impl Into<String>, chord: Option<Chord>, command: C) -> usize {
        self.insert(label.into(), chord, command, None)
    }

    /// Registers a command that only dispatches while `enabled(host)` holds.
    pub fn register_when<F>(
        &mut self,
        label: impl Into<String>,
        chord: Option<Chord>,
        command: C,
        enabled: F,
    ) -> usize
    where
        F: Fn(&H) -> bool + 'static,
    {
        self.insert(label.into(), chord, command, Some(Box::new(enabled)))
    }

    fn insert(
        &mut self,
        label: String,
        chord: Option<Chord>,
        command: C,
        enabled: Option<EnabledFn<H>>,
    ) -> usize {
        let index = self.bindings.len();
        if let Some(chord) = chord {
            if let Some(previous) = self.by_chord.insert(chord, index) {
                tracing::debug!(%chord, previous = %self.bindings[previous].label, %label, "hotkey rebound");
                self.bindings[previous].chord = None;
            }
        }
        self.bindings.push(Binding {
            label,
            chord,
            command,
            enabled,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_bound(&self, host: &H, chord: &Chord) -> bool {
        self.lookup_chord(host, chord).is_some()
    }

    pub fn lookup_chord(&self, host: &H, chord: &Chord) -> Option<usize> {
        let index = *self.by_chord.get(chord)?;
        self.is_enabled(host, index).then_some(index)
    }

    /// Resolves a key event to a command index.
    ///
    /// Non-character keys whose chord is unbound retry with shift and alt
    /// swapped, since many terminals report one for the other.
    pub fn lookup(&self, host: &H, event: &KeyEvent) -> Option<usize> {
        let chord = Chord::from(*event);
        if let Some(index) = self.lookup_chord(host, &chord) {
            return Some(index);
        }
        if !event.key.is_char() && chord.modifiers.shift != chord.modifiers.alt {
            return self.lookup_chord(host, &chord.with_shift_alt_swapped());
        }
        None
    }

    pub fn is_enabled(&self, host: &H, index: usize) -> bool {
        self.bindings
            .get(index)
            .map(|binding| binding.enabled.as_ref().map_or(true, |enabled| enabled(host)))
            .unwrap_or(false)
    }

    pub fn command_mut(&mut self, index: usize) -> Option<&mut C> {
        self.bindings.get_mut(index).map(|binding| &mut binding.command)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.bindings.get(index).map(|binding| binding.label.as_str())
    }

    /// Enabled commands in registration order.
    pub fn entries(&self, host: &H) -> Vec<CommandEntry> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(index, _)| self.is_enabled(host, *index))
            .map(|(index, binding)| CommandEntry {
                index,
                label: binding.label.clone(),
                chord: binding.chord,
            })
            .collect()
    }
}
