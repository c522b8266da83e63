//! Typed terminal output commands and a single output gate.
//!
//! Invariant: all terminal writes flow through `OutputGate::flush(..)`.

use std::fmt::Write as _;

use crate::core::terminal::Terminal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw text or control sequences.
    Bytes(String),
    BytesStatic(&'static str),

    /// Absolute cursor move, 0-based.
    MoveTo { row: u16, col: u16 },
    ClearScreen,
    ClearLine,
    /// SGR reset.
    ResetStyle,

    HideCursor,
    ShowCursor,

    AltScreenEnter,
    AltScreenLeave,
    BracketedPasteEnable,
    BracketedPasteDisable,
}

impl TerminalCmd {
    pub fn bytes(data: impl Into<String>) -> Self {
        Self::Bytes(data.into())
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            Self::Bytes(data) => out.push_str(data),
            Self::BytesStatic(data) => out.push_str(data),
            Self::MoveTo { row, col } => {
                let _ = write!(out, "\x1b[{};{}H", u32::from(*row) + 1, u32::from(*col) + 1);
            }
            Self::ClearScreen => out.push_str("\x1b[2J\x1b[H"),
            Self::ClearLine => out.push_str("\x1b[2K"),
            Self::ResetStyle => out.push_str("\x1b[0m"),
            Self::HideCursor => out.push_str("\x1b[?25l"),
            Self::ShowCursor => out.push_str("\x1b[?25h"),
            Self::AltScreenEnter => out.push_str("\x1b[?1049h"),
            Self::AltScreenLeave => out.push_str("\x1b[?1049l"),
            Self::BracketedPasteEnable => out.push_str("\x1b[?2004h"),
            Self::BracketedPasteDisable => out.push_str("\x1b[?2004l"),
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn extend<I>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = TerminalCmd>,
    {
        self.cmds.extend(cmds);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Hands the buffered commands to another gate without writing them.
    pub fn into_commands(self) -> Vec<TerminalCmd> {
        self.cmds
    }

    /// Writes every buffered command in one `Terminal::write` call.
    pub fn flush<T: Terminal + ?Sized>(&mut self, term: &mut T) {
        if self.cmds.is_empty() {
            return;
        }
        let mut out = String::new();
        for cmd in self.cmds.drain(..) {
            cmd.encode_into(&mut out);
        }
        term.write(&out);
    }
}
