//! [`Screen`] backed by a real terminal.
//!
//! Frames are drawn into a cell grid and diffed row by row against the
//! previous frame; only changed rows are rewritten. Every write goes through
//! one [`OutputGate`] flush per refresh.

use std::fmt::Write as _;

use crate::core::output::{OutputGate, TerminalCmd};
use crate::core::screen::{Cell, CellGrid, Screen, Style};
use crate::core::terminal::{Terminal, TerminalHandlers};

pub struct TerminalScreen<'t, T: Terminal> {
    terminal: &'t mut T,
    gate: OutputGate,
    current: CellGrid,
    /// `None` forces a full repaint on the next refresh.
    previous: Option<CellGrid>,
}

impl<'t, T: Terminal> TerminalScreen<'t, T> {
    pub fn new(terminal: &'t mut T) -> Self {
        let (rows, cols) = terminal_size(&*terminal);
        let mut screen = Self {
            terminal,
            gate: OutputGate::new(),
            current: CellGrid::new(rows, cols),
            previous: None,
        };
        screen.gate.push(TerminalCmd::HideCursor);
        screen.gate.push(TerminalCmd::ClearScreen);
        screen.gate.flush(&mut *screen.terminal);
        screen
    }

    pub fn terminal(&self) -> &T {
        self.terminal
    }
}

fn terminal_size<T: Terminal>(terminal: &T) -> (usize, usize) {
    (
        usize::from(terminal.rows().max(1)),
        usize::from(terminal.columns().max(1)),
    )
}

/// SGR sequence selecting `style` from a reset state.
fn sgr(style: Style) -> String {
    let mut out = String::from("\x1b[0");
    if let Some(code) = style.color.sgr_code() {
        let _ = write!(out, ";{code}");
    }
    if style.bold {
        out.push_str(";1");
    }
    if style.selected {
        out.push_str(";7");
    }
    out.push('m');
    out
}

fn encode_row(cells: &[Cell]) -> String {
    let mut out = String::new();
    let mut active: Option<Style> = None;
    for cell in cells {
        // Trailing half of a wide grapheme.
        if cell.symbol.is_empty() {
            continue;
        }
        if active != Some(cell.style) {
            out.push_str(&sgr(cell.style));
            active = Some(cell.style);
        }
        out.push_str(&cell.symbol);
    }
    out
}

impl<T: Terminal> Screen for TerminalScreen<'_, T> {
    fn size(&self) -> (usize, usize) {
        (self.current.rows(), self.current.cols())
    }

    fn clear(&mut self) {
        self.current.clear();
    }

    fn put_str(&mut self, row: usize, col: usize, text: &str, style: Style) -> usize {
        self.current.put_str(row, col, text, style)
    }

    fn set_cursor(&mut self, position: Option<(usize, usize)>) {
        match position {
            Some((row, col)) => {
                self.gate.push(TerminalCmd::MoveTo {
                    row: u16::try_from(row).unwrap_or(u16::MAX),
                    col: u16::try_from(col).unwrap_or(u16::MAX),
                });
                self.gate.push(TerminalCmd::ShowCursor);
            }
            None => self.gate.push(TerminalCmd::HideCursor),
        }
    }

    fn refresh(&mut self) {
        let mut frame = OutputGate::new();
        frame.push(TerminalCmd::HideCursor);
        let full = self.previous.is_none();
        if full {
            frame.push(TerminalCmd::ClearScreen);
        }
        let mut changed = 0usize;
        for row in 0..self.current.rows() {
            let cells = self.current.row(row);
            let unchanged = self
                .previous
                .as_ref()
                .is_some_and(|previous| previous.row(row) == cells);
            if unchanged {
                continue;
            }
            changed += 1;
            frame.push(TerminalCmd::MoveTo {
                row: u16::try_from(row).unwrap_or(u16::MAX),
                col: 0,
            });
            frame.push(TerminalCmd::Bytes(encode_row(cells)));
            frame.push(TerminalCmd::ResetStyle);
        }
        tracing::trace!(changed, full, "screen refresh");

        // Cursor commands queued by `set_cursor` go last.
        frame.extend(std::mem::take(&mut self.gate).into_commands());
        frame.flush(&mut *self.terminal);
        self.previous = Some(self.current.clone());
    }

    fn invalidate(&mut self) {
        self.previous = None;
    }

    fn sync_size(&mut self) {
        let (rows, cols) = terminal_size(&*self.terminal);
        if (rows, cols) != self.size() {
            tracing::debug!(rows, cols, "terminal resized");
            self.current.resize(rows, cols);
            self.previous = None;
        }
    }

    fn suspend(&mut self, handlers: TerminalHandlers, run: &mut dyn FnMut()) {
        self.gate.push(TerminalCmd::ResetStyle);
        self.gate.push(TerminalCmd::ShowCursor);
        self.gate.flush(&mut *self.terminal);
        if let Err(err) = self.terminal.stop() {
            tracing::warn!(%err, "terminal stop failed before suspend");
        }

        run();

        if let Err(err) = self.terminal.start(handlers.on_input, handlers.on_resize) {
            tracing::error!(%err, "terminal restart failed after suspend");
        }
        self.gate.push(TerminalCmd::HideCursor);
        self.gate.push(TerminalCmd::ClearScreen);
        self.gate.flush(&mut *self.terminal);
        self.sync_size();
        self.previous = None;
    }
}

impl<T: Terminal> Drop for TerminalScreen<'_, T> {
    fn drop(&mut self) {
        let mut gate = OutputGate::new();
        gate.push(TerminalCmd::ResetStyle);
        gate.push(TerminalCmd::ShowCursor);
        gate.flush(&mut *self.terminal);
    }
}
