//! Terminal device contract and its release guard.

use std::io;

/// A raw-mode terminal the menu loop can draw to and read keys from.
///
/// `start` hands over two callbacks: one receives complete input sequences,
/// the other is called after the window size changed. Both may run on a
/// background thread.
pub trait Terminal {
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> io::Result<()>;

    /// Restores the cooked terminal state. Must be safe to call twice.
    fn stop(&mut self) -> io::Result<()>;

    /// Discards pending keystrokes so they do not leak into the shell.
    fn drain_input(&mut self, max_ms: u64, idle_ms: u64);

    fn write(&mut self, data: &str);

    fn columns(&self) -> u16;
    fn rows(&self) -> u16;
}

/// Callbacks a terminal feeds while started.
pub struct TerminalHandlers {
    pub on_input: Box<dyn FnMut(String) + Send>,
    pub on_resize: Box<dyn FnMut() + Send>,
}

impl<T: Terminal + ?Sized> Terminal for &mut T {
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> io::Result<()> {
        (**self).start(on_input, on_resize)
    }

    fn stop(&mut self) -> io::Result<()> {
        (**self).stop()
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        (**self).drain_input(max_ms, idle_ms)
    }

    fn write(&mut self, data: &str) {
        (**self).write(data)
    }

    fn columns(&self) -> u16 {
        (**self).columns()
    }

    fn rows(&self) -> u16 {
        (**self).rows()
    }
}

/// Drains input and stops the wrapped terminal when dropped.
///
/// Dropping covers every exit path of the menu loop, unwinding included.
/// `release` does the same eagerly and reports the stop error.
pub struct TerminalGuard<T: Terminal> {
    terminal: T,
    released: bool,
    max_drain_ms: u64,
    idle_drain_ms: u64,
}

impl<T: Terminal> TerminalGuard<T> {
    /// Wraps a started terminal; drains for at most 200ms, 30ms idle.
    pub fn new(terminal: T) -> Self {
        Self {
            terminal,
            released: false,
            max_drain_ms: 200,
            idle_drain_ms: 30,
        }
    }

    pub fn set_drain_timings(&mut self, max_ms: u64, idle_ms: u64) {
        self.max_drain_ms = max_ms;
        self.idle_drain_ms = idle_ms;
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drains and stops the terminal once. Later calls are no-ops.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.terminal.drain_input(self.max_drain_ms, self.idle_drain_ms);
        self.terminal.stop()
    }
}

impl<T: Terminal> Drop for TerminalGuard<T> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(%err, "terminal stop failed during guard drop");
        }
    }
}
