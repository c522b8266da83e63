#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use tape_menu::Terminal;

type InputHandler = Box<dyn FnMut(String) + Send>;
type ResizeHandler = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub struct TerminalTrace {
    pub writes: Vec<String>,
    pub start_calls: usize,
    pub stop_calls: usize,
    pub drain_calls: Vec<(u64, u64)>,
    pub on_input: Option<InputHandler>,
    pub on_resize: Option<ResizeHandler>,
}

/// In-memory terminal. Scripted input is delivered as soon as it starts,
/// one sequence per callback, exactly as the stdin reader would.
pub struct SharedTerminal {
    state: Arc<Mutex<TerminalTrace>>,
    columns: u16,
    rows: u16,
    script: Vec<String>,
    fail_start: bool,
}

impl SharedTerminal {
    pub fn new(columns: u16, rows: u16) -> (Self, Arc<Mutex<TerminalTrace>>) {
        let state = Arc::new(Mutex::new(TerminalTrace::default()));
        (
            Self {
                state: Arc::clone(&state),
                columns,
                rows,
                script: Vec::new(),
                fail_start: false,
            },
            state,
        )
    }

    /// Queues key sequences such as `"a"`, `"\x1b[B"` or `"\r"`.
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.script.extend(keys.iter().map(|key| key.to_string()));
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl Terminal for SharedTerminal {
    fn start(
        &mut self,
        mut on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()> {
        if self.fail_start {
            return Err(std::io::Error::other("not a tty"));
        }
        for key in self.script.drain(..) {
            on_input(key);
        }
        let mut state = lock_unpoisoned(&self.state);
        state.start_calls += 1;
        state.on_input = Some(on_input);
        state.on_resize = Some(on_resize);
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.stop_calls += 1;
        Ok(())
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        let mut state = lock_unpoisoned(&self.state);
        state.drain_calls.push((max_ms, idle_ms));
    }

    fn write(&mut self, data: &str) {
        let mut state = lock_unpoisoned(&self.state);
        state.writes.push(data.to_string());
    }

    fn columns(&self) -> u16 {
        self.columns
    }

    fn rows(&self) -> u16 {
        self.rows
    }
}

pub fn rendered_output(state: &Arc<Mutex<TerminalTrace>>) -> String {
    lock_unpoisoned(state).writes.join("")
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
