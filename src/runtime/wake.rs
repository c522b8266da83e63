//! Event source for the menu loop.
//!
//! Terminal threads push raw input and resize notices; background work only
//! wakes the loop. `poll` is the single suspension point of the UI thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::runtime::lock_unpoisoned;

#[derive(Debug, Default)]
struct WakeState {
    pending_inputs: VecDeque<String>,
    pending_resize: bool,
    notified: bool,
}

#[derive(Debug, Default)]
struct Wake {
    state: Mutex<WakeState>,
    cvar: Condvar,
}

impl Wake {
    fn update(&self, f: impl FnOnce(&mut WakeState)) {
        let mut state = lock_unpoisoned(&self.state);
        f(&mut state);
        self.cvar.notify_one();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// One complete raw input sequence.
    Input(String),
    Resize,
    /// Background work posted something; nothing else to read.
    Notified,
    Timeout,
}

/// Cloneable, thread-safe handle that wakes the loop.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    wake: Arc<Wake>,
}

impl WakeHandle {
    pub fn wake(&self) {
        self.wake.update(|state| state.notified = true);
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventSource {
    wake: Arc<Wake>,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&self, data: impl Into<String>) {
        let data = data.into();
        self.wake.update(|state| state.pending_inputs.push_back(data));
    }

    /// Queues each sequence of `data` separately, as the terminal would.
    pub fn push_keys(&self, data: &str) {
        let (sequences, rest) = crate::platform::stdin_buffer::split_sequences(data);
        self.wake.update(|state| {
            state.pending_inputs.extend(sequences);
            if !rest.is_empty() {
                state.pending_inputs.push_back(rest);
            }
        });
    }

    pub fn signal_resize(&self) {
        self.wake.update(|state| state.pending_resize = true);
    }

    pub fn waker(&self) -> WakeHandle {
        WakeHandle {
            wake: Arc::clone(&self.wake),
        }
    }

    pub fn input_handler(&self) -> Box<dyn FnMut(String) + Send> {
        let source = self.clone();
        Box::new(move |data| source.push_input(data))
    }

    pub fn resize_handler(&self) -> Box<dyn FnMut() + Send> {
        let source = self.clone();
        Box::new(move || source.signal_resize())
    }

    pub fn has_pending_input(&self) -> bool {
        !lock_unpoisoned(&self.wake.state).pending_inputs.is_empty()
    }

    /// Waits up to `timeout` for the next event. A zero timeout never blocks.
    pub fn poll(&self, timeout: Duration) -> LoopEvent {
        let deadline = Instant::now() + timeout;
        let mut state = lock_unpoisoned(&self.wake.state);
        loop {
            if state.pending_resize {
                state.pending_resize = false;
                return LoopEvent::Resize;
            }
            if let Some(data) = state.pending_inputs.pop_front() {
                return LoopEvent::Input(data);
            }
            if state.notified {
                state.notified = false;
                return LoopEvent::Notified;
            }

            let now = Instant::now();
            if now >= deadline {
                return LoopEvent::Timeout;
            }
            state = self
                .wake
                .cvar
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventSource, LoopEvent};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn zero_timeout_never_blocks() {
        let events = EventSource::new();
        let started = Instant::now();
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Timeout);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn resize_wins_over_input_and_inputs_stay_ordered() {
        let events = EventSource::new();
        events.push_keys("ab\x1b[A");
        events.signal_resize();
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Resize);
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Input("a".into()));
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Input("b".into()));
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Input("\x1b[A".into()));
        assert_eq!(events.poll(Duration::ZERO), LoopEvent::Timeout);
    }

    #[test]
    fn waker_interrupts_a_blocking_poll() {
        let events = EventSource::new();
        let waker = events.waker();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wake();
        });
        let started = Instant::now();
        assert_eq!(events.poll(Duration::from_secs(10)), LoopEvent::Notified);
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().expect("waker thread");
    }
}
