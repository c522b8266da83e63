//! Menu runtime: state, event loop, wakeups and the background task runner.

pub mod foreground;
pub mod menu;
pub mod state;
pub mod task_runner;
pub mod wake;

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
