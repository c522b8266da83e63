//! FIFO queue of callbacks that background work posts to the UI thread.
//!
//! This queue is the only way background work touches UI-owned state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::runtime::lock_unpoisoned;
use crate::runtime::wake::WakeHandle;

pub type ForegroundCallback<C> = Box<dyn FnOnce(&mut C) + Send>;

struct QueueState<C> {
    callbacks: VecDeque<ForegroundCallback<C>>,
    waker: Option<WakeHandle>,
}

pub struct ForegroundQueue<C> {
    state: Arc<Mutex<QueueState<C>>>,
}

impl<C> Clone for ForegroundQueue<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C> Default for ForegroundQueue<C> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                callbacks: VecDeque::new(),
                waker: None,
            })),
        }
    }
}

impl<C> ForegroundQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes the loop on every later post.
    pub fn set_waker(&self, waker: WakeHandle) {
        let pending = {
            let mut state = lock_unpoisoned(&self.state);
            state.waker = Some(waker.clone());
            !state.callbacks.is_empty()
        };
        if pending {
            waker.wake();
        }
    }

    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let waker = {
            let mut state = lock_unpoisoned(&self.state);
            state.callbacks.push_back(Box::new(callback));
            state.waker.clone()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.state).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs queued callbacks in post order until the queue is empty.
    ///
    /// The lock is not held while a callback runs, so callbacks may post more.
    pub fn drain_into(&self, target: &mut C) -> usize {
        let mut applied = 0;
        loop {
            let next = lock_unpoisoned(&self.state).callbacks.pop_front();
            let Some(callback) = next else {
                return applied;
            };
            callback(target);
            applied += 1;
        }
    }
}
