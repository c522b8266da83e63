//! Background task runner: one OS thread hosting a current-thread tokio
//! runtime for the lifetime of the runner.
//!
//! Tasks never touch UI state directly. They post callbacks through their
//! [`TaskContext`] and observe cancellation through a [`CancelToken`] at their
//! own suspension points.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use futures_util::FutureExt;
use tokio::sync::{oneshot, Notify};

use crate::error::MenuError;
use crate::runtime::foreground::ForegroundQueue;

pub const RUNNER_THREAD_NAME: &str = "tape-menu-tasks";

pub type TaskId = u64;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a handle and its task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns `true` only for the first request.
    pub fn cancel(&self) -> bool {
        let first = !self.state.cancelled.swap(true, Ordering::SeqCst);
        if first {
            self.state.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation was requested.
    pub async fn cancelled(&self) {
        let mut notified = std::pin::pin!(self.state.notify.notified());
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Result of work that may be cut short by its cancel token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Handed to every submitted task.
pub struct TaskContext<C> {
    id: TaskId,
    token: CancelToken,
    foreground: ForegroundQueue<C>,
}

impl<C> Clone for TaskContext<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            token: self.token.clone(),
            foreground: self.foreground.clone(),
        }
    }
}

impl<C> TaskContext<C> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn post_to_foreground<F>(&self, callback: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.foreground.post(callback);
    }

    /// Runs `future` until it finishes or the task is cancelled.
    pub async fn cancellable<F: Future>(&self, future: F) -> TaskOutcome<F::Output> {
        if self.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => TaskOutcome::Cancelled,
            output = future => TaskOutcome::Completed(output),
        }
    }
}

/// Cancellable handle to a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    token: CancelToken,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Idempotent. Cancelling a finished task does nothing.
    pub fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.token.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

pub struct TaskRunner<C> {
    handle: tokio::runtime::Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    foreground: ForegroundQueue<C>,
    next_id: AtomicU64,
}

impl<C: 'static> TaskRunner<C> {
    /// Spawns the runner thread. Posted callbacks go to `foreground`.
    pub fn new(foreground: ForegroundQueue<C>) -> Result<Self, MenuError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (handle_tx, handle_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name(RUNNER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = handle_tx.send(Err(err));
                        return;
                    }
                };
                if handle_tx.send(Ok(runtime.handle().clone())).is_err() {
                    return;
                }
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                tracing::debug!("task runner stopped");
            })
            .map_err(MenuError::runner_spawn)?;

        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return Err(MenuError::runner_spawn(err)),
            Err(_) => {
                return Err(MenuError::runner_spawn(std::io::Error::other(
                    "runner thread exited before starting",
                )))
            }
        };

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            foreground,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn foreground(&self) -> &ForegroundQueue<C> {
        &self.foreground
    }

    /// Starts a task. `make` receives the task's context and returns its future.
    pub fn submit<F, Fut>(&self, make: F) -> TaskHandle
    where
        F: FnOnce(TaskContext<C>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.submit_guarded(make, |_| {})
    }

    /// Like [`TaskRunner::submit`], but `on_panic` is posted to the
    /// foreground if the task panics.
    pub fn submit_guarded<F, Fut, P>(&self, make: F, on_panic: P) -> TaskHandle
    where
        F: FnOnce(TaskContext<C>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
        P: FnOnce(&mut C) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancelToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let context = TaskContext {
            id,
            token: token.clone(),
            foreground: self.foreground.clone(),
        };
        let foreground = self.foreground.clone();
        let future = make(context);
        let done = Arc::clone(&finished);

        tracing::debug!(task = id, "task submitted");
        self.handle.spawn(async move {
            let result = AssertUnwindSafe(future).catch_unwind().await;
            done.store(true, Ordering::SeqCst);
            match result {
                Ok(()) => tracing::debug!(task = id, "task finished"),
                Err(_) => {
                    tracing::error!(task = id, "task panicked");
                    foreground.post(on_panic);
                }
            }
        });

        TaskHandle {
            id,
            token,
            finished,
        }
    }

    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        let requested = handle.cancel();
        if requested {
            tracing::debug!(task = handle.id(), "task cancel requested");
        }
        requested
    }

    pub fn post_to_foreground<F>(&self, callback: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.foreground.post(callback);
    }
}

impl<C> Drop for TaskRunner<C> {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("task runner thread panicked");
            }
        }
    }
}
