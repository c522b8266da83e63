//! Spinner menu that runs one background job to completion.
//!
//! The job's result closes the menu; Escape cancels the job.

use std::future::Future;
use std::time::Duration;

use crate::core::terminal::Terminal;
use crate::error::MenuError;
use crate::runtime::foreground::ForegroundQueue;
use crate::runtime::menu::{Menu, MenuHost, MenuIo};
use crate::runtime::state::{MenuOptions, MenuState};
use crate::runtime::task_runner::{CancelToken, TaskHandle, TaskOutcome, TaskRunner};

pub const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

const SPIN_INTERVAL: Duration = Duration::from_millis(100);

pub struct TaskHost<R> {
    menu: MenuState<String>,
    label: String,
    frame: usize,
    handle: Option<TaskHandle>,
    result: Option<R>,
}

impl<R> TaskHost<R> {
    pub fn spinner(&self) -> char {
        SPINNER_FRAMES[self.frame % SPINNER_FRAMES.len()]
    }
}

impl<R: 'static> MenuHost for TaskHost<R> {
    type Item = String;

    fn menu(&self) -> &MenuState<String> {
        &self.menu
    }

    fn menu_mut(&mut self) -> &mut MenuState<String> {
        &mut self.menu
    }

    fn on_idle(&mut self, _io: &mut MenuIo<'_>) {
        self.frame = self.frame.wrapping_add(1);
        self.menu.mark_dirty();
    }

    fn on_enter(&mut self, _io: &mut MenuIo<'_>) {}

    fn on_escape(&mut self, _io: &mut MenuIo<'_>) -> bool {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
        self.menu.cancel();
        true
    }

    fn prompt_text(&self) -> String {
        format!("{} {}", self.spinner(), self.label)
    }
}

pub struct TaskMenu<R: Send + 'static> {
    menu: Menu<TaskHost<R>>,
    runner: TaskRunner<TaskHost<R>>,
}

impl<R: Send + 'static> TaskMenu<R> {
    /// Starts `job` on a fresh runner thread right away.
    pub fn new<F, Fut>(label: impl Into<String>, job: F) -> Result<Self, MenuError>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let queue = ForegroundQueue::new();
        let runner = TaskRunner::new(queue.clone())?;
        let options = MenuOptions {
            allow_input: false,
            search_mode: false,
            enable_command_palette: false,
            idle_poll: SPIN_INTERVAL,
            ..MenuOptions::default()
        };
        let mut menu = Menu::new(TaskHost {
            menu: MenuState::new(Vec::new(), String::clone, options),
            label: label.into(),
            frame: 0,
            handle: None,
            result: None,
        });
        menu.attach_foreground(queue);

        let handle = runner.submit(|ctx| {
            let future = job(ctx.token().clone());
            async move {
                if let TaskOutcome::Completed(result) = ctx.cancellable(future).await {
                    ctx.post_to_foreground(move |host: &mut TaskHost<R>| {
                        host.result = Some(result);
                        host.menu.close();
                    });
                }
            }
        });
        menu.host_mut().handle = Some(handle);
        Ok(Self { menu, runner })
    }

    pub fn handle(&self) -> Option<&TaskHandle> {
        self.menu.host().handle.as_ref()
    }

    /// Shows the spinner on `io` until the job finishes or is cancelled.
    pub fn exec(mut self, io: &mut MenuIo<'_>) -> Option<R> {
        io.nested(&mut self.menu);
        self.finish()
    }

    pub fn run<T: Terminal>(mut self, terminal: T) -> Result<Option<R>, MenuError> {
        self.menu.run(terminal)?;
        Ok(self.finish())
    }

    fn finish(self) -> Option<R> {
        let Self { menu, runner } = self;
        let mut host = menu.into_host();
        if let Some(handle) = &host.handle {
            runner.cancel(handle);
        }
        host.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskMenu, SPINNER_FRAMES};
    use crate::core::screen::BufferScreen;
    use crate::runtime::menu::MenuIo;
    use crate::runtime::wake::EventSource;
    use std::time::Duration;

    #[test]
    fn result_closes_the_menu() {
        let events = EventSource::new();
        let mut screen = BufferScreen::new(6, 30);
        let mut io = MenuIo::new(&mut screen, &events);
        let task = TaskMenu::new("working", |_token| async { 6 * 7 }).expect("task menu");
        assert_eq!(task.exec(&mut io), Some(42));
    }

    #[test]
    fn escape_cancels_the_job() {
        let events = EventSource::new();
        let mut screen = BufferScreen::new(6, 30);
        let mut io = MenuIo::new(&mut screen, &events);
        let task = TaskMenu::new("waiting", |_token| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            1
        })
        .expect("task menu");
        let handle = task.handle().cloned().expect("handle");
        events.push_keys("\x1b");
        assert_eq!(task.exec(&mut io), None);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn spinner_shows_in_the_prompt() {
        let events = EventSource::new();
        let mut screen = BufferScreen::new(6, 30);
        let task = TaskMenu::new("slow", |token| async move {
            token.cancelled().await;
        })
        .expect("task menu");
        {
            let mut io = MenuIo::new(&mut screen, &events);
            events.push_keys("\x1b");
            task.exec(&mut io);
        }
        let prompt = screen.row_text(0);
        assert!(SPINNER_FRAMES.iter().any(|frame| prompt.starts_with(*frame)));
        assert!(prompt.ends_with("slow:"));
    }
}
