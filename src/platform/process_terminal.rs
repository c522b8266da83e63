//! Terminal backed by the process's stdin/stdout (unix only).
//!
//! `start` switches stdin to raw mode, enters the alternate screen, enables
//! bracketed paste and spawns two threads: one polling stdin and one waiting
//! for `SIGWINCH`. `stop` undoes all of it and is safe to call twice.

#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
#[cfg(unix)]
use std::thread::{self, JoinHandle};
#[cfg(unix)]
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core::terminal::Terminal;
#[cfg(unix)]
use crate::platform::stdin_buffer::StdinBuffer;
#[cfg(unix)]
use crate::runtime::lock_unpoisoned;

#[cfg(unix)]
use libc::{self, c_int};
#[cfg(unix)]
use signal_hook::iterator::Signals;

#[cfg(unix)]
type InputHandler = Arc<Mutex<Option<Box<dyn FnMut(String) + Send>>>>;
#[cfg(unix)]
type ResizeHandler = Arc<Mutex<Option<Box<dyn FnMut() + Send>>>>;

#[cfg(unix)]
const ENTER_SEQUENCE: &str = "\x1b[?1049h\x1b[?2004h";
#[cfg(unix)]
const LEAVE_SEQUENCE: &str = "\x1b[?2004l\x1b[0m\x1b[?25h\x1b[?1049l";

#[cfg(unix)]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(unix)]
fn write_all_fd(fd: c_int, bytes: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        let rest = &bytes[written..];
        // SAFETY: `rest` is a live slice for the duration of the call.
        let result = unsafe { libc::write(fd, rest.as_ptr() as *const libc::c_void, rest.len()) };
        if result < 0 {
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => {
                    poll_fd(fd, libc::POLLOUT, 50);
                    continue;
                }
                _ => return Err(err),
            }
        }
        if result == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
        }
        written += result as usize;
    }
    Ok(())
}

#[cfg(unix)]
fn read_winsize(fd: c_int) -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes into the provided winsize.
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(unix)]
fn poll_fd(fd: c_int, events: libc::c_short, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    // SAFETY: one valid pollfd.
    let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    result > 0 && (fds.revents & events) != 0
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    // SAFETY: tcgetattr fills the zeroed struct or fails.
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    // SAFETY: termios came from tcgetattr.
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
pub struct ProcessTerminal {
    stdin_fd: c_int,
    stdout_fd: c_int,
    original_termios: Option<libc::termios>,
    input_handler: InputHandler,
    resize_handler: ResizeHandler,
    input_thread: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    drain_mode: Arc<AtomicBool>,
    last_input_ms: Arc<AtomicU64>,
    resize_signal_handle: Option<signal_hook::iterator::Handle>,
    resize_thread: Option<JoinHandle<()>>,
    started: bool,
}

#[cfg(unix)]
impl ProcessTerminal {
    pub fn new() -> Self {
        Self {
            stdin_fd: libc::STDIN_FILENO,
            stdout_fd: libc::STDOUT_FILENO,
            original_termios: None,
            input_handler: Arc::new(Mutex::new(None)),
            resize_handler: Arc::new(Mutex::new(None)),
            input_thread: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            drain_mode: Arc::new(AtomicBool::new(false)),
            last_input_ms: Arc::new(AtomicU64::new(now_ms())),
            resize_signal_handle: None,
            resize_thread: None,
            started: false,
        }
    }

    fn enable_raw_mode(&mut self) -> io::Result<()> {
        let original = match self.original_termios {
            Some(original) => original,
            None => {
                let original = get_termios(self.stdin_fd)?;
                self.original_termios = Some(original);
                original
            }
        };
        let mut raw = original;
        // SAFETY: raw is an initialized termios.
        unsafe {
            libc::cfmakeraw(&mut raw);
        }
        set_termios(self.stdin_fd, &raw)
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        if let Some(original) = self.original_termios.as_ref() {
            set_termios(self.stdin_fd, original)?;
        }
        Ok(())
    }

    fn start_input_thread(&mut self) -> io::Result<()> {
        let stdin_fd = self.stdin_fd;
        let handler = Arc::clone(&self.input_handler);
        let stop_flag = Arc::clone(&self.stop_flag);
        let drain_mode = Arc::clone(&self.drain_mode);
        let last_input_ms = Arc::clone(&self.last_input_ms);

        let thread = thread::Builder::new()
            .name("tape-menu-stdin".to_string())
            .spawn(move || {
                let mut buffer = [0u8; 4096];
                let mut stdin_buffer = StdinBuffer::new(25);

                while !stop_flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    let timeout_ms = stdin_buffer.next_timeout_ms(now, 50);
                    let events = if poll_fd(stdin_fd, libc::POLLIN, timeout_ms) {
                        // SAFETY: reading into a stack buffer of the given length.
                        let read_len = unsafe {
                            libc::read(stdin_fd, buffer.as_mut_ptr() as *mut _, buffer.len())
                        };
                        if read_len <= 0 {
                            continue;
                        }
                        last_input_ms.store(now_ms(), Ordering::SeqCst);
                        stdin_buffer.process(&buffer[..read_len as usize])
                    } else {
                        stdin_buffer.flush_due(now)
                    };

                    if events.is_empty() || drain_mode.load(Ordering::SeqCst) {
                        continue;
                    }
                    let mut handler = lock_unpoisoned(&handler);
                    if let Some(handler) = handler.as_mut() {
                        for event in events {
                            handler(event.into_wire());
                        }
                    }
                }
            })?;
        self.input_thread = Some(thread);
        Ok(())
    }

    fn stop_input_thread(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.input_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("stdin thread panicked");
            }
        }
    }

    fn start_resize_thread(&mut self) -> io::Result<()> {
        let mut signals = Signals::new([libc::SIGWINCH])?;
        let handle = signals.handle();
        let resize_handler = Arc::clone(&self.resize_handler);

        let thread = thread::Builder::new()
            .name("tape-menu-winch".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    let mut handler = lock_unpoisoned(&resize_handler);
                    if let Some(handler) = handler.as_mut() {
                        handler();
                    }
                }
            })?;

        self.resize_signal_handle = Some(handle);
        self.resize_thread = Some(thread);
        Ok(())
    }

    fn stop_resize_thread(&mut self) {
        if let Some(handle) = self.resize_signal_handle.take() {
            handle.close();
        }
        if let Some(thread) = self.resize_thread.take() {
            let _ = thread.join();
        }
    }

    fn clear_handlers(&mut self) {
        *lock_unpoisoned(&self.input_handler) = None;
        *lock_unpoisoned(&self.resize_handler) = None;
    }
}

#[cfg(unix)]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Drop for ProcessTerminal {
    fn drop(&mut self) {
        if self.started {
            let _ = self.stop();
        }
    }
}

#[cfg(unix)]
impl Terminal for ProcessTerminal {
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> io::Result<()> {
        *lock_unpoisoned(&self.input_handler) = Some(on_input);
        *lock_unpoisoned(&self.resize_handler) = Some(on_resize);

        self.stop_flag.store(false, Ordering::SeqCst);
        self.drain_mode.store(false, Ordering::SeqCst);
        self.last_input_ms.store(now_ms(), Ordering::SeqCst);

        if let Err(err) = self.enable_raw_mode() {
            self.clear_handlers();
            return Err(err);
        }
        self.started = true;

        let threads = self
            .start_resize_thread()
            .and_then(|()| self.start_input_thread());
        if let Err(err) = threads {
            let _ = self.stop();
            return Err(err);
        }

        write_all_fd(self.stdout_fd, ENTER_SEQUENCE.as_bytes())?;
        tracing::debug!(cols = self.columns(), rows = self.rows(), "terminal started");
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        self.stop_input_thread();
        self.stop_resize_thread();
        self.clear_handlers();

        let left = write_all_fd(self.stdout_fd, LEAVE_SEQUENCE.as_bytes());
        // Flush input before leaving raw mode so buffered bytes never reach the shell.
        // SAFETY: plain fd call.
        let _ = unsafe { libc::tcflush(self.stdin_fd, libc::TCIFLUSH) };
        self.restore_mode()?;
        tracing::debug!("terminal stopped");
        left
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        self.drain_mode.store(true, Ordering::SeqCst);
        self.last_input_ms.store(now_ms(), Ordering::SeqCst);

        let end_time = now_ms().saturating_add(max_ms);
        loop {
            let now = now_ms();
            if now >= end_time {
                break;
            }
            let last_input = self.last_input_ms.load(Ordering::SeqCst);
            if now.saturating_sub(last_input) >= idle_ms {
                break;
            }
            let sleep_for = idle_ms.min(end_time - now).max(1);
            thread::sleep(Duration::from_millis(sleep_for));
        }

        self.drain_mode.store(false, Ordering::SeqCst);
    }

    fn write(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        if let Err(err) = write_all_fd(self.stdout_fd, data.as_bytes()) {
            tracing::warn!(%err, "terminal write failed");
        }
    }

    fn columns(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(cols, _)| cols)
            .unwrap_or(80)
    }

    fn rows(&self) -> u16 {
        read_winsize(self.stdout_fd)
            .map(|(_, rows)| rows)
            .unwrap_or(24)
    }
}

#[cfg(not(unix))]
pub struct ProcessTerminal;

#[cfg(not(unix))]
impl ProcessTerminal {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Terminal for ProcessTerminal {
    fn start(
        &mut self,
        _on_input: Box<dyn FnMut(String) + Send>,
        _on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process terminal requires a unix platform",
        ))
    }

    fn stop(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn drain_input(&mut self, _max_ms: u64, _idle_ms: u64) {}

    fn write(&mut self, _data: &str) {}

    fn columns(&self) -> u16 {
        80
    }

    fn rows(&self) -> u16 {
        24
    }
}
