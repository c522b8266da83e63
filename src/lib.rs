//! Interactive terminal selection menus.
//!
//! Invariant: single output gate. Only `core::output::OutputGate::flush(..)` writes to the
//! terminal.
//!
//! # Public API Overview
//! - Describe a menu with [`MenuState`] and [`MenuOptions`], own it from a [`MenuHost`], and
//!   run it with [`Menu::run`] on a [`Terminal`] such as [`ProcessTerminal`].
//! - Bind commands to key chords with [`Menu::add_command`]; `ctrl+p` lists them.
//! - Run background work on a [`TaskRunner`] and post results back with
//!   [`TaskContext::post_to_foreground`].
//! - Ready-made menus live in [`widgets`]: list menus, yes/no prompts, a spinner task menu.

#![allow(
    clippy::derivable_impls,
    clippy::needless_range_loop,
    clippy::question_mark,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::unnecessary_map_or
)]

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod render;
pub mod runtime;
pub mod widgets;

pub use crate::config::MenuConfig;
pub use crate::error::MenuError;
pub use crate::logging::init_logging;

/// Matching, editing, paging and key handling.
pub use crate::core::editor::InputEditor;
pub use crate::core::input::{decode_input, decode_key, InputEvent, Key, KeyEvent, Modifiers};
pub use crate::core::keybindings::{Chord, CommandEntry, HotkeyTable};
pub use crate::core::matcher::{matches, MatchMode, Matcher};
pub use crate::core::viewport::Viewport;

/// Render contract.
pub use crate::core::screen::{
    draw_text, BufferScreen, CellGrid, Color, Overflow, Screen, Style, CROP_MARKER,
};

/// Terminal interfaces and the process-backed implementation.
pub use crate::core::terminal::{Terminal, TerminalGuard, TerminalHandlers};
pub use crate::platform::process_terminal::ProcessTerminal;
pub use crate::render::TerminalScreen;

/// Menu runtime.
pub use crate::runtime::foreground::ForegroundQueue;
pub use crate::runtime::menu::{Menu, MenuHost, MenuIo};
pub use crate::runtime::state::{HighlightRule, MenuOptions, MenuOutcome, MenuPhase, MenuState};
pub use crate::runtime::task_runner::{
    CancelToken, TaskContext, TaskHandle, TaskId, TaskOutcome, TaskRunner,
};
pub use crate::runtime::wake::{EventSource, LoopEvent, WakeHandle};
