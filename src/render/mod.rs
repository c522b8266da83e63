//! Rendering: the menu frame painter and the terminal-backed screen.

pub mod menu_view;
pub mod terminal_screen;

pub use terminal_screen::TerminalScreen;
