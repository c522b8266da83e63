//! Platform terminal backends.

pub mod process_terminal;
pub mod stdin_buffer;
