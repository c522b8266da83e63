//! Engine building blocks: key decoding, hotkeys, matching, editing,
//! paging and the render contract.

pub mod editor;
pub mod input;
pub mod keybindings;
pub mod matcher;
pub mod output;
pub mod screen;
pub mod terminal;
pub mod viewport;
