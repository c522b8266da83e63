//! Small nested prompts: pick one of a few choices, or confirm yes/no.

use std::time::Duration;

use crate::runtime::menu::{MenuHost, MenuIo, MenuOutcome};
use crate::runtime::state::MenuOptions;
use crate::widgets::list_menu::list_menu;

fn prompt_options(prompt: &str) -> MenuOptions {
    MenuOptions {
        enable_command_palette: false,
        idle_poll: Duration::from_millis(250),
        ..MenuOptions::default()
    }
    .with_prompt(prompt)
}

/// Runs a nested menu over `choices`. `None` when cancelled.
pub fn choose(io: &mut MenuIo<'_>, prompt: &str, choices: &[&str]) -> Option<usize> {
    let items: Vec<String> = choices.iter().map(|choice| choice.to_string()).collect();
    let mut menu = list_menu(items, prompt_options(prompt));
    if io.nested(&mut menu) != MenuOutcome::Closed {
        return None;
    }
    menu.host().menu().selected_index()
}

/// `true` only when `yes` was chosen.
pub fn confirm(io: &mut MenuIo<'_>, prompt: &str) -> bool {
    choose(io, prompt, &["yes", "no"]) == Some(0)
}
