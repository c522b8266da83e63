//! Editing message text outside the menu.

use std::env;
use std::fs;
use std::io;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the edited version of `text`.
pub trait MessageEditor {
    fn edit(&mut self, text: &str) -> io::Result<String>;
}

/// Opens `$VISUAL` / `$EDITOR` (default `vi`) on a temporary markdown file.
/// Callers run it with the terminal suspended.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        let command = ["VISUAL", "EDITOR"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string());
        Self::new(command)
    }
}

impl MessageEditor for ExternalEditor {
    fn edit(&mut self, text: &str) -> io::Result<String> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| io::Error::other("editor command is empty"))?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let path = env::temp_dir().join(format!("tape_chat_{}_{nanos}.md", std::process::id()));
        fs::write(&path, text)?;

        let status = Command::new(program).args(parts).arg(&path).status();
        let edited = fs::read_to_string(&path);
        let _ = fs::remove_file(&path);

        let status = status?;
        if !status.success() {
            return Err(io::Error::other(format!("editor exited with {status}")));
        }
        let mut edited = edited?;
        if !text.ends_with('\n') && edited.ends_with('\n') {
            edited.pop();
        }
        Ok(edited)
    }
}
