use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::ConversationStoreError;
use crate::history::local_offset;
use crate::store::load_conversation;

pub const PREVIEW_MAX_CHARS: usize = 60;

/// Truncates to `max_chars` characters, marking the cut with `...`. Line
/// breaks are flattened to spaces.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect();
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut truncated: String = flat.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// One saved conversation as shown in a picker.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// File stem, unless the file carries an auto-generated `chat_` name.
    pub display_name: Option<String>,
    /// All message texts joined by spaces.
    pub text: String,
}

impl ConversationSummary {
    pub fn read(path: &Path) -> Result<Self, ConversationStoreError> {
        let messages = load_conversation(path)?;
        let modified = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|source| ConversationStoreError::io("reading file metadata", path, source))?;
        let display_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.starts_with("chat_"))
            .map(str::to_string);
        let text = messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self {
            path: path.to_path_buf(),
            modified,
            display_name,
            text,
        })
    }

    /// `<mtime>: [<name>: ]<truncated text>`.
    pub fn preview(&self) -> Result<String, ConversationStoreError> {
        let modified = OffsetDateTime::from(self.modified).to_offset(local_offset());
        let stamp = modified
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .map_err(ConversationStoreError::ClockFormat)?;

        let mut parts = vec![stamp];
        if let Some(name) = &self.display_name {
            parts.push(name.clone());
        }
        parts.push(truncate_text(&self.text, PREVIEW_MAX_CHARS));
        Ok(parts.join(": "))
    }
}
