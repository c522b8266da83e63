use std::fs;
use std::path::{Path, PathBuf};

use chat_provider::Message;

use crate::error::ConversationStoreError;

/// Reads a conversation file. An empty file is an empty conversation.
pub fn load_conversation(path: &Path) -> Result<Vec<Message>, ConversationStoreError> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConversationStoreError::io("reading conversation", path, source))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| ConversationStoreError::json(path, source))
}

/// Writes `messages` as a pretty JSON array, replacing `path` atomically.
pub fn save_conversation(path: &Path, messages: &[Message]) -> Result<(), ConversationStoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| {
            ConversationStoreError::io("creating conversation directory", parent, source)
        })?;
    }

    let mut content = serde_json::to_string_pretty(messages)
        .map_err(|source| ConversationStoreError::json(path, source))?;
    content.push('\n');

    let staging = staging_path(path);
    fs::write(&staging, content).map_err(|source| {
        ConversationStoreError::io("writing conversation staging file", &staging, source)
    })?;
    if let Err(source) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(ConversationStoreError::io(
            "replacing conversation file",
            path,
            source,
        ));
    }

    tracing::debug!(path = %path.display(), messages = messages.len(), "conversation saved");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
