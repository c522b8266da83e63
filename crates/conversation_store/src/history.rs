use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::ConversationStoreError;

pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Naming, listing and rotation of timestamped history files in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryManager {
    save_dir: PathBuf,
    prefix: String,
    ext: String,
    max_history: usize,
}

impl HistoryManager {
    #[must_use]
    pub fn new(save_dir: impl Into<PathBuf>, prefix: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            save_dir: save_dir.into(),
            prefix: prefix.into(),
            ext: ext.into(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// `<prefix><yymmddHHMMSS><ext>` for the current local time. Creates the
    /// directory; does not create the file. A numeric suffix avoids clobbering
    /// a file from the same second.
    pub fn new_file_path(&self) -> Result<PathBuf, ConversationStoreError> {
        self.ensure_dir()?;
        let now = local_now();
        let stamp = now
            .format(format_description!(
                "[year repr:last_two][month][day][hour][minute][second]"
            ))
            .map_err(ConversationStoreError::ClockFormat)?;

        let mut path = self.save_dir.join(format!("{}{stamp}{}", self.prefix, self.ext));
        let mut suffix = 1;
        while path.exists() {
            path = self
                .save_dir
                .join(format!("{}{stamp}_{suffix}{}", self.prefix, self.ext));
            suffix += 1;
        }
        Ok(path)
    }

    /// Creates an empty history file and rotates old ones.
    pub fn create_new_file(&self) -> Result<PathBuf, ConversationStoreError> {
        let path = self.new_file_path()?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ConversationStoreError::io("creating history file", &path, source))?;
        self.delete_old_files()?;
        Ok(path)
    }

    /// Path for a caller-chosen name inside the history directory. The name
    /// is slugified; names without any usable character are rejected.
    pub fn named_file_path(&self, name: &str) -> Result<PathBuf, ConversationStoreError> {
        let stem = name.trim().strip_suffix(self.ext.as_str()).unwrap_or(name.trim());
        let slug = slugify(stem);
        if slug.is_empty() {
            return Err(ConversationStoreError::InvalidName {
                name: name.to_string(),
            });
        }
        self.ensure_dir()?;
        Ok(self.save_dir.join(format!("{slug}{}", self.ext)))
    }

    /// Matching files, oldest modification first.
    pub fn all_files(&self) -> Result<Vec<PathBuf>, ConversationStoreError> {
        self.collect_files(true)
    }

    /// Matching files, newest modification first.
    pub fn all_files_desc(&self) -> Result<Vec<PathBuf>, ConversationStoreError> {
        let mut files = self.all_files()?;
        files.reverse();
        Ok(files)
    }

    /// Every file with the history extension, including named ones, newest
    /// first.
    pub fn saved_files_desc(&self) -> Result<Vec<PathBuf>, ConversationStoreError> {
        let mut files = self.collect_files(false)?;
        files.reverse();
        Ok(files)
    }

    fn collect_files(&self, require_prefix: bool) -> Result<Vec<PathBuf>, ConversationStoreError> {
        let entries = match fs::read_dir(&self.save_dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ConversationStoreError::io(
                    "listing history directory",
                    &self.save_dir,
                    source,
                ))
            }
        };

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| {
                ConversationStoreError::io("listing history directory", &self.save_dir, source)
            })?;
            let path = entry.path();
            if !self.matches(&path, require_prefix) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .map_err(|source| ConversationStoreError::io("reading file metadata", &path, source))?;
            files.push((modified, path));
        }
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Removes all but the newest `max_history` files. Returns how many were
    /// removed.
    pub fn delete_old_files(&self) -> Result<usize, ConversationStoreError> {
        let files = self.all_files()?;
        let excess = files.len().saturating_sub(self.max_history);
        for path in &files[..excess] {
            fs::remove_file(path)
                .map_err(|source| ConversationStoreError::io("removing old history file", path, source))?;
        }
        if excess > 0 {
            tracing::debug!(removed = excess, dir = %self.save_dir.display(), "history rotated");
        }
        Ok(excess)
    }

    fn matches(&self, path: &Path, require_prefix: bool) -> bool {
        if !path.is_file() {
            return false;
        }
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                !name.starts_with('.')
                    && name.ends_with(&self.ext)
                    && (!require_prefix || name.starts_with(&self.prefix))
            })
    }

    fn ensure_dir(&self) -> Result<(), ConversationStoreError> {
        fs::create_dir_all(&self.save_dir).map_err(|source| {
            ConversationStoreError::io("creating history directory", &self.save_dir, source)
        })
    }
}

pub(crate) fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub(crate) fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use super::{slugify, HistoryManager, DEFAULT_MAX_HISTORY};
    use crate::error::ConversationStoreError;

    fn touch(path: &std::path::Path, age_secs: u64) {
        let file = File::create(path).expect("create");
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .expect("set mtime");
    }

    #[test]
    fn new_file_path_uses_prefix_timestamp_and_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = HistoryManager::new(dir.path().join("conversations"), "chat_", ".json");

        let path = manager.new_file_path().expect("path");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");

        assert!(manager.save_dir().is_dir());
        assert!(name.starts_with("chat_") && name.ends_with(".json"));
        let stamp = &name["chat_".len()..name.len() - ".json".len()];
        assert_eq!(stamp.len(), 12);
        assert!(stamp.chars().all(|ch| ch.is_ascii_digit()));
        assert_eq!(manager.max_history(), DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn files_created_in_the_same_second_get_distinct_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = HistoryManager::new(dir.path(), "chat_", ".json");

        let first = manager.create_new_file().expect("first");
        let second = manager.create_new_file().expect("second");

        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn listing_orders_by_mtime_and_ignores_other_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("chat_b.json"), 30);
        touch(&dir.path().join("chat_a.json"), 10);
        touch(&dir.path().join("chat_c.json"), 20);
        touch(&dir.path().join("notes.json"), 5);
        touch(&dir.path().join("chat_d.txt"), 5);
        let manager = HistoryManager::new(dir.path(), "chat_", ".json");

        let names = |files: Vec<std::path::PathBuf>| -> Vec<String> {
            files
                .iter()
                .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
                .collect()
        };
        assert_eq!(
            names(manager.all_files().expect("list")),
            vec!["chat_b.json", "chat_c.json", "chat_a.json"]
        );
        assert_eq!(
            names(manager.all_files_desc().expect("list")),
            vec!["chat_a.json", "chat_c.json", "chat_b.json"]
        );
        assert_eq!(
            names(manager.saved_files_desc().expect("list")),
            vec!["notes.json", "chat_a.json", "chat_c.json", "chat_b.json"]
        );
    }

    #[test]
    fn rotation_keeps_the_newest_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (index, age) in [50, 40, 30, 20, 10].into_iter().enumerate() {
            touch(&dir.path().join(format!("chat_{index}.json")), age);
        }
        let manager = HistoryManager::new(dir.path(), "chat_", ".json").with_max_history(2);

        assert_eq!(manager.delete_old_files().expect("rotate"), 3);

        let remaining = manager.all_files().expect("list");
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].ends_with("chat_3.json"));
        assert!(remaining[1].ends_with("chat_4.json"));
        assert_eq!(manager.delete_old_files().expect("rotate again"), 0);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = HistoryManager::new(dir.path().join("absent"), "chat_", ".json");
        assert!(manager.all_files().expect("list").is_empty());
        fs::create_dir(dir.path().join("absent")).expect("mkdir");
        assert!(manager.all_files().expect("list").is_empty());
    }

    #[test]
    fn named_paths_are_slugified_and_validated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = HistoryManager::new(dir.path(), "chat_", ".json");

        let path = manager.named_file_path("My Notes/v2.json").expect("path");
        assert!(path.ends_with("my-notes-v2.json"));
        assert!(matches!(
            manager.named_file_path(" ?? "),
            Err(ConversationStoreError::InvalidName { .. })
        ));
        assert_eq!(slugify("Release plan!"), "release-plan");
    }
}
