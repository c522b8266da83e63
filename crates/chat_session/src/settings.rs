//! Persisted chat settings.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DEFAULT_MODEL: &str = "mock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub web_search: bool,
    /// Restart a failed generation instead of asking.
    pub retry: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: env::var("TAPE_CHAT_MODEL")
                .ok()
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            web_search: false,
            retry: false,
        }
    }
}

impl ChatSettings {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(source) => return Err(SessionError::io("reading settings", path, source)),
        };
        serde_json::from_str(&content).map_err(|source| SessionError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| SessionError::io("creating settings directory", parent, source))?;
        }
        let mut content = serde_json::to_string_pretty(self).map_err(|source| {
            SessionError::Settings {
                path: path.to_path_buf(),
                source,
            }
        })?;
        content.push('\n');
        fs::write(path, content).map_err(|source| SessionError::io("writing settings", path, source))
    }

    /// Labels for the settings picker, in toggle order.
    #[must_use]
    pub fn toggle_labels(&self) -> Vec<String> {
        vec![
            format!("retry: {}", on_off(self.retry)),
            format!("web_search: {}", on_off(self.web_search)),
        ]
    }

    /// Flips the toggle at `index` of [`ChatSettings::toggle_labels`].
    pub fn toggle(&mut self, index: usize) -> bool {
        match index {
            0 => self.retry = !self.retry,
            1 => self.web_search = !self.web_search,
            _ => return false,
        }
        true
    }

    /// `chat: model=<m> retry=<b> web_search=<b>`
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "chat: model={} retry={} web_search={}",
            self.model, self.retry, self.web_search
        )
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use super::{ChatSettings, DEFAULT_MODEL};
    use crate::error::SessionError;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let _lock = env_lock();
        let _model = set_env_guard("TAPE_CHAT_MODEL", None);
        let dir = tempfile::tempdir().expect("tempdir");

        let settings = ChatSettings::load(&dir.path().join("settings.json")).expect("load");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert!(!settings.retry);
        assert!(!settings.web_search);
    }

    #[test]
    fn model_default_comes_from_the_environment() {
        let _lock = env_lock();
        let _model = set_env_guard("TAPE_CHAT_MODEL", Some("local-echo"));
        assert_eq!(ChatSettings::default().model, "local-echo");

        let _blank = set_env_guard("TAPE_CHAT_MODEL", Some(" "));
        assert_eq!(ChatSettings::default().model, DEFAULT_MODEL);
    }

    #[test]
    fn partial_files_fill_in_defaults_and_save_round_trips() {
        let _lock = env_lock();
        let _model = set_env_guard("TAPE_CHAT_MODEL", None);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, r#"{"retry": true}"#).expect("write");

        let mut settings = ChatSettings::load(&path).expect("load");
        assert!(settings.retry);
        assert_eq!(settings.model, DEFAULT_MODEL);

        assert!(settings.toggle(1));
        assert!(!settings.toggle(2));
        settings.save(&path).expect("save");
        assert_eq!(ChatSettings::load(&path).expect("reload"), settings);
        assert_eq!(
            settings.summary(),
            "chat: model=mock retry=true web_search=true"
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{retry").expect("write");

        assert!(matches!(
            ChatSettings::load(&path),
            Err(SessionError::Settings { .. })
        ));
    }

    #[test]
    fn toggle_labels_reflect_the_current_values() {
        let settings = ChatSettings {
            model: "m".to_string(),
            web_search: true,
            retry: false,
        };
        assert_eq!(settings.toggle_labels(), vec!["retry: off", "web_search: on"]);
    }
}
