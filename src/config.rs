//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_IDLE_POLL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct MenuConfig {
    /// `EnvFilter` directive for the log file. Logging stays off when unset.
    pub log_filter: Option<String>,
    pub log_file: Option<PathBuf>,
    pub idle_poll_ms: u64,
    pub debug_keys: bool,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            log_file: None,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            debug_keys: false,
        }
    }
}

impl MenuConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env_string_opt("TAPE_MENU_LOG"),
            log_file: env_string_opt("TAPE_MENU_LOG_FILE").map(PathBuf::from),
            idle_poll_ms: env_u64("TAPE_MENU_IDLE_POLL_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_IDLE_POLL_MS),
            debug_keys: env_flag("TAPE_MENU_DEBUG_KEYS"),
        }
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Log destination, falling back to the temp dir when only a filter is set.
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("tape_menu.log"))
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::MenuConfig;
    use std::env;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

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
    fn env_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard("TAPE_MENU_LOG", None);
        let _g2 = set_env_guard("TAPE_MENU_LOG_FILE", None);
        let _g3 = set_env_guard("TAPE_MENU_IDLE_POLL_MS", None);
        let _g4 = set_env_guard("TAPE_MENU_DEBUG_KEYS", None);

        let config = MenuConfig::from_env();
        assert!(config.log_filter.is_none());
        assert!(config.log_file.is_none());
        assert_eq!(config.idle_poll_ms, 1000);
        assert!(!config.debug_keys);
    }

    #[test]
    fn env_values_are_read() {
        let _lock = env_lock();
        let _g1 = set_env_guard("TAPE_MENU_LOG", Some("tape_menu=debug"));
        let _g2 = set_env_guard("TAPE_MENU_LOG_FILE", Some("/tmp/menu.log"));
        let _g3 = set_env_guard("TAPE_MENU_IDLE_POLL_MS", Some("250"));
        let _g4 = set_env_guard("TAPE_MENU_DEBUG_KEYS", Some("1"));

        let config = MenuConfig::from_env();
        assert_eq!(config.log_filter.as_deref(), Some("tape_menu=debug"));
        assert_eq!(config.log_path(), PathBuf::from("/tmp/menu.log"));
        assert_eq!(config.idle_poll_ms, 250);
        assert!(config.debug_keys);
    }

    #[test]
    fn invalid_or_zero_poll_falls_back_to_default() {
        let _lock = env_lock();
        let _g = set_env_guard("TAPE_MENU_IDLE_POLL_MS", Some("zero"));
        assert_eq!(MenuConfig::from_env().idle_poll_ms, 1000);

        let _g = set_env_guard("TAPE_MENU_IDLE_POLL_MS", Some("0"));
        assert_eq!(MenuConfig::from_env().idle_poll_ms, 1000);
    }

    #[test]
    fn blank_log_filter_is_ignored() {
        let _lock = env_lock();
        let _g = set_env_guard("TAPE_MENU_LOG", Some("  "));
        assert!(MenuConfig::from_env().log_filter.is_none());
    }
}
