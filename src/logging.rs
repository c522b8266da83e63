//! File-backed tracing setup.
//!
//! The terminal is in raw mode while a menu is open, so log output never goes
//! to stdout or stderr.

use std::fs::OpenOptions;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;

use crate::config::MenuConfig;
use crate::error::MenuError;

static LOGGING_INIT: OnceLock<bool> = OnceLock::new();

/// Installs the global subscriber once. Returns whether logging is active.
///
/// Later calls return the first call's result without touching the subscriber.
pub fn init_logging(config: &MenuConfig) -> Result<bool, MenuError> {
    if let Some(active) = LOGGING_INIT.get() {
        return Ok(*active);
    }

    let Some(directive) = config.log_filter.as_deref() else {
        return Ok(*LOGGING_INIT.get_or_init(|| false));
    };

    let filter = EnvFilter::try_new(directive).map_err(|err| MenuError::Logging {
        message: format!("invalid filter {directive:?}: {err}"),
    })?;

    let path = config.log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| MenuError::Logging {
            message: format!("cannot open {}: {err}", path.display()),
        })?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok();

    Ok(*LOGGING_INIT.get_or_init(|| installed))
}

#[cfg(test)]
mod tests {
    use super::init_logging;
    use crate::config::MenuConfig;

    #[test]
    fn invalid_directive_is_reported_or_ignored_after_init() {
        let config = MenuConfig {
            log_filter: Some("tape_menu=notalevel".to_string()),
            ..MenuConfig::default()
        };
        // Another test may have initialized logging first; then the cached result wins.
        if let Err(err) = init_logging(&config) {
            assert!(err.to_string().contains("invalid filter"));
        }
    }
}
