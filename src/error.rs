//! Engine error types.
//!
//! Only unrecoverable conditions surface here. Malformed keys, invalid search
//! patterns and out-of-bounds draws are absorbed by the engine itself.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("failed to start terminal: {source}")]
    TerminalStart {
        #[source]
        source: io::Error,
    },
    #[error("failed to stop terminal: {source}")]
    TerminalStop {
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn background task runner: {source}")]
    RunnerSpawn {
        #[source]
        source: io::Error,
    },
    #[error("failed to initialize logging: {message}")]
    Logging { message: String },
}

impl MenuError {
    pub(crate) fn terminal_start(source: io::Error) -> Self {
        Self::TerminalStart { source }
    }

    pub(crate) fn terminal_stop(source: io::Error) -> Self {
        Self::TerminalStop { source }
    }

    pub(crate) fn runner_spawn(source: io::Error) -> Self {
        Self::RunnerSpawn { source }
    }
}
