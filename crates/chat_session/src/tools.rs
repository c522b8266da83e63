//! Host tools the agent may call.
//!
//! A [`ToolRegistry`] maps tool names to callables. Callables run on a
//! blocking worker of the task runner, never on the UI thread.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use chat_provider::{ToolDefinition, ToolUse};
use serde_json::{json, Value};
use thiserror::Error;
use wait_timeout::ChildExt;

pub const BASH_TIMEOUT: Duration = Duration::from_secs(60);
const BASH_MAX_OUTPUT_BYTES: usize = 100 * 1024;
const READ_MAX_BYTES: usize = 200 * 1024;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("missing argument '{argument}' for {tool}")]
    MissingArgument { tool: String, argument: &'static str },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch command: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Failed { message: String },
}

impl ToolError {
    fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// `Some(content)` becomes the tool result; `None` means "completed".
pub type ToolFn = Box<dyn Fn(&ToolUse) -> Result<Option<String>, ToolError> + Send + Sync>;

pub struct Tool {
    pub definition: ToolDefinition,
    run: ToolFn,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `read_file`, `write_file`, `list_dir` and
    /// `run_bash_command`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            ToolDefinition {
                name: "read_file".to_string(),
                description: "Read a UTF-8 text file.".to_string(),
                input_schema: path_schema(),
            },
            |tool_use| read_file(required_arg(tool_use, "path")?).map(Some),
        );
        registry.register(
            ToolDefinition {
                name: "write_file".to_string(),
                description: "Create or overwrite a file with the given content.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"}
                    },
                    "required": ["path", "content"]
                }),
            },
            |tool_use| {
                let path = required_arg(tool_use, "path")?;
                let content = required_arg(tool_use, "content")?;
                write_file(path, content).map(Some)
            },
        );
        registry.register(
            ToolDefinition {
                name: "list_dir".to_string(),
                description: "List the entries of a directory.".to_string(),
                input_schema: path_schema(),
            },
            |tool_use| list_dir(required_arg(tool_use, "path")?).map(Some),
        );
        registry.register(
            ToolDefinition {
                name: "run_bash_command".to_string(),
                description: "Run a bash command and return its output.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"command": {"type": "string"}},
                    "required": ["command"]
                }),
            },
            |tool_use| run_bash_command(required_arg(tool_use, "command")?, BASH_TIMEOUT).map(Some),
        );
        registry
    }

    /// Adds a tool, replacing any tool of the same name.
    pub fn register<F>(&mut self, definition: ToolDefinition, run: F)
    where
        F: Fn(&ToolUse) -> Result<Option<String>, ToolError> + Send + Sync + 'static,
    {
        self.tools.retain(|tool| tool.definition.name != definition.name);
        self.tools.push(Tool {
            definition,
            run: Box::new(run),
        });
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn run(&self, tool_use: &ToolUse) -> Result<Option<String>, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.definition.name == tool_use.tool_name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: tool_use.tool_name.clone(),
            })?;
        tracing::debug!(tool = %tool_use.tool_name, id = %tool_use.tool_use_id, "tool dispatched");
        (tool.run)(tool_use)
    }
}

fn path_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"path": {"type": "string"}},
        "required": ["path"]
    })
}

fn required_arg<'a>(tool_use: &'a ToolUse, argument: &'static str) -> Result<&'a str, ToolError> {
    tool_use
        .arg_str(argument)
        .ok_or_else(|| ToolError::MissingArgument {
            tool: tool_use.tool_name.clone(),
            argument,
        })
}

fn read_file(path: &str) -> Result<String, ToolError> {
    let bytes = fs::read(path).map_err(|source| ToolError::io("reading file", path, source))?;
    if bytes.len() > READ_MAX_BYTES {
        return Err(ToolError::Failed {
            message: format!(
                "File exceeds max read size ({} bytes > {READ_MAX_BYTES} bytes)",
                bytes.len()
            ),
        });
    }
    String::from_utf8(bytes).map_err(|_| ToolError::Failed {
        message: "File is not valid UTF-8 text".to_string(),
    })
}

fn write_file(path: &str, content: &str) -> Result<String, ToolError> {
    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| ToolError::io("creating directory", parent, source))?;
    }
    fs::write(path, content).map_err(|source| ToolError::io("writing file", path, source))?;
    Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
}

fn list_dir(path: &str) -> Result<String, ToolError> {
    let entries = fs::read_dir(path).map_err(|source| ToolError::io("listing directory", path, source))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ToolError::io("listing directory", path, source))?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names.join("\n"))
}

/// Runs `command` through `bash -lc`, killing it after `timeout`.
pub fn run_bash_command(command: &str, timeout: Duration) -> Result<String, ToolError> {
    let mut child = Command::new("bash")
        .arg("-lc")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn { source })?;

    let (timed_out, status) = match child.wait_timeout(timeout) {
        Ok(Some(status)) => (false, status),
        Ok(None) => {
            let _ = child.kill();
            let status = child.wait().map_err(|error| ToolError::Failed {
                message: format!(
                    "Command timed out after {}s and wait failed: {error}",
                    timeout.as_secs()
                ),
            })?;
            (true, status)
        }
        Err(error) => {
            let _ = child.kill();
            return Err(ToolError::Failed {
                message: format!("Failed waiting for bash command: {error}"),
            });
        }
    };

    let stdout = read_pipe_bytes(child.stdout.take());
    let stderr = read_pipe_bytes(child.stderr.take());
    let status_label = if timed_out {
        format!("timeout after {}s", timeout.as_secs())
    } else {
        format_exit_status(status)
    };

    let content = format!(
        "status: {status_label}\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&stdout),
        String::from_utf8_lossy(&stderr)
    );
    Ok(truncate_to_byte_limit(content, BASH_MAX_OUTPUT_BYTES))
}

fn read_pipe_bytes(pipe: Option<impl Read>) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes);
    bytes
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}
