//! Streaming chat and agent console on top of `tape_menu`.
//!
//! The conversation is shown as a menu of [`Line`]s. Completions stream on
//! the session's task runner and reach the UI only through its foreground
//! queue. Agent mode resolves every tool call of a round before the next
//! completion starts.

pub mod agent;
pub mod editor;
pub mod error;
pub mod lines;
pub mod session;
pub mod settings;
pub mod tools;

pub use agent::{extract_result, TOOL_COMPLETED, TOOL_INTERRUPTED};
pub use editor::{ExternalEditor, MessageEditor};
pub use error::SessionError;
pub use lines::{Line, LineKind};
pub use session::{chat_menu, ChatOptions, ChatSession, StreamOutcome, INTERRUPTED_MARKER};
pub use settings::ChatSettings;
pub use tools::{ToolError, ToolRegistry};
