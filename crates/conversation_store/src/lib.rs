mod error;
mod history;
mod preview;
mod store;

pub use error::ConversationStoreError;
pub use history::{HistoryManager, DEFAULT_MAX_HISTORY};
pub use preview::{truncate_text, ConversationSummary, PREVIEW_MAX_CHARS};
pub use store::{load_conversation, save_conversation};
