//! Conversation handling
//!
//! One chat turn per call, in either completions or assistant mode.

mod manager;
mod reply;

pub use manager::{mint_conversation_id, ChatBackend, ConversationManager};
pub use reply::{latest_assistant_text, ChatReply, RunReply, RunResult, REQUIRES_ACTION_ADVISORY};
