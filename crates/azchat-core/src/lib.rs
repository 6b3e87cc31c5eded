//! azchat-core: chat front-end core library
//!
//! LLM API clients (chat completions and assistant threads), run polling,
//! server-side sessions and the conversation manager tying them together.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod poll;
pub mod session;

pub use config::{ChatConfig, ChatMode, Config, LlmConfig, LlmProvider, ServerConfig, SessionConfig};
pub use conversation::{ChatBackend, ChatReply, ConversationManager, RunReply, RunResult};
pub use error::{Error, Result};
pub use llm::{AssistantBackend, ChatMessage, CompletionBackend, LlmClient, Role};
pub use poll::{PollOutcome, PollPolicy};
pub use session::{InMemorySessionStore, SessionState, SessionStore, SqliteSessionStore};
