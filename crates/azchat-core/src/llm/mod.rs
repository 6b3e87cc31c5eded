//! LLM API client and types
//!
//! Supports Azure OpenAI and OpenAI-compatible endpoints, for both
//! chat completions and the assistant (thread/run) API.

mod backend;
mod client;
mod types;

pub use backend::{AssistantBackend, CompletionBackend};
pub use client::LlmClient;
pub use types::*;
