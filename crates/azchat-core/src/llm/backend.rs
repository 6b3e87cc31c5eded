//! Seams between the conversation layer and the remote API

use async_trait::async_trait;

use crate::Result;

use super::types::{ChatCompletionResponse, ChatMessage, MessageList, Run, SamplingParams, Thread};

/// Stateless chat-completions API
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the full ordered message list and return the model's completion
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: SamplingParams,
    ) -> Result<ChatCompletionResponse>;
}

/// Stateful assistant API (threads and runs)
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create an empty thread
    async fn create_thread(&self) -> Result<Thread>;

    /// Append a user message to a thread
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()>;

    /// Start a run of `assistant_id` on the thread
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    /// Fetch the current state of a run
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Most recent messages of a thread, newest first
    async fn list_messages(&self, thread_id: &str) -> Result<MessageList>;
}
