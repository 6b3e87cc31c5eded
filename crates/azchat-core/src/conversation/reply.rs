//! Results of a chat turn

use crate::llm::{Role, ThreadMessage};

/// Returned instead of a model answer when a run stops at `requires_action`
pub const REQUIRES_ACTION_ADVISORY: &str =
    "The assistant asked to run a tool, which this chat does not support yet. \
     Please rephrase your request.";

/// What a single `send_message` produced
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// Completions mode: the assistant's answer, already appended to history
    Completion {
        conversation_id: String,
        response: String,
    },
    /// Assistant mode: the result of one run on a thread
    Run(RunReply),
}

/// Outcome of an assistant run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReply {
    pub thread_id: String,
    /// Remote run status, or `timeout`
    pub status: String,
    pub result: RunResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// Run completed; newest assistant text
    Answer(String),
    /// Run is waiting for tool output we cannot provide
    ActionRequired(String),
    /// Run ended (or was given up on) without an answer
    Failed(String),
}

/// Newest assistant-authored message with non-empty text.
///
/// Messages are ordered by `created_at` descending before scanning, so a
/// page that arrives out of order cannot surface a stale reply. Ties keep
/// the order the API returned them in.
pub fn latest_assistant_text(messages: &[ThreadMessage]) -> Option<String> {
    let mut ordered: Vec<&ThreadMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    ordered
        .into_iter()
        .filter(|m| m.role == Role::Assistant)
        .map(ThreadMessage::text)
        .find(|text| !text.is_empty())
}
