//! HTTP handlers
//!
//! The chat page plus the JSON endpoints driving the conversation manager.

use axum::{
    body::Bytes,
    extract::{Extension, State},
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use azchat_core::{ChatMode, ChatReply, RunResult};

use crate::error::{ApiError, Result};
use crate::middleware::session::SessionId;
use crate::server::AppState;

const CHAT_PAGE: &str = include_str!("../templates/chat.html");

// ============================================================================
// Request/Response types
// ============================================================================

/// Chat request payload
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// Continue or adopt this conversation (completions mode)
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Continue or adopt this thread (assistant mode)
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Chat response payload
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Completion {
        conversation_id: String,
        response: String,
    },
    Run {
        thread_id: String,
        response: String,
        status: String,
    },
}

#[derive(Debug, Serialize)]
pub struct NewConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Chat page
pub async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Start a new conversation for this session
pub async fn new_conversation(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<NewConversationResponse>> {
    let conversation_id = state.conversations.new_conversation(session.as_str()).await?;
    Ok(Json(NewConversationResponse { conversation_id }))
}

/// Forget everything about this session's conversation
pub async fn reset(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<ResetResponse>> {
    state.conversations.reset(session.as_str()).await?;
    Ok(Json(ResetResponse { ok: true }))
}

/// Chat endpoint - send one user message and return the reply
///
/// The body is parsed by hand so that a missing or malformed payload gets
/// the same 400 as an empty message.
pub async fn chat(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: Bytes,
) -> Result<Json<ChatResponse>> {
    let req: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Unparsable chat body: {}", e);
        ApiError::InvalidRequest("No message provided".to_string())
    })?;

    let explicit_id = match state.config.chat.mode {
        ChatMode::Completions => req.conversation_id.as_deref(),
        ChatMode::Assistant => req.thread_id.as_deref(),
    };

    let reply = state
        .conversations
        .send_message(session.as_str(), &req.message, explicit_id)
        .await?;

    match reply {
        ChatReply::Completion {
            conversation_id,
            response,
        } => {
            info!("Conversation {}: reply of {} chars", conversation_id, response.len());
            Ok(Json(ChatResponse::Completion {
                conversation_id,
                response,
            }))
        }
        ChatReply::Run(run) => match run.result {
            RunResult::Answer(response) | RunResult::ActionRequired(response) => {
                info!("Thread {}: run {}", run.thread_id, run.status);
                Ok(Json(ChatResponse::Run {
                    thread_id: run.thread_id,
                    response,
                    status: run.status,
                }))
            }
            RunResult::Failed(error) => Err(ApiError::RunFailed {
                error,
                status: run.status,
                thread_id: run.thread_id,
            }),
        },
    }
}
