//! Route definitions
//!
//! Defines all HTTP endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{chat, health, index, new_conversation, reset};
use crate::server::AppState;

/// Create the router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Chat page
        .route("/", get(index))
        // Health check
        .route("/health", get(health))
        // Conversation management
        .route("/conversation/new", post(new_conversation))
        .route("/reset", post(reset))
        // Chat endpoint
        .route("/chat", post(chat))
}
