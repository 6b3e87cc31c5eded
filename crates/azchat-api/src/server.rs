//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use std::future::Future;
use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use azchat_core::{Config, ConversationManager};

use crate::middleware::session::{session_middleware, SessionKey};
use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conversations: Arc<ConversationManager>,
    pub session_key: SessionKey,
    pub session_lifetime: chrono::Duration,
}

impl AppState {
    pub fn new(config: Config, conversations: Arc<ConversationManager>) -> Self {
        let session_key = SessionKey::from_config(config.session.secret.as_deref());
        let session_lifetime = config.session_lifetime();
        Self {
            config: Arc::new(config),
            conversations,
            session_key,
            session_lifetime,
        }
    }
}

/// Build the full application: routes, session cookie, CORS and request tracing
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
