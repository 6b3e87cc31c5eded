//! azchat-api: HTTP surface for azchat
//!
//! Serves the chat page and the JSON chat endpoints, and ties each browser
//! to a server-side session through a signed cookie. Built with axum.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{app, start_server, AppState};
