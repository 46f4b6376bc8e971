//! HTTP and websocket gateway for the Courier realtime core.
//!
//! Routes are split across [`rest`] (chat creation, listings, history)
//! and [`websocket`] (the realtime connection). State lives in
//! [`state::GatewayState`].

pub mod error;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{GatewayError, GatewayResult};
pub use state::GatewayState;

use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/chats", post(rest::create_chat).get(rest::list_chats))
        .route(
            "/api/chats/:chat_id/messages",
            get(rest::list_messages).post(rest::send_message),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
}
