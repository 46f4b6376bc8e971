//! REST endpoints: chat creation, chat listing, and message history.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use courier_auth::AuthUser;
use courier_database::{Chat, CreateChatRequest, Message};
use serde::Deserialize;
use serde_json::json;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct CreateChatBody {
    #[serde(default)]
    pub member_ids: Vec<i64>,
    #[serde(default)]
    pub is_group: bool,
    pub group_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<courier_database::MessageType>,
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/chats` — creates a chat. Responds 200 instead of 201 when a
/// private chat resolved to an existing room.
pub async fn create_chat(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateChatBody>,
) -> GatewayResult<impl IntoResponse> {
    let user = authorize(&state, &headers).await?;

    let (chat, created) = state
        .realtime
        .membership
        .create_chat(&CreateChatRequest {
            creator_id: user.id,
            member_ids: body.member_ids,
            is_group: body.is_group,
            group_name: body.group_name,
        })
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(chat)))
}

/// `GET /api/chats` — the caller's chats, most recently active first.
pub async fn list_chats(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> GatewayResult<Json<Vec<Chat>>> {
    let user = authorize(&state, &headers).await?;
    let chats = state.chats.list_for_user(user.id).await?;
    Ok(Json(chats))
}

/// `GET /api/chats/:chat_id/messages` — history in insertion order.
/// Fetching history is an implicit read for the caller.
pub async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> GatewayResult<Json<Vec<Message>>> {
    let user = authorize(&state, &headers).await?;
    let messages = state
        .realtime
        .delivery
        .read_history(chat_id, user.id, query.limit.unwrap_or(0))
        .await?;
    Ok(Json(messages))
}

/// `POST /api/chats/:chat_id/messages` — persists and fans out a message,
/// same path the websocket `send_message` event takes.
pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
    Json(body): Json<SendMessageBody>,
) -> GatewayResult<impl IntoResponse> {
    let user = authorize(&state, &headers).await?;
    let message = state
        .realtime
        .delivery
        .send_message(user.id, chat_id, body.content, body.message_type, body.file_url)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn authorize(state: &GatewayState, headers: &HeaderMap) -> GatewayResult<AuthUser> {
    let token = bearer_token(headers)
        .ok_or_else(|| GatewayError::AuthenticationFailed("missing bearer token".to_string()))?;
    let (user, _session) = state.authenticator.authenticate_token(token).await?;
    Ok(user)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
