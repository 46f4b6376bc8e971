//! Realtime websocket endpoint.
//!
//! Authentication happens before the upgrade: a bad token gets an HTTP
//! 401, never a websocket. After the upgrade the connection runs one
//! admission sequence, then processes inbound events sequentially so a
//! client's own events apply in the order it sent them.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use courier_core::{ClientEvent, CoreError, ServerEvent, SessionHandle};
use courier_database::PresenceStatus;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<WebSocketQuery>,
) -> Result<Response, GatewayError> {
    let token = query
        .token
        .ok_or_else(|| GatewayError::AuthenticationFailed("missing token".to_string()))?;
    let (user, _session) = state.authenticator.authenticate_token(&token).await?;

    info!(user = %user.public_id, "websocket authenticated");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, user_id: i64) {
    let rt = &state.realtime;

    let (tx, mut rx) = mpsc::channel(state.mailbox_capacity);
    let (handle, superseded) = rt.registry.admit(user_id, tx).await;
    if let Some(old) = superseded {
        let _ = old.sender.try_send(ServerEvent::SessionSuperseded);
        rt.groups.leave_all(old.connection_id).await;
    }

    // Join every room the user belongs to, then announce them online.
    let chat_ids = match rt.rooms.chat_ids_for_user(user_id).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(user_id, %err, "failed to load rooms on connect");
            Vec::new()
        }
    };
    for &chat_id in &chat_ids {
        rt.groups
            .join(chat_id, handle.connection_id, handle.sender.clone())
            .await;
    }
    if let Err(err) = rt.presence.mark_online(user_id).await {
        warn!(user_id, %err, "failed to persist online presence");
    }
    rt.presence
        .announce(&rt.groups, &chat_ids, user_id, PresenceStatus::Online, None)
        .await;

    let _ = handle.sender.try_send(ServerEvent::Hello {
        user_id,
        connection_id: handle.connection_id,
    });

    let (mut sink, mut stream) = socket.split();

    // Writer: drains the mailbox onto the socket. Closes the socket after
    // a supersession notice so the old client cannot linger half-attached.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let superseding = matches!(event, ServerEvent::SessionSuperseded);
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to serialize server event");
                    continue;
                }
            }
            if superseding {
                let _ = sink.close().await;
                break;
            }
        }
    });

    // Reader: events from this client apply strictly in order. Server
    // shutdown releases the loop so graceful shutdown never waits on a
    // client that keeps its socket open.
    let mut shutdown = rt.shutdown_watch();
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = shutdown.changed() => break,
        };
        let Some(Ok(frame)) = frame else { break };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(err) = handle_client_event(event, &state, user_id, &handle).await {
                        debug!(user_id, %err, "client event rejected");
                        let _ = handle.sender.try_send(ServerEvent::Error {
                            message: err.client_message(),
                        });
                    }
                }
                Err(err) => {
                    let _ = handle.sender.try_send(ServerEvent::Error {
                        message: format!("malformed event: {err}"),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Teardown runs once per connection. A connection that was superseded
    // must not tear down the newer session's state.
    if rt.registry.evict(user_id, handle.connection_id).await {
        rt.groups.leave_all(handle.connection_id).await;
        let last_seen = match rt.presence.mark_offline(user_id).await {
            Ok(last_seen) => last_seen,
            Err(err) => {
                warn!(user_id, %err, "failed to persist offline presence");
                None
            }
        };
        let rooms = rt.rooms.chat_ids_for_user(user_id).await.unwrap_or_default();
        rt.presence
            .announce(&rt.groups, &rooms, user_id, PresenceStatus::Offline, last_seen)
            .await;
        info!(user_id, "websocket disconnected");
    } else {
        rt.groups.leave_all(handle.connection_id).await;
        debug!(user_id, "superseded connection torn down");
    }

    send_task.abort();
}

async fn handle_client_event(
    event: ClientEvent,
    state: &GatewayState,
    user_id: i64,
    handle: &SessionHandle,
) -> Result<(), CoreError> {
    let rt = &state.realtime;
    match event {
        ClientEvent::Ping => {
            let _ = handle.sender.try_send(ServerEvent::Pong);
        }
        ClientEvent::JoinChat { chat_id } | ClientEvent::ChatCreated { chat_id } => {
            rt.membership.join_room(user_id, chat_id).await?;
            let _ = handle.sender.try_send(ServerEvent::Joined { chat_id });
        }
        ClientEvent::LeaveChat { chat_id } => {
            rt.groups.leave(chat_id, handle.connection_id).await;
            let _ = handle.sender.try_send(ServerEvent::Left { chat_id });
        }
        ClientEvent::SendMessage {
            chat_id,
            content,
            message_type,
            file_url,
        } => {
            rt.delivery
                .send_message(user_id, chat_id, content, message_type, file_url)
                .await?;
        }
        ClientEvent::MarkRead { chat_id } => {
            rt.delivery.mark_read(chat_id, user_id).await?;
        }
        ClientEvent::AddGroupMembers {
            chat_id,
            member_ids,
        } => {
            rt.membership
                .add_members(user_id, chat_id, &member_ids)
                .await?;
        }
        ClientEvent::RemoveGroupMember { chat_id, member_id } => {
            rt.membership
                .remove_member(user_id, chat_id, member_id)
                .await?;
        }
    }
    Ok(())
}
