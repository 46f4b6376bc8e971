//! Live session registry.
//!
//! Tracks at most one live transport per user. Admitting a second
//! connection for the same user supersedes the first; the superseded
//! handle is returned so the caller can notify and close it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;

/// A user's live transport: the write half of their connection mailbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub connection_id: Uuid,
    pub sender: mpsc::Sender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

impl SessionHandle {
    fn new(sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            sender,
            connected_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection as the user's live session. Returns the new
    /// handle plus the previous one when this admission superseded it.
    pub async fn admit(
        &self,
        user_id: i64,
        sender: mpsc::Sender<ServerEvent>,
    ) -> (SessionHandle, Option<SessionHandle>) {
        let handle = SessionHandle::new(sender);
        let superseded = self
            .sessions
            .write()
            .await
            .insert(user_id, handle.clone());
        if superseded.is_some() {
            debug!(user_id, "new connection superseded an existing session");
        }
        (handle, superseded)
    }

    /// Removes the user's session, but only if it is still the given
    /// connection. A disconnect racing a fresh admission must not evict
    /// the newer session.
    pub async fn evict(&self, user_id: i64, connection_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&user_id) {
            Some(current) if current.connection_id == connection_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<SessionHandle> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Empties the registry, handing back every live handle. Used on
    /// shutdown to close connections cleanly.
    pub async fn drain(&self) -> Vec<(i64, SessionHandle)> {
        self.sessions.write().await.drain().collect()
    }
}
