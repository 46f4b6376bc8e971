//! Fan-out broadcaster.
//!
//! Each chat maps to a set of connection mailboxes. Delivery is
//! best-effort: a full or closed mailbox is skipped and logged, never
//! awaited, so one slow client cannot stall a broadcast.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;

#[derive(Default)]
pub struct BroadcastGroups {
    groups: RwLock<HashMap<i64, HashMap<Uuid, mpsc::Sender<ServerEvent>>>>,
}

impl BroadcastGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, chat_id: i64, connection_id: Uuid, sender: mpsc::Sender<ServerEvent>) {
        self.groups
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .insert(connection_id, sender);
    }

    pub async fn leave(&self, chat_id: i64, connection_id: Uuid) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(&chat_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                groups.remove(&chat_id);
            }
        }
    }

    /// Removes a connection from every group it joined. Called exactly once
    /// on disconnect.
    pub async fn leave_all(&self, connection_id: Uuid) {
        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Sends an event to every connection in the group. Returns how many
    /// mailboxes accepted it.
    pub async fn broadcast(&self, chat_id: i64, event: &ServerEvent) -> usize {
        self.broadcast_inner(chat_id, None, event).await
    }

    /// Like [`broadcast`](Self::broadcast), skipping one connection
    /// (typically the originator, who already has the result).
    pub async fn broadcast_except(
        &self,
        chat_id: i64,
        except: Uuid,
        event: &ServerEvent,
    ) -> usize {
        self.broadcast_inner(chat_id, Some(except), event).await
    }

    async fn broadcast_inner(
        &self,
        chat_id: i64,
        except: Option<Uuid>,
        event: &ServerEvent,
    ) -> usize {
        // Snapshot the roster so the sends happen outside the lock.
        let members: Vec<(Uuid, mpsc::Sender<ServerEvent>)> = {
            let groups = self.groups.read().await;
            let Some(members) = groups.get(&chat_id) else {
                return 0;
            };
            members
                .iter()
                .map(|(connection_id, sender)| (*connection_id, sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (connection_id, sender) in members {
            if Some(connection_id) == except {
                continue;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(chat_id, %connection_id, %err, "skipped connection during broadcast");
                }
            }
        }
        delivered
    }

    pub async fn group_size(&self, chat_id: i64) -> usize {
        self.groups
            .read()
            .await
            .get(&chat_id)
            .map_or(0, HashMap::len)
    }
}
