//! Presence tracker.
//!
//! Durable presence lives in the `users` table (`status`, `last_seen`);
//! announcements fan out only to the rooms the user belongs to, so
//! strangers never learn about each other's sessions.

use std::time::Duration;

use courier_database::{PresenceStatus, UserRepository};
use tracing::info;

use crate::error::CoreResult;
use crate::events::ServerEvent;
use crate::groups::BroadcastGroups;
use crate::with_store_timeout;

pub struct PresenceTracker {
    users: UserRepository,
    store_timeout: Duration,
}

impl PresenceTracker {
    pub fn new(users: UserRepository, store_timeout: Duration) -> Self {
        Self {
            users,
            store_timeout,
        }
    }

    pub async fn mark_online(&self, user_id: i64) -> CoreResult<()> {
        with_store_timeout(
            self.store_timeout,
            "presence.online",
            self.users.set_presence(user_id, PresenceStatus::Online),
        )
        .await?;
        info!(user_id, "user online");
        Ok(())
    }

    /// Flips the user offline and returns the recorded `last_seen`.
    pub async fn mark_offline(&self, user_id: i64) -> CoreResult<Option<String>> {
        with_store_timeout(
            self.store_timeout,
            "presence.offline",
            self.users.set_presence(user_id, PresenceStatus::Offline),
        )
        .await?;

        let user = with_store_timeout(
            self.store_timeout,
            "presence.fetch",
            self.users.find_by_id(user_id),
        )
        .await?;

        info!(user_id, "user offline");
        Ok(user.and_then(|user| user.last_seen))
    }

    /// Announces a presence change to every given room.
    pub async fn announce(
        &self,
        groups: &BroadcastGroups,
        chat_ids: &[i64],
        user_id: i64,
        status: PresenceStatus,
        last_seen: Option<String>,
    ) {
        for &chat_id in chat_ids {
            groups
                .broadcast(
                    chat_id,
                    &ServerEvent::UserStatusUpdate {
                        chat_id,
                        user_id,
                        status,
                        last_seen: last_seen.clone(),
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_database::test_utils::{create_test_db, create_test_user};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn offline_transition_reports_last_seen() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let presence = PresenceTracker::new(
            UserRepository::new(pool),
            Duration::from_secs(5),
        );

        presence.mark_online(alice).await.unwrap();
        let last_seen = presence.mark_offline(alice).await.unwrap();
        assert!(last_seen.is_some());
    }

    #[tokio::test]
    async fn announcements_stay_scoped_to_shared_rooms() {
        let groups = BroadcastGroups::new();
        let (member_tx, mut member_rx) = mpsc::channel(8);
        let (stranger_tx, mut stranger_rx) = mpsc::channel(8);
        groups.join(1, Uuid::new_v4(), member_tx).await;
        groups.join(2, Uuid::new_v4(), stranger_tx).await;

        let (pool, _dir) = create_test_db().await;
        let presence = PresenceTracker::new(
            UserRepository::new(pool),
            Duration::from_secs(5),
        );

        presence
            .announce(&groups, &[1], 42, PresenceStatus::Online, None)
            .await;

        match member_rx.try_recv() {
            Ok(ServerEvent::UserStatusUpdate {
                chat_id, user_id, ..
            }) => {
                assert_eq!(chat_id, 1);
                assert_eq!(user_id, 42);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(stranger_rx.try_recv().is_err());
    }
}
