//! Delivery state machine.
//!
//! A message is persisted as `delivered` before anything is fanned out,
//! so a crash between the write and the broadcast loses pushes, never
//! messages. Reads are implicit: fetching history or sending `mark_read`
//! flips every unread message from other senders in one statement.

use std::sync::Arc;
use std::time::Duration;

use courier_database::{Message, MessageRepository, MessageType, NewMessage};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::events::ServerEvent;
use crate::groups::BroadcastGroups;
use crate::rooms::RoomCache;
use crate::with_store_timeout;

pub struct DeliveryService {
    messages: MessageRepository,
    rooms: Arc<RoomCache>,
    groups: Arc<BroadcastGroups>,
    store_timeout: Duration,
}

impl DeliveryService {
    pub fn new(
        messages: MessageRepository,
        rooms: Arc<RoomCache>,
        groups: Arc<BroadcastGroups>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            rooms,
            groups,
            store_timeout,
        }
    }

    /// Persists a message from a member and fans it out to the room.
    pub async fn send_message(
        &self,
        sender_id: i64,
        chat_id: i64,
        content: String,
        message_type: Option<MessageType>,
        file_url: Option<String>,
    ) -> CoreResult<Message> {
        if content.trim().is_empty() {
            return Err(CoreError::InvalidInput("message content is empty".into()));
        }
        self.require_member(chat_id, sender_id).await?;

        let mut new = NewMessage::text(chat_id, sender_id, content);
        if let Some(message_type) = message_type {
            new.message_type = message_type;
        }
        new.file_url = file_url;

        self.persist_and_broadcast(new).await
    }

    /// Persists a server-generated system message and fans it out. Callers
    /// authorize the actor themselves.
    pub async fn send_system(&self, new: NewMessage) -> CoreResult<Message> {
        self.persist_and_broadcast(new).await
    }

    /// Marks every unread message from other senders as read. Broadcasts a
    /// `messages_read` receipt only when something actually changed, so
    /// repeated calls are silent.
    pub async fn mark_read(&self, chat_id: i64, reader_id: i64) -> CoreResult<u64> {
        self.require_member(chat_id, reader_id).await?;

        let changed = with_store_timeout(
            self.store_timeout,
            "delivery.mark_read",
            self.messages.mark_read(chat_id, reader_id),
        )
        .await?;

        if changed > 0 {
            debug!(chat_id, reader_id, changed, "messages marked read");
            self.groups
                .broadcast(
                    chat_id,
                    &ServerEvent::MessagesRead {
                        chat_id,
                        reader_id,
                        message_count: changed,
                    },
                )
                .await;
        }
        Ok(changed)
    }

    /// Chat history for a member. Fetching history is an implicit read:
    /// unread messages from other senders flip to `read` first, so the
    /// returned page already carries the new states.
    pub async fn read_history(
        &self,
        chat_id: i64,
        reader_id: i64,
        limit: i64,
    ) -> CoreResult<Vec<Message>> {
        self.mark_read(chat_id, reader_id).await?;
        let history = with_store_timeout(
            self.store_timeout,
            "delivery.history",
            self.messages.list_by_chat(chat_id, limit),
        )
        .await?;
        Ok(history)
    }

    async fn persist_and_broadcast(&self, new: NewMessage) -> CoreResult<Message> {
        let chat_id = new.chat_id;
        let message = with_store_timeout(
            self.store_timeout,
            "delivery.create",
            self.messages.create(&new),
        )
        .await?;

        let delivered = self
            .groups
            .broadcast(
                chat_id,
                &ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;
        info!(chat_id, message_id = message.id, delivered, "message fanned out");
        Ok(message)
    }

    async fn require_member(&self, chat_id: i64, user_id: i64) -> CoreResult<()> {
        if self.rooms.is_member(chat_id, user_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotAMember { chat_id, user_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_database::test_utils::{create_test_chat, create_test_db, create_test_user};
    use courier_database::{MemberRepository, MessageStatus};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    async fn delivery_fixture() -> (DeliveryService, Arc<BroadcastGroups>, i64, i64, i64) {
        let (pool, dir) = create_test_db().await;
        // Leak the tempdir so the pool outlives this helper.
        std::mem::forget(dir);

        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let chat = create_test_chat(&pool, false, &[alice, bob]).await;

        let groups = Arc::new(BroadcastGroups::new());
        let rooms = Arc::new(RoomCache::new(MemberRepository::new(pool.clone())));
        let delivery = DeliveryService::new(
            MessageRepository::new(pool),
            rooms,
            Arc::clone(&groups),
            Duration::from_secs(5),
        );
        (delivery, groups, chat, alice, bob)
    }

    #[tokio::test]
    async fn send_message_persists_then_fans_out() {
        let (delivery, groups, chat, alice, _bob) = delivery_fixture().await;
        let (tx, mut rx) = mpsc::channel(8);
        groups.join(chat, Uuid::new_v4(), tx).await;

        let message = delivery
            .send_message(alice, chat, "hello".into(), None, None)
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);

        match rx.try_recv() {
            Ok(ServerEvent::NewMessage { message: pushed }) => assert_eq!(pushed.id, message.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_members_cannot_send() {
        let (delivery, _groups, chat, _alice, _bob) = delivery_fixture().await;
        let result = delivery
            .send_message(9999, chat, "intruder".into(), None, None)
            .await;
        assert!(matches!(result, Err(CoreError::NotAMember { .. })));
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_any_write() {
        let (delivery, _groups, chat, alice, _bob) = delivery_fixture().await;
        let result = delivery
            .send_message(alice, chat, "   ".into(), None, None)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn mark_read_broadcasts_once_then_goes_silent() {
        let (delivery, groups, chat, alice, bob) = delivery_fixture().await;
        delivery
            .send_message(alice, chat, "hi".into(), None, None)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        groups.join(chat, Uuid::new_v4(), tx).await;

        assert_eq!(delivery.mark_read(chat, bob).await.unwrap(), 1);
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::MessagesRead { .. })));

        // Second call changes nothing and broadcasts nothing.
        assert_eq!(delivery.mark_read(chat, bob).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn history_fetch_is_an_implicit_read() {
        let (delivery, _groups, chat, alice, bob) = delivery_fixture().await;
        delivery
            .send_message(alice, chat, "one".into(), None, None)
            .await
            .unwrap();
        delivery
            .send_message(bob, chat, "two".into(), None, None)
            .await
            .unwrap();

        let history = delivery.read_history(chat, bob, 0).await.unwrap();
        assert_eq!(history.len(), 2);
        // Alice's message flipped for Bob; Bob's own stays delivered.
        assert_eq!(history[0].status, MessageStatus::Read);
        assert_eq!(history[1].status, MessageStatus::Delivered);
    }
}
