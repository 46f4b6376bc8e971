//! Message persistence and read-state transitions

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::{Message, NewMessage};
use crate::types::{DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a message in the `delivered` state and bumps the parent
    /// chat's `last_message_id` and `updated_at` in the same transaction,
    /// so the chat list preview can never point at a missing message.
    pub async fn create(&self, new: &NewMessage) -> DatabaseResult<Message> {
        let now = chrono::Utc::now().to_rfc3339();
        let public_id = Uuid::new_v4().to_string();
        let payload = new
            .system_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            "INSERT INTO messages
                 (public_id, chat_id, sender_id, content, message_type, status,
                  file_url, system_kind, system_payload, created_at)
             VALUES (?, ?, ?, ?, ?, 'delivered', ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(new.chat_id)
        .bind(new.sender_id)
        .bind(&new.content)
        .bind(new.message_type)
        .bind(&new.file_url)
        .bind(new.system_kind)
        .bind(&payload)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE chats SET last_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(message_id)
            .bind(&now)
            .bind(new.chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(message_id)
            .await?
            .ok_or(DatabaseError::MessageNotFound(message_id))
    }

    pub async fn find_by_id(&self, message_id: i64) -> DatabaseResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT id, public_id, chat_id, sender_id, content, message_type, status,
                    file_url, system_kind, system_payload, created_at
             FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    /// Chat history in insertion order. `limit = 0` means no limit.
    pub async fn list_by_chat(&self, chat_id: i64, limit: i64) -> DatabaseResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, public_id, chat_id, sender_id, content, message_type, status,
                    file_url, system_kind, system_payload, created_at
             FROM messages
             WHERE chat_id = ?
             ORDER BY id ASC
             LIMIT CASE WHEN ? > 0 THEN ? ELSE -1 END",
        )
        .bind(chat_id)
        .bind(limit)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Flips every unread message in a chat that the reader did not send
    /// themselves to `read`, in a single statement. Returns how many rows
    /// actually changed, so repeated calls report zero.
    pub async fn mark_read(&self, chat_id: i64, reader_id: i64) -> DatabaseResult<u64> {
        let updated = sqlx::query(
            "UPDATE messages SET status = 'read'
             WHERE chat_id = ? AND status != 'read' AND sender_id != ?",
        )
        .bind(chat_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MessageStatus;
    use crate::test_utils::{create_test_chat, create_test_db, create_test_user};

    #[tokio::test]
    async fn create_bumps_chat_preview_in_the_same_transaction() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let chat = create_test_chat(&pool, false, &[alice, bob]).await;
        let repo = MessageRepository::new(pool.clone());

        let message = repo
            .create(&NewMessage::text(chat, alice, "hello"))
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);

        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_message_id FROM chats WHERE id = ?")
                .bind(chat)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(last, Some(message.id));
    }

    #[tokio::test]
    async fn mark_read_skips_own_messages_and_is_idempotent() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let chat = create_test_chat(&pool, false, &[alice, bob]).await;
        let repo = MessageRepository::new(pool);

        repo.create(&NewMessage::text(chat, alice, "one")).await.unwrap();
        repo.create(&NewMessage::text(chat, alice, "two")).await.unwrap();
        repo.create(&NewMessage::text(chat, bob, "reply")).await.unwrap();

        // Bob reads: only Alice's two messages flip.
        assert_eq!(repo.mark_read(chat, bob).await.unwrap(), 2);
        assert_eq!(repo.mark_read(chat, bob).await.unwrap(), 0);

        let history = repo.list_by_chat(chat, 0).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].status, MessageStatus::Read);
        assert_eq!(history[1].status, MessageStatus::Read);
        // Bob's own message stays delivered until Alice reads it.
        assert_eq!(history[2].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn history_is_returned_in_insertion_order() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let chat = create_test_chat(&pool, true, &[alice]).await;
        let repo = MessageRepository::new(pool);

        for body in ["first", "second", "third"] {
            repo.create(&NewMessage::text(chat, alice, body)).await.unwrap();
        }

        let history = repo.list_by_chat(chat, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }
}
