//! Chat creation and lookup

use std::collections::BTreeSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::{Chat, CreateChatRequest};
use crate::types::{DatabaseError, DatabaseResult};

#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a chat together with its initial member rows.
    ///
    /// Private chats are deduplicated on their unordered member pair: the
    /// canonical pair key carries a UNIQUE constraint, so even two racing
    /// creates for the same pair resolve to one row and the loser gets the
    /// existing chat back. The returned flag is `true` when a new row was
    /// actually created.
    pub async fn create(&self, request: &CreateChatRequest) -> DatabaseResult<(Chat, bool)> {
        let mut member_ids: BTreeSet<i64> = request.member_ids.iter().copied().collect();
        member_ids.insert(request.creator_id);

        let pair_key = if request.is_group {
            None
        } else {
            if member_ids.len() != 2 {
                return Err(DatabaseError::InvalidMembers(format!(
                    "private chat requires exactly 2 distinct members, got {}",
                    member_ids.len()
                )));
            }
            let mut pair = member_ids.iter();
            let (a, b) = (*pair.next().unwrap_or(&0), *pair.next().unwrap_or(&0));
            Some(format!("{a}:{b}"))
        };

        let now = chrono::Utc::now().to_rfc3339();
        let public_id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO chats (public_id, is_group, group_name, pair_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (pair_key) DO NOTHING",
        )
        .bind(&public_id)
        .bind(request.is_group)
        .bind(&request.group_name)
        .bind(&pair_key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // A conflict means this pair already has a chat, possibly committed
        // by a concurrent create a moment ago.
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            let key = pair_key.as_deref().unwrap_or_default();
            return match self.find_by_pair_key(key).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(DatabaseError::InvalidMembers(format!(
                    "no chat found for pair {key}"
                ))),
            };
        }

        let chat_id = inserted.last_insert_rowid();

        for user_id in &member_ids {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let chat = self
            .find_by_id(chat_id)
            .await?
            .ok_or(DatabaseError::ChatNotFound(chat_id))?;
        Ok((chat, true))
    }

    pub async fn find_by_id(&self, chat_id: i64) -> DatabaseResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, public_id, is_group, group_name, last_message_id, created_at, updated_at
             FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }

    /// Chats the user belongs to, most recently active first.
    pub async fn list_for_user(&self, user_id: i64) -> DatabaseResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT c.id, c.public_id, c.is_group, c.group_name, c.last_message_id,
                    c.created_at, c.updated_at
             FROM chats c
             JOIN chat_members m ON m.chat_id = c.id
             WHERE m.user_id = ?
             ORDER BY c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chats)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> DatabaseResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, public_id, is_group, group_name, last_message_id, created_at, updated_at
             FROM chats WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }

    async fn find_by_pair_key(&self, pair_key: &str) -> DatabaseResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, public_id, is_group, group_name, last_message_id, created_at, updated_at
             FROM chats WHERE pair_key = ?",
        )
        .bind(pair_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_db, create_test_user};

    #[tokio::test]
    async fn private_chat_is_deduplicated_on_unordered_pair() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let repo = ChatRepository::new(pool);

        let (first, created) = repo
            .create(&CreateChatRequest {
                creator_id: alice,
                member_ids: vec![bob],
                is_group: false,
                group_name: None,
            })
            .await
            .unwrap();
        assert!(created);

        // Reversed order must resolve to the same chat.
        let (second, created) = repo
            .create(&CreateChatRequest {
                creator_id: bob,
                member_ids: vec![alice],
                is_group: false,
                group_name: None,
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn racing_private_creates_collapse_to_one_chat() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let repo = ChatRepository::new(pool);

        let forward = CreateChatRequest {
            creator_id: alice,
            member_ids: vec![bob],
            is_group: false,
            group_name: None,
        };
        let reverse = CreateChatRequest {
            creator_id: bob,
            member_ids: vec![alice],
            is_group: false,
            group_name: None,
        };

        let (first, second) = tokio::join!(repo.create(&forward), repo.create(&reverse));
        let (first, first_created) = first.unwrap();
        let (second, second_created) = second.unwrap();

        assert_eq!(first.id, second.id);
        // Exactly one of the two actually inserted a row.
        assert_ne!(first_created, second_created);
    }

    #[tokio::test]
    async fn private_chat_rejects_wrong_member_count() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let repo = ChatRepository::new(pool);

        let result = repo
            .create(&CreateChatRequest {
                creator_id: alice,
                member_ids: vec![],
                is_group: false,
                group_name: None,
            })
            .await;
        assert!(matches!(result, Err(DatabaseError::InvalidMembers(_))));
    }

    #[tokio::test]
    async fn group_chats_are_never_deduplicated() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let repo = ChatRepository::new(pool);

        let request = CreateChatRequest {
            creator_id: alice,
            member_ids: vec![bob],
            is_group: true,
            group_name: Some("team".into()),
        };
        let (first, _) = repo.create(&request).await.unwrap();
        let (second, created) = repo.create(&request).await.unwrap();
        assert!(created);
        assert_ne!(first.id, second.id);
    }
}
