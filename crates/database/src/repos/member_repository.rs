//! Chat membership reads and writes

use sqlx::SqlitePool;

use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct MemberRepository {
    pool: SqlitePool,
}

impl MemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn member_ids(&self, chat_id: i64) -> DatabaseResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY user_id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn is_member(&self, chat_id: i64, user_id: i64) -> DatabaseResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_members WHERE chat_id = ? AND user_id = ?",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn chat_ids_for_user(&self, user_id: i64) -> DatabaseResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT chat_id FROM chat_members WHERE user_id = ? ORDER BY chat_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Inserts the given users into a chat and bumps the chat's `updated_at`,
    /// all in one transaction. Callers are expected to have filtered out
    /// existing members already.
    pub async fn add_members(&self, chat_id: i64, user_ids: &[i64]) -> DatabaseResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for user_id in user_ids {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Removes one user from a chat. Returns `false` when no membership row
    /// existed, in which case `updated_at` is left untouched.
    pub async fn remove_member(&self, chat_id: i64, user_id: i64) -> DatabaseResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_chat, create_test_db, create_test_user};

    #[tokio::test]
    async fn add_members_extends_the_roster() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let carol = create_test_user(&pool, "carol").await;
        let chat = create_test_chat(&pool, true, &[alice, bob]).await;
        let repo = MemberRepository::new(pool);

        repo.add_members(chat, &[carol]).await.unwrap();

        assert_eq!(repo.member_ids(chat).await.unwrap(), vec![alice, bob, carol]);
        assert!(repo.is_member(chat, carol).await.unwrap());
    }

    #[tokio::test]
    async fn remove_member_reports_missing_rows() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let chat = create_test_chat(&pool, true, &[alice, bob]).await;
        let repo = MemberRepository::new(pool);

        assert!(repo.remove_member(chat, bob).await.unwrap());
        assert!(!repo.remove_member(chat, bob).await.unwrap());
        assert_eq!(repo.member_ids(chat).await.unwrap(), vec![alice]);
    }

    #[tokio::test]
    async fn chat_ids_for_user_lists_every_room() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let first = create_test_chat(&pool, true, &[alice, bob]).await;
        let second = create_test_chat(&pool, true, &[alice]).await;
        let repo = MemberRepository::new(pool);

        assert_eq!(repo.chat_ids_for_user(alice).await.unwrap(), vec![first, second]);
        assert_eq!(repo.chat_ids_for_user(bob).await.unwrap(), vec![first]);
    }
}
