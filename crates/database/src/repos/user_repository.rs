//! User lookup and presence columns

use sqlx::SqlitePool;

use crate::entities::{PresenceStatus, User};
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, user_id: i64) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, public_id, display_name, email, status, last_seen, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Writes the durable presence columns. `last_seen` is only touched when
    /// the user goes offline, so it always records the end of a session.
    pub async fn set_presence(&self, user_id: i64, status: PresenceStatus) -> DatabaseResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        match status {
            PresenceStatus::Online => {
                sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(&now)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?;
            }
            PresenceStatus::Offline => {
                sqlx::query(
                    "UPDATE users SET status = ?, last_seen = ?, updated_at = ? WHERE id = ?",
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(&now)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_db, create_test_user};

    #[tokio::test]
    async fn set_presence_records_last_seen_only_when_going_offline() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_test_user(&pool, "alice").await;
        let repo = UserRepository::new(pool);

        repo.set_presence(alice, PresenceStatus::Online).await.unwrap();
        let user = repo.find_by_id(alice).await.unwrap().unwrap();
        assert_eq!(user.status, "online");
        assert!(user.last_seen.is_none());

        repo.set_presence(alice, PresenceStatus::Offline).await.unwrap();
        let user = repo.find_by_id(alice).await.unwrap().unwrap();
        assert_eq!(user.status, "offline");
        assert!(user.last_seen.is_some());
    }
}
