//! Session-token authentication for Courier.
//!
//! Tokens are opaque strings stored in the `sessions` table. Realtime
//! connections present one as a query parameter before the websocket
//! upgrade; expired rows are deleted on first use.

use chrono::{DateTime, Duration, Utc};
use courier_config::AuthConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const SESSION_TOKEN_LEN: usize = 48;

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
    #[error("user not found")]
    UserNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: &AuthConfig) -> Self {
        Self {
            pool,
            session_ttl: Duration::seconds(config.session_ttl_seconds as i64),
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Registers a user and returns the new row.
    pub async fn register_user(
        &self,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<AuthUser, AuthError> {
        let now = Utc::now().to_rfc3339();
        let public_id = Uuid::new_v4().to_string();

        let id = sqlx::query(
            "INSERT INTO users (public_id, display_name, email, status, created_at, updated_at)
             VALUES (?, ?, ?, 'offline', ?, ?)",
        )
        .bind(&public_id)
        .bind(display_name)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(AuthUser {
            id,
            public_id,
            display_name: display_name.map(str::to_owned),
            email: email.map(str::to_owned),
        })
    }

    /// Validates a session token. Expired sessions are deleted on sight so
    /// the table does not accumulate dead rows.
    pub async fn authenticate_token(
        &self,
        token: &str,
    ) -> Result<(AuthUser, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.fetch_user(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        debug!(user = %user.public_id, "authenticated session token");
        Ok((user, session))
    }

    pub async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    async fn fetch_user(&self, id: i64) -> Result<AuthUser, AuthError> {
        let row = sqlx::query("SELECT id, public_id, display_name, email FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(AuthUser {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
        })
    }
}

fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::AuthConfig;
    use courier_database::test_utils::create_test_db;

    fn authenticator(pool: SqlitePool) -> Authenticator {
        Authenticator::new(pool, &AuthConfig::default())
    }

    #[tokio::test]
    async fn issued_tokens_authenticate_back_to_the_user() {
        let (pool, _dir) = create_test_db().await;
        let auth = authenticator(pool);

        let user = auth.register_user(Some("alice"), None).await.unwrap();
        let session = auth.issue_session(user.id).await.unwrap();

        let (resolved, resolved_session) =
            auth.authenticate_token(&session.token).await.unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved_session.user_id, user.id);
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let (pool, _dir) = create_test_db().await;
        let auth = authenticator(pool);

        let result = auth.authenticate_token("no-such-token").await;
        assert!(matches!(result, Err(AuthError::SessionNotFound)));
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_removed() {
        let (pool, _dir) = create_test_db().await;
        let auth = authenticator(pool.clone());

        let user = auth.register_user(Some("bob"), None).await.unwrap();
        let expired = Utc::now() - Duration::seconds(60);
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind("stale-token")
        .bind(user.id)
        .bind(expired.to_rfc3339())
        .bind(expired.to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let result = auth.authenticate_token("stale-token").await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));

        // The row is gone, so a retry reports not-found.
        let result = auth.authenticate_token("stale-token").await;
        assert!(matches!(result, Err(AuthError::SessionNotFound)));
    }
}
