//! Test utilities shared by the Courier crates

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use crate::migrations::MIGRATOR;

/// Creates a migrated throwaway database. The [`TempDir`] must be kept alive
/// for as long as the pool is used.
pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let connect_options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Memory)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(connect_options)
        .await
        .expect("Failed to create test database");

    MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    (pool, temp_dir)
}

/// Inserts a user and returns its row id.
pub async fn create_test_user(pool: &SqlitePool, display_name: &str) -> i64 {
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (public_id, display_name, email, status, created_at, updated_at)
         VALUES (?, ?, ?, 'offline', ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(display_name)
    .bind(format!("{display_name}@example.com"))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to insert test user")
    .last_insert_rowid()
}

/// Inserts a chat with the given member roster and returns its row id.
pub async fn create_test_chat(pool: &SqlitePool, is_group: bool, member_ids: &[i64]) -> i64 {
    let now = chrono::Utc::now().to_rfc3339();

    let chat_id = sqlx::query(
        "INSERT INTO chats (public_id, is_group, group_name, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(is_group)
    .bind(is_group.then(|| "test group".to_string()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to insert test chat")
    .last_insert_rowid();

    for user_id in member_ids {
        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(chat_id)
            .bind(user_id)
            .bind(&now)
            .execute(pool)
            .await
            .expect("Failed to insert test chat member");
    }

    chat_id
}

/// Inserts a delivered text message and returns its row id.
pub async fn create_test_message(
    pool: &SqlitePool,
    chat_id: i64,
    sender_id: i64,
    content: &str,
) -> i64 {
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO messages
             (public_id, chat_id, sender_id, content, message_type, status, created_at)
         VALUES (?, ?, ?, ?, 'text', 'delivered', ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to insert test message")
    .last_insert_rowid()
}

/// Inserts a session row and returns the token.
pub async fn create_test_session(pool: &SqlitePool, user_id: i64) -> String {
    let token = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    let expires = now + chrono::Duration::hours(1);

    sqlx::query("INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(expires.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(pool)
        .await
        .expect("Failed to insert test session");

    token
}
