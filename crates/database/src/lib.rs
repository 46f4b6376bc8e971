//! SQLite persistence for Courier: schema, entities, and repositories.

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod test_utils;
pub mod types;

pub use connection::prepare_database;
pub use entities::{
    Chat, ChatMember, CreateChatRequest, Message, MessageStatus, MessageType, NewMessage,
    PresenceStatus, SystemKind, SystemPayload, User,
};
pub use migrations::{run_migrations, MIGRATOR};
pub use repos::{ChatRepository, MemberRepository, MessageRepository, UserRepository};
pub use types::{DatabaseError, DatabaseResult};

use anyhow::Result;
use courier_config::DatabaseConfig;
use sqlx::SqlitePool;

/// Opens the configured database and brings the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = prepare_database(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
