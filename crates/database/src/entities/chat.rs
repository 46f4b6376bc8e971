//! Chat entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: i64,
    pub public_id: String,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub last_message_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub creator_id: i64,
    /// Members besides the creator; the creator is always included.
    pub member_ids: Vec<i64>,
    pub is_group: bool,
    pub group_name: Option<String>,
}
