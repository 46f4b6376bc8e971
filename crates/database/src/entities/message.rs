//! Message entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub public_id: String,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub file_url: Option<String>,
    pub system_kind: Option<SystemKind>,
    /// JSON-encoded [`SystemPayload`], present only for system messages.
    pub system_payload: Option<String>,
    pub created_at: String,
}

impl Message {
    pub fn system_payload(&self) -> Option<SystemPayload> {
        self.system_payload
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub system_kind: Option<SystemKind>,
    pub system_payload: Option<SystemPayload>,
}

impl NewMessage {
    pub fn text(chat_id: i64, sender_id: i64, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id,
            content: content.into(),
            message_type: MessageType::Text,
            file_url: None,
            system_kind: None,
            system_payload: None,
        }
    }

    pub fn system(
        chat_id: i64,
        actor_id: i64,
        kind: SystemKind,
        payload: SystemPayload,
        content: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            sender_id: actor_id,
            content: content.into(),
            message_type: MessageType::System,
            file_url: None,
            system_kind: Some(kind),
            system_payload: Some(payload),
        }
    }
}

/// Delivery state of a message. The only legal transition is
/// `Delivered -> Read`; it is never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    System,
    File,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::System => "system",
            MessageType::File => "file",
            MessageType::Image => "image",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    MemberAdded,
    MemberRemoved,
    GroupCreated,
}

/// Structured body of a system message: who acted and on whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPayload {
    pub actor_id: i64,
    pub member_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_payload_round_trips_through_json() {
        let payload = SystemPayload {
            actor_id: 7,
            member_ids: vec![1, 2, 3],
        };
        let raw = serde_json::to_string(&payload).unwrap();

        let message = Message {
            id: 1,
            public_id: "m-1".into(),
            chat_id: 9,
            sender_id: 7,
            content: "members added".into(),
            message_type: MessageType::System,
            status: MessageStatus::Delivered,
            file_url: None,
            system_kind: Some(SystemKind::MemberAdded),
            system_payload: Some(raw),
            created_at: "2024-01-01T00:00:00Z".into(),
        };

        assert_eq!(message.system_payload(), Some(payload));
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Delivered).unwrap(),
            "\"delivered\""
        );
        assert_eq!(
            serde_json::to_string(&SystemKind::MemberAdded).unwrap(),
            "\"member_added\""
        );
    }
}
