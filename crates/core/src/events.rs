//! Wire events exchanged over a realtime connection.
//!
//! Both directions use tagged JSON: `{"type": "send_message", ...}`.

use courier_database::{Chat, Message, MessageType, PresenceStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events a connected client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
    JoinChat {
        chat_id: i64,
    },
    LeaveChat {
        chat_id: i64,
    },
    SendMessage {
        chat_id: i64,
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        file_url: Option<String>,
    },
    MarkRead {
        chat_id: i64,
    },
    AddGroupMembers {
        chat_id: i64,
        member_ids: Vec<i64>,
    },
    RemoveGroupMember {
        chat_id: i64,
        member_id: i64,
    },
    /// Sent by a client that learned about a new chat and wants its live
    /// session joined to the room.
    ChatCreated {
        chat_id: i64,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame after a successful upgrade.
    Hello {
        user_id: i64,
        connection_id: Uuid,
    },
    Pong,
    NewMessage {
        message: Message,
    },
    UserStatusUpdate {
        chat_id: i64,
        user_id: i64,
        status: PresenceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<String>,
    },
    MessagesRead {
        chat_id: i64,
        reader_id: i64,
        message_count: u64,
    },
    GroupMembersAdded {
        chat_id: i64,
        actor_id: i64,
        member_ids: Vec<i64>,
        message: Message,
    },
    GroupMemberRemoved {
        chat_id: i64,
        actor_id: i64,
        member_id: i64,
        message: Message,
    },
    ChatCreated {
        chat: Chat,
    },
    Joined {
        chat_id: i64,
    },
    Left {
        chat_id: i64,
    },
    /// A newer connection for the same user replaced this one; the server
    /// closes the socket right after sending this.
    SessionSuperseded,
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_tagged_json() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"send_message","chat_id":3,"content":"hi"}"#).unwrap();
        match event {
            ClientEvent::SendMessage {
                chat_id,
                content,
                message_type,
                file_url,
            } => {
                assert_eq!(chat_id, 3);
                assert_eq!(content, "hi");
                assert!(message_type.is_none());
                assert!(file_url.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn server_events_serialize_with_snake_case_tags() {
        let json = serde_json::to_value(ServerEvent::MessagesRead {
            chat_id: 4,
            reader_id: 9,
            message_count: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "messages_read");
        assert_eq!(json["message_count"], 2);

        let json = serde_json::to_value(ServerEvent::SessionSuperseded).unwrap();
        assert_eq!(json["type"], "session_superseded");
    }

    #[test]
    fn presence_updates_omit_last_seen_while_online() {
        let json = serde_json::to_value(ServerEvent::UserStatusUpdate {
            chat_id: 1,
            user_id: 2,
            status: PresenceStatus::Online,
            last_seen: None,
        })
        .unwrap();
        assert_eq!(json["status"], "online");
        assert!(json.get("last_seen").is_none());
    }
}
