//! Entity definitions for the Courier data model

pub mod chat;
pub mod member;
pub mod message;
pub mod user;

pub use chat::{Chat, CreateChatRequest};
pub use member::ChatMember;
pub use message::{Message, MessageStatus, MessageType, NewMessage, SystemKind, SystemPayload};
pub use user::{PresenceStatus, User};
