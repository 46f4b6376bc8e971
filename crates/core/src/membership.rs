//! Membership synchronizer.
//!
//! Keeps three views of a chat roster in step: the membership rows, the
//! room cache, and the live broadcast groups. Every mutation lands in
//! the database first, then invalidates the cache, then adjusts live
//! sessions, so a crash can never leave the cache ahead of the store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use courier_database::{
    Chat, ChatRepository, CreateChatRequest, MemberRepository, Message, NewMessage, SystemKind,
    SystemPayload,
};
use tracing::info;

use crate::delivery::DeliveryService;
use crate::error::{CoreError, CoreResult};
use crate::events::ServerEvent;
use crate::groups::BroadcastGroups;
use crate::registry::SessionRegistry;
use crate::rooms::RoomCache;
use crate::with_store_timeout;

pub struct MembershipService {
    chats: ChatRepository,
    members: MemberRepository,
    rooms: Arc<RoomCache>,
    groups: Arc<BroadcastGroups>,
    registry: Arc<SessionRegistry>,
    delivery: Arc<DeliveryService>,
    store_timeout: Duration,
}

impl MembershipService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chats: ChatRepository,
        members: MemberRepository,
        rooms: Arc<RoomCache>,
        groups: Arc<BroadcastGroups>,
        registry: Arc<SessionRegistry>,
        delivery: Arc<DeliveryService>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            chats,
            members,
            rooms,
            groups,
            registry,
            delivery,
            store_timeout,
        }
    }

    /// Creates a chat (or resolves an existing private pair), joins every
    /// online member's live session to the room, and notifies them.
    pub async fn create_chat(&self, request: &CreateChatRequest) -> CoreResult<(Chat, bool)> {
        let (chat, created) = with_store_timeout(
            self.store_timeout,
            "membership.create_chat",
            self.chats.create(request),
        )
        .await?;

        if !created {
            return Ok((chat, false));
        }

        let roster = self.rooms.member_ids(chat.id).await?;
        for user_id in &roster {
            self.attach_live_session(chat.id, *user_id, Some(&chat)).await;
        }

        if chat.is_group {
            let payload = SystemPayload {
                actor_id: request.creator_id,
                member_ids: roster.clone(),
            };
            self.delivery
                .send_system(NewMessage::system(
                    chat.id,
                    request.creator_id,
                    SystemKind::GroupCreated,
                    payload,
                    "group created",
                ))
                .await?;
        }

        info!(chat_id = chat.id, is_group = chat.is_group, "chat created");
        Ok((chat, true))
    }

    /// Adds users to a group chat. Returns the ids actually added and the
    /// system message recording the change.
    pub async fn add_members(
        &self,
        actor_id: i64,
        chat_id: i64,
        member_ids: &[i64],
    ) -> CoreResult<(Vec<i64>, Message)> {
        let chat = self.require_group(chat_id).await?;
        self.require_actor(chat_id, actor_id).await?;

        let roster: BTreeSet<i64> = self.rooms.member_ids(chat_id).await?.into_iter().collect();
        let added: Vec<i64> = member_ids
            .iter()
            .copied()
            .collect::<BTreeSet<i64>>()
            .into_iter()
            .filter(|id| !roster.contains(id))
            .collect();

        if added.is_empty() {
            return Err(CoreError::NoOp(
                "all listed users are already members".into(),
            ));
        }

        with_store_timeout(
            self.store_timeout,
            "membership.add_members",
            self.members.add_members(chat_id, &added),
        )
        .await?;
        self.rooms.invalidate(chat_id).await;

        for user_id in &added {
            self.attach_live_session(chat_id, *user_id, Some(&chat)).await;
        }

        let message = self
            .delivery
            .send_system(NewMessage::system(
                chat_id,
                actor_id,
                SystemKind::MemberAdded,
                SystemPayload {
                    actor_id,
                    member_ids: added.clone(),
                },
                "members added",
            ))
            .await?;

        self.groups
            .broadcast(
                chat_id,
                &ServerEvent::GroupMembersAdded {
                    chat_id,
                    actor_id,
                    member_ids: added.clone(),
                    message: message.clone(),
                },
            )
            .await;

        info!(chat_id, actor_id, added = added.len(), "group members added");
        Ok((added, message))
    }

    /// Removes one user from a group chat. Removing yourself is leaving.
    pub async fn remove_member(
        &self,
        actor_id: i64,
        chat_id: i64,
        member_id: i64,
    ) -> CoreResult<Message> {
        self.require_group(chat_id).await?;
        self.require_actor(chat_id, actor_id).await?;

        let removed = with_store_timeout(
            self.store_timeout,
            "membership.remove_member",
            self.members.remove_member(chat_id, member_id),
        )
        .await?;
        if !removed {
            return Err(CoreError::NoOp("user is not a member".into()));
        }
        self.rooms.invalidate(chat_id).await;

        // Detach the removed user's live session before the announcement so
        // they do not receive room traffic they are no longer entitled to.
        if let Some(handle) = self.registry.get(member_id).await {
            self.groups.leave(chat_id, handle.connection_id).await;
            let _ = handle.sender.try_send(ServerEvent::Left { chat_id });
        }

        let message = self
            .delivery
            .send_system(NewMessage::system(
                chat_id,
                actor_id,
                SystemKind::MemberRemoved,
                SystemPayload {
                    actor_id,
                    member_ids: vec![member_id],
                },
                "member removed",
            ))
            .await?;

        self.groups
            .broadcast(
                chat_id,
                &ServerEvent::GroupMemberRemoved {
                    chat_id,
                    actor_id,
                    member_id,
                    message: message.clone(),
                },
            )
            .await;

        info!(chat_id, actor_id, member_id, "group member removed");
        Ok(message)
    }

    /// Joins a member's live session to a room. A registered user who is
    /// offline is skipped; a non-member is rejected.
    pub async fn join_room(&self, user_id: i64, chat_id: i64) -> CoreResult<()> {
        self.require_member(chat_id, user_id).await?;
        self.attach_live_session(chat_id, user_id, None).await;
        Ok(())
    }

    async fn attach_live_session(&self, chat_id: i64, user_id: i64, announce: Option<&Chat>) {
        let Some(handle) = self.registry.get(user_id).await else {
            return;
        };
        self.groups
            .join(chat_id, handle.connection_id, handle.sender.clone())
            .await;
        if let Some(chat) = announce {
            let _ = handle
                .sender
                .try_send(ServerEvent::ChatCreated { chat: chat.clone() });
        }
    }

    async fn require_group(&self, chat_id: i64) -> CoreResult<Chat> {
        let chat = with_store_timeout(
            self.store_timeout,
            "membership.find_chat",
            self.chats.find_by_id(chat_id),
        )
        .await?
        .ok_or(CoreError::ChatNotFound(chat_id))?;

        if !chat.is_group {
            return Err(CoreError::NotAuthorized(
                "membership of a private chat cannot change".into(),
            ));
        }
        Ok(chat)
    }

    async fn require_member(&self, chat_id: i64, user_id: i64) -> CoreResult<()> {
        if self.rooms.is_member(chat_id, user_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotAMember { chat_id, user_id })
        }
    }

    /// Roster mutations demand a member actor; outsiders are not authorized.
    async fn require_actor(&self, chat_id: i64, actor_id: i64) -> CoreResult<()> {
        if self.rooms.is_member(chat_id, actor_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotAuthorized(
                "only current members may change the roster".into(),
            ))
        }
    }
}
