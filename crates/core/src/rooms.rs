//! Room membership cache.
//!
//! Read-through cache of chat rosters, so the hot paths (membership
//! checks on every inbound event) do not hit the database each time.
//! Membership writes invalidate the affected chat.

use std::collections::{HashMap, HashSet};

use courier_database::MemberRepository;
use tokio::sync::RwLock;

use crate::error::CoreResult;

pub struct RoomCache {
    members: MemberRepository,
    cache: RwLock<HashMap<i64, HashSet<i64>>>,
}

impl RoomCache {
    pub fn new(members: MemberRepository) -> Self {
        Self {
            members,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn member_ids(&self, chat_id: i64) -> CoreResult<Vec<i64>> {
        let roster = self.roster(chat_id).await?;
        let mut ids: Vec<i64> = roster.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn is_member(&self, chat_id: i64, user_id: i64) -> CoreResult<bool> {
        Ok(self.roster(chat_id).await?.contains(&user_id))
    }

    /// Chats a user belongs to. Not cached: this is only needed on connect
    /// and disconnect, not per event.
    pub async fn chat_ids_for_user(&self, user_id: i64) -> CoreResult<Vec<i64>> {
        Ok(self.members.chat_ids_for_user(user_id).await?)
    }

    /// Drops the cached roster for a chat. Callers must invalidate after
    /// every membership write so the next read sees the new roster.
    pub async fn invalidate(&self, chat_id: i64) {
        self.cache.write().await.remove(&chat_id);
    }

    async fn roster(&self, chat_id: i64) -> CoreResult<HashSet<i64>> {
        if let Some(roster) = self.cache.read().await.get(&chat_id) {
            return Ok(roster.clone());
        }

        let ids: HashSet<i64> = self.members.member_ids(chat_id).await?.into_iter().collect();
        self.cache.write().await.insert(chat_id, ids.clone());
        Ok(ids)
    }
}
