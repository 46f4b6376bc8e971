//! Realtime messaging core for Courier.
//!
//! The pieces compose as: the [`registry`] tracks one live transport per
//! user, [`groups`] fans events out per chat, [`rooms`] caches rosters
//! for membership checks, and [`delivery`], [`membership`] and
//! [`presence`] implement the messaging semantics on top.

pub mod delivery;
pub mod error;
pub mod events;
pub mod groups;
pub mod membership;
pub mod presence;
pub mod registry;
pub mod rooms;

pub use delivery::DeliveryService;
pub use error::{CoreError, CoreResult};
pub use events::{ClientEvent, ServerEvent};
pub use groups::BroadcastGroups;
pub use membership::MembershipService;
pub use presence::PresenceTracker;
pub use registry::{SessionHandle, SessionRegistry};
pub use rooms::RoomCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_config::RealtimeConfig;
use courier_database::{
    ChatRepository, DatabaseResult, MemberRepository, MessageRepository, UserRepository,
};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::warn;

/// Everything the transport layer needs, wired together over one pool.
pub struct Realtime {
    pub registry: Arc<SessionRegistry>,
    pub groups: Arc<BroadcastGroups>,
    pub rooms: Arc<RoomCache>,
    pub presence: PresenceTracker,
    pub delivery: Arc<DeliveryService>,
    pub membership: MembershipService,
    shutdown: watch::Sender<bool>,
}

impl Realtime {
    pub fn new(pool: SqlitePool, config: &RealtimeConfig) -> Self {
        let store_timeout = Duration::from_millis(config.store_timeout_ms);

        let registry = Arc::new(SessionRegistry::new());
        let groups = Arc::new(BroadcastGroups::new());
        let rooms = Arc::new(RoomCache::new(MemberRepository::new(pool.clone())));

        let delivery = Arc::new(DeliveryService::new(
            MessageRepository::new(pool.clone()),
            Arc::clone(&rooms),
            Arc::clone(&groups),
            store_timeout,
        ));
        let membership = MembershipService::new(
            ChatRepository::new(pool.clone()),
            MemberRepository::new(pool.clone()),
            Arc::clone(&rooms),
            Arc::clone(&groups),
            Arc::clone(&registry),
            Arc::clone(&delivery),
            store_timeout,
        );
        let presence = PresenceTracker::new(UserRepository::new(pool), store_timeout);
        let (shutdown, _) = watch::channel(false);

        Self {
            registry,
            groups,
            rooms,
            presence,
            delivery,
            membership,
            shutdown,
        }
    }

    /// Tells every connection task to wind down. A task parked on its
    /// client's socket sees this through [`Realtime::shutdown_watch`]
    /// instead of waiting for the client to hang up.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// A receiver that resolves once shutdown begins.
    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Awaits a durable-store operation under a deadline. A store that does
/// not answer in time surfaces as [`CoreError::StoreUnavailable`] instead
/// of hanging the connection task.
pub(crate) async fn with_store_timeout<T, F>(
    deadline: Duration,
    operation: &'static str,
    future: F,
) -> CoreResult<T>
where
    F: Future<Output = DatabaseResult<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(operation, ?deadline, "durable store timed out");
            Err(CoreError::StoreUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_store_calls_surface_as_store_unavailable() {
        let result: CoreResult<()> = with_store_timeout(
            Duration::from_millis(5),
            "test.stall",
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable)));
    }

    #[tokio::test]
    async fn prompt_store_calls_pass_through() {
        let result = with_store_timeout(
            Duration::from_secs(1),
            "test.ready",
            std::future::ready(Ok(7)),
        )
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
