//! Shared state for the gateway layer

use std::sync::Arc;

use courier_auth::Authenticator;
use courier_config::AppConfig;
use courier_core::Realtime;
use courier_database::ChatRepository;
use sqlx::SqlitePool;

pub struct GatewayState {
    pub authenticator: Authenticator,
    pub realtime: Realtime,
    pub chats: ChatRepository,
    pub mailbox_capacity: usize,
}

impl GatewayState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Arc<Self> {
        Arc::new(Self {
            authenticator: Authenticator::new(pool.clone(), &config.auth),
            realtime: Realtime::new(pool.clone(), &config.realtime),
            chats: ChatRepository::new(pool),
            mailbox_capacity: config.realtime.mailbox_capacity,
        })
    }
}
