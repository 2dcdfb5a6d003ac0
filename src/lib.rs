pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod telegram;

use std::sync::Arc;

use config::RelayConfig;
use relay::bot::LookupBot;
use relay::invite::{InviteDestination, InviteIssuer, InvitePolicy};
use relay::replies::{Replies, ReplyConfig};
use relay::store::RecordStore;
use relay::tier::{TierConfig, TierPolicy};
use telegram::ChatPlatform;

// --- Shared App State (HTTP handlers + bot loop) ---
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub bot: Arc<LookupBot>,
}

impl AppState {
    pub fn new(
        store: Arc<RecordStore>,
        chat: Arc<dyn ChatPlatform>,
        tiers: TierConfig,
        destinations: Vec<InviteDestination>,
        invite_policy: InvitePolicy,
        replies: ReplyConfig,
    ) -> Self {
        let issuer = InviteIssuer::new(store.clone(), chat.clone(), invite_policy, destinations);
        let bot = LookupBot::new(
            store.clone(),
            TierPolicy::new(tiers.clone()),
            issuer,
            Replies::new(replies, tiers),
            chat,
        );
        Self {
            store,
            bot: Arc::new(bot),
        }
    }

    pub fn from_config(cfg: &RelayConfig, chat: Arc<dyn ChatPlatform>) -> Self {
        Self::new(
            Arc::new(RecordStore::new(cfg.db_path.clone())),
            chat,
            cfg.tiers.clone(),
            cfg.destinations.clone(),
            cfg.invite_policy.clone(),
            cfg.replies.clone(),
        )
    }
}
