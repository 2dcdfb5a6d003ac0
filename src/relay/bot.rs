//! Lookup Bot — turns chat text into a tier decision and a reply.
//!
//! Architecture:
//!   getUpdates / webhook ──Update──→ classify ──trader id──→ store → aggregate
//!        → tier → invite issuer → reply template → sendMessage
//!
//! Every update runs in its own task so a slow invite mint for one trader
//! never holds up anyone else.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::aggregator::aggregate;
use super::invite::{InviteIssuer, IssuedInvites};
use super::replies::{Replies, START_REPLY};
use super::store::RecordStore;
use super::tier::{Tier, TierPolicy};
use crate::error::{RelayError, RelayResult};
use crate::telegram::{ChatPlatform, Update};

const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What a piece of chat text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Start,
    Lookup(&'a str),
}

/// Only `/start` and all-digit text mean anything; the rest is ignored.
pub fn classify_input(text: &str) -> RelayResult<ChatInput<'_>> {
    let trimmed = text.trim();
    if trimmed.starts_with('/') {
        let command = trimmed
            .split_whitespace()
            .next()
            .and_then(|c| c.split('@').next())
            .unwrap_or_default();
        return match command {
            "/start" => Ok(ChatInput::Start),
            _ => Err(RelayError::InvalidTraderIdFormat(trimmed.to_string())),
        };
    }
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Ok(ChatInput::Lookup(trimmed))
    } else {
        Err(RelayError::InvalidTraderIdFormat(trimmed.to_string()))
    }
}

/// Result of one trader lookup.
#[derive(Debug)]
pub struct LookupOutcome {
    pub tier: Tier,
    pub invites: IssuedInvites,
    pub reply: String,
}

pub struct LookupBot {
    store: Arc<RecordStore>,
    policy: TierPolicy,
    issuer: InviteIssuer,
    replies: Replies,
    chat: Arc<dyn ChatPlatform>,
}

impl LookupBot {
    pub fn new(
        store: Arc<RecordStore>,
        policy: TierPolicy,
        issuer: InviteIssuer,
        replies: Replies,
        chat: Arc<dyn ChatPlatform>,
    ) -> Self {
        Self {
            store,
            policy,
            issuer,
            replies,
            chat,
        }
    }

    /// Aggregate → classify → issue links → render.
    pub async fn lookup(&self, trader_id: &str) -> LookupOutcome {
        let records = self.store.find_by_trader_id(trader_id).await;
        let agg = aggregate(&records);
        let tier = self.policy.classify(agg.as_ref());

        let invites = if tier.is_verified() {
            self.issuer.ensure_for_tier(trader_id, &tier).await
        } else {
            IssuedInvites::default()
        };

        info!(
            "🔎 Lookup trader={} records={} total={} tier={} links={} failed={}",
            trader_id,
            agg.as_ref().map(|a| a.record_count).unwrap_or(0),
            agg.as_ref().map(|a| a.total_payout).unwrap_or_default(),
            tier.name(),
            invites.links.len(),
            invites.failed.len(),
        );

        let reply = self.replies.render(&tier, &invites);
        LookupOutcome {
            tier,
            invites,
            reply,
        }
    }

    /// Reply text for a chat message, `None` when the message is ignored.
    pub async fn reply_to(&self, text: &str) -> Option<String> {
        match classify_input(text) {
            Ok(ChatInput::Start) => Some(START_REPLY.to_string()),
            Ok(ChatInput::Lookup(trader_id)) => Some(self.lookup(trader_id).await.reply),
            Err(e) => {
                debug!("💬 Ignored: {}", e);
                None
            }
        }
    }

    pub async fn handle_message(&self, chat_id: i64, text: &str) -> RelayResult<()> {
        if let Some(reply) = self.reply_to(text).await {
            self.chat.send_message(chat_id, &reply).await?;
        }
        Ok(())
    }

    pub async fn handle_update(&self, update: Update) {
        let Some((chat_id, text)) = update.text_message() else {
            return;
        };
        if let Err(e) = self.handle_message(chat_id, text).await {
            warn!("💬 Reply to chat {} failed: {}", chat_id, e);
        }
    }

    /// Hand an update to its own task.
    pub fn dispatch(self: &Arc<Self>, update: Update) {
        let bot = Arc::clone(self);
        tokio::spawn(async move { bot.handle_update(update).await });
    }

    /// Long-polling loop. Runs until the task is aborted.
    pub async fn run_polling(self: Arc<Self>, timeout_secs: u64) {
        self.poll_loop(timeout_secs, POLL_RETRY_DELAY).await
    }

    async fn poll_loop(self: Arc<Self>, timeout_secs: u64, retry_delay: Duration) {
        info!("🤖 Bot polling started | timeout={}s", timeout_secs);
        let mut offset = 0i64;
        loop {
            match self.chat.poll_updates(offset, timeout_secs).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(update);
                    }
                }
                Err(e) => {
                    warn!("🤖 getUpdates failed: {} | retrying in {:?}", e, retry_delay);
                    sleep(retry_delay).await;
                }
            }
        }
    }
}
