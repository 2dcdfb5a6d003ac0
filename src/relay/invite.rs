//! Invite Issuer — lazily mints one-time invite links and caches them on the
//! trader's anchor record.
//!
//! At most one link per (trader, destination): the check → mint → store
//! sequence runs under a per-trader async mutex. Different traders never
//! wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::RecordStore;
use super::tier::{Tier, TierLevel};
use crate::error::{RelayError, RelayResult};
use crate::telegram::{ChatPlatform, InviteRequest};

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

/// A chat group that invite links are minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteDestination {
    /// Stable key used in the persisted grant (e.g. `svip`).
    pub key: String,
    /// Platform chat id of the group (`-100…` or `@name`).
    pub chat_id: String,
    pub min_tier: TierLevel,
}

/// Parse `key:chat_id:tier` entries separated by commas.
///
/// `svip:-1002216197397:mid,compounding:-1002000000000:top`
pub fn parse_destinations(raw: &str) -> anyhow::Result<Vec<InviteDestination>> {
    let mut out: Vec<InviteDestination> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, rest) = entry
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("destination '{}' is not key:chat_id:tier", entry))?;
        let (chat_id, tier) = rest
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("destination '{}' is not key:chat_id:tier", entry))?;
        let min_tier = TierLevel::parse(tier)
            .ok_or_else(|| anyhow::anyhow!("destination '{}': unknown tier '{}'", entry, tier))?;
        let (key, chat_id) = (key.trim(), chat_id.trim());
        if key.is_empty() || chat_id.is_empty() {
            anyhow::bail!("destination '{}' has an empty key or chat id", entry);
        }
        if out.iter().any(|d| d.key == key) {
            anyhow::bail!("duplicate destination key '{}'", key);
        }
        out.push(InviteDestination {
            key: key.to_string(),
            chat_id: chat_id.to_string(),
            min_tier,
        });
    }
    Ok(out)
}

/// Expiry and member limit applied to every minted link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitePolicy {
    /// `None` → link never expires.
    pub expire_after: Option<Duration>,
    /// `None` → unlimited joins. Default: 1 (one-time link).
    pub member_limit: Option<u32>,
}

/// Upper bound for `RELAY_INVITE_EXPIRE_SECS` (ten years).
const MAX_INVITE_EXPIRE_SECS: u64 = 10 * 365 * 24 * 3600;

impl Default for InvitePolicy {
    fn default() -> Self {
        Self {
            expire_after: None,
            member_limit: Some(1),
        }
    }
}

impl InvitePolicy {
    pub fn from_env() -> Self {
        let mut p = Self::default();
        if let Ok(v) = std::env::var("RELAY_INVITE_EXPIRE_SECS") {
            if let Ok(secs) = v.trim().parse::<u64>() {
                let secs = secs.min(MAX_INVITE_EXPIRE_SECS);
                p.expire_after = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        if let Ok(v) = std::env::var("RELAY_INVITE_MEMBER_LIMIT") {
            if let Ok(n) = v.trim().parse::<u32>() {
                p.member_limit = (n > 0).then_some(n);
            }
        }
        p
    }

    pub fn request_for(&self, trader_id: &str, now: DateTime<Utc>) -> InviteRequest {
        InviteRequest {
            name: invite_name(trader_id),
            expire_date: self.expire_after.map(|d| {
                let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
                now.timestamp().saturating_add(secs)
            }),
            member_limit: self.member_limit,
        }
    }
}

/// Telegram caps link names at 32 characters.
fn invite_name(trader_id: &str) -> String {
    format!("Invite for {}", trader_id).chars().take(32).collect()
}

// ─────────────────────────────────────────────────────────
// Issuer
// ─────────────────────────────────────────────────────────

/// Links issued for one lookup.
#[derive(Debug, Default)]
pub struct IssuedInvites {
    pub links: Vec<(InviteDestination, String)>,
    /// Destinations whose link could not be produced this time.
    pub failed: Vec<InviteDestination>,
}

pub struct InviteIssuer {
    store: Arc<RecordStore>,
    chat: Arc<dyn ChatPlatform>,
    policy: InvitePolicy,
    destinations: Vec<InviteDestination>,
    /// trader_id → lock held across check-and-mint. Pruned when idle.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InviteIssuer {
    pub fn new(
        store: Arc<RecordStore>,
        chat: Arc<dyn ChatPlatform>,
        policy: InvitePolicy,
        destinations: Vec<InviteDestination>,
    ) -> Self {
        Self {
            store,
            chat,
            policy,
            destinations,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached link for (trader, destination), minting it first if
    /// none exists yet.
    pub async fn ensure_invite(&self, trader_id: &str, destination_key: &str) -> RelayResult<String> {
        let dest = self
            .destinations
            .iter()
            .find(|d| d.key == destination_key)
            .ok_or_else(|| RelayError::UnknownDestination(destination_key.to_string()))?;

        let lock = self.trader_lock(trader_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.ensure_locked(trader_id, dest).await
        };
        drop(lock);
        self.release(trader_id).await;
        result
    }

    /// Ensure links for every destination the tier unlocks, in config order.
    pub async fn ensure_for_tier(&self, trader_id: &str, tier: &Tier) -> IssuedInvites {
        let mut issued = IssuedInvites::default();
        for dest in self.destinations.iter().filter(|d| tier.unlocks(d.min_tier)) {
            match self.ensure_invite(trader_id, &dest.key).await {
                Ok(link) => issued.links.push((dest.clone(), link)),
                Err(e) => {
                    warn!("🔗 Invite for trader={} destination={} failed: {}", trader_id, dest.key, e);
                    issued.failed.push(dest.clone());
                }
            }
        }
        issued
    }

    async fn ensure_locked(&self, trader_id: &str, dest: &InviteDestination) -> RelayResult<String> {
        let records = self.store.find_by_trader_id(trader_id).await;
        let anchor = records
            .first()
            .ok_or_else(|| RelayError::UnknownTrader(trader_id.to_string()))?;

        if let Some(link) = anchor.invites.get(&dest.key) {
            debug!("🔗 Cached invite hit: trader={} destination={}", trader_id, dest.key);
            return Ok(link.clone());
        }

        let request = self.policy.request_for(trader_id, Utc::now());
        let link = self.chat.create_invite_link(&dest.chat_id, &request).await?;
        info!(
            "🔗 Minted invite: trader={} destination={} expires={:?} limit={:?}",
            trader_id, dest.key, request.expire_date, request.member_limit
        );

        self.store
            .set_invite_if_absent(trader_id, &dest.key, &link)
            .await
            .map_err(|e| {
                warn!("🔗 Minted link for trader={} could not be persisted: {}", trader_id, e);
                e
            })
    }

    async fn trader_lock(&self, trader_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(trader_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release(&self, trader_id: &str) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(trader_id) {
            // Only the table still holds it → nobody is waiting.
            if Arc::strong_count(lock) == 1 {
                locks.remove(trader_id);
            }
        }
    }

    #[cfg(test)]
    async fn lock_table_len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::types::{NewEvent, TraderStatus, NOT_AVAILABLE};
    use crate::telegram::{ChatError, Update};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts mint calls and hands out sequential links.
    #[derive(Default)]
    struct CountingChat {
        mints: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ChatPlatform for CountingChat {
        async fn poll_updates(&self, _offset: i64, _timeout: u64) -> Result<Vec<Update>, ChatError> {
            Ok(Vec::new())
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), ChatError> {
            Ok(())
        }

        async fn create_invite_link(
            &self,
            destination: &str,
            _request: &InviteRequest,
        ) -> Result<String, ChatError> {
            if self.fail {
                return Err(ChatError::Api {
                    method: "createChatInviteLink",
                    description: "Forbidden".into(),
                });
            }
            // Give racing callers a chance to interleave.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let n = self.mints.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://t.me/+{}-{}", destination, n))
        }
    }

    fn destinations() -> Vec<InviteDestination> {
        parse_destinations("svip:-100111:mid,compounding:-100222:top").unwrap()
    }

    async fn setup(chat: Arc<CountingChat>) -> (tempfile::TempDir, Arc<RecordStore>, InviteIssuer) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::new(dir.path().join("data.json")));
        store
            .append(NewEvent {
                trader_id: "123".into(),
                click_id: NOT_AVAILABLE.into(),
                status: TraderStatus::Ftd,
                payout: dec!(40),
                event_id: NOT_AVAILABLE.into(),
                site_id: NOT_AVAILABLE.into(),
                landing_id: NOT_AVAILABLE.into(),
            })
            .await
            .unwrap();
        let issuer = InviteIssuer::new(store.clone(), chat, InvitePolicy::default(), destinations());
        (dir, store, issuer)
    }

    #[test]
    fn test_parse_destinations() {
        let d = destinations();
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].key, "svip");
        assert_eq!(d[0].chat_id, "-100111");
        assert_eq!(d[0].min_tier, TierLevel::Mid);
        assert_eq!(d[1].min_tier, TierLevel::Top);

        assert!(parse_destinations("svip:-1").is_err());
        assert!(parse_destinations("a:-1:mid,a:-2:top").is_err());
        assert!(parse_destinations("a:-1:gold").is_err());
        assert!(parse_destinations("").unwrap().is_empty());
    }

    #[test]
    fn test_policy_request() {
        let now = Utc::now();
        let bounded = InvitePolicy { expire_after: Some(Duration::from_secs(3600)), member_limit: Some(1) };
        let req = bounded.request_for("123", now);
        assert_eq!(req.name, "Invite for 123");
        assert_eq!(req.expire_date, Some(now.timestamp() + 3600));
        assert_eq!(req.member_limit, Some(1));

        let open = InvitePolicy::default().request_for("123", now);
        assert_eq!(open.expire_date, None);
        assert_eq!(open.member_limit, Some(1));
    }

    #[test]
    fn test_huge_expiry_saturates() {
        let now = Utc::now();
        let forever = InvitePolicy { expire_after: Some(Duration::from_secs(u64::MAX)), member_limit: None };
        assert_eq!(forever.request_for("123", now).expire_date, Some(i64::MAX));

        let past_i64 = Duration::from_secs(i64::MAX as u64 + 1);
        let bounded = InvitePolicy { expire_after: Some(past_i64), member_limit: None };
        assert_eq!(bounded.request_for("123", now).expire_date, Some(i64::MAX));
    }

    #[test]
    fn test_invite_name_is_capped() {
        let long = "9".repeat(64);
        assert_eq!(invite_name(&long).chars().count(), 32);
    }

    #[tokio::test]
    async fn test_ensure_invite_is_idempotent() {
        let chat = Arc::new(CountingChat::default());
        let (_dir, store, issuer) = setup(chat.clone()).await;

        let first = issuer.ensure_invite("123", "svip").await.unwrap();
        let second = issuer.ensure_invite("123", "svip").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(chat.mints.load(Ordering::SeqCst), 1);

        let anchor = &store.find_by_trader_id("123").await[0];
        assert_eq!(anchor.invites.get("svip"), Some(&first));
    }

    #[tokio::test]
    async fn test_racing_lookups_mint_once() {
        let chat = Arc::new(CountingChat::default());
        let (_dir, _store, issuer) = setup(chat.clone()).await;
        let issuer = Arc::new(issuer);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = issuer.clone();
            handles.push(tokio::spawn(async move { issuer.ensure_invite("123", "svip").await.unwrap() }));
        }
        let mut links = Vec::new();
        for h in handles {
            links.push(h.await.unwrap());
        }
        assert!(links.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(chat.mints.load(Ordering::SeqCst), 1);
        assert_eq!(issuer.lock_table_len().await, 0);
    }

    #[tokio::test]
    async fn test_tier_selects_destinations() {
        let chat = Arc::new(CountingChat::default());
        let (_dir, _store, issuer) = setup(chat.clone()).await;

        let mid = issuer.ensure_for_tier("123", &Tier::VerifiedMid { total: dec!(15) }).await;
        assert_eq!(mid.links.len(), 1);
        assert_eq!(mid.links[0].0.key, "svip");

        let top = issuer.ensure_for_tier("123", &Tier::VerifiedTop { total: dec!(40) }).await;
        assert_eq!(top.links.len(), 2);
        // svip was already cached, only compounding is new.
        assert_eq!(chat.mints.load(Ordering::SeqCst), 2);
        assert_eq!(top.links[0].1, mid.links[0].1);

        let none = issuer.ensure_for_tier("123", &Tier::PendingNone).await;
        assert!(none.links.is_empty() && none.failed.is_empty());
    }

    #[tokio::test]
    async fn test_mint_failure_is_reported_not_cached() {
        let chat = Arc::new(CountingChat { fail: true, ..Default::default() });
        let (_dir, store, issuer) = setup(chat).await;

        let err = issuer.ensure_invite("123", "svip").await.unwrap_err();
        assert!(matches!(err, RelayError::ExternalService(_)));

        let issued = issuer.ensure_for_tier("123", &Tier::VerifiedMid { total: dec!(15) }).await;
        assert!(issued.links.is_empty());
        assert_eq!(issued.failed.len(), 1);
        assert!(store.find_by_trader_id("123").await[0].invites.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_trader_and_destination() {
        let chat = Arc::new(CountingChat::default());
        let (_dir, _store, issuer) = setup(chat.clone()).await;

        assert!(matches!(
            issuer.ensure_invite("999", "svip").await,
            Err(RelayError::UnknownTrader(_))
        ));
        assert!(matches!(
            issuer.ensure_invite("123", "vip2").await,
            Err(RelayError::UnknownDestination(_))
        ));
        assert_eq!(chat.mints.load(Ordering::SeqCst), 0);
    }
}
