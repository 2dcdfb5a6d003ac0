use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

use crate::relay::invite::{parse_destinations, InviteDestination, InvitePolicy};
use crate::relay::replies::ReplyConfig;
use crate::relay::tier::{TierConfig, TierLevel};
use crate::telegram::TelegramConfig;

/// How chat updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Long-poll `getUpdates`.
    Polling,
    /// Telegram pushes to `POST /telegram/webhook`.
    Webhook,
}

impl UpdateMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Some(UpdateMode::Polling),
            "webhook" => Some(UpdateMode::Webhook),
            _ => None,
        }
    }
}

/// Everything the relay reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub tiers: TierConfig,
    pub destinations: Vec<InviteDestination>,
    pub invite_policy: InvitePolicy,
    pub replies: ReplyConfig,
    pub telegram: TelegramConfig,
    pub update_mode: UpdateMode,
}

impl RelayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env::var("RELAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".into())
            .parse::<SocketAddr>()
            .context("RELAY_BIND_ADDR is not a socket address")?;

        let destinations = parse_destinations(&env::var("RELAY_DESTINATIONS").unwrap_or_default())
            .context("RELAY_DESTINATIONS is malformed")?;

        let update_mode = match env::var("RELAY_UPDATE_MODE") {
            Ok(v) => UpdateMode::parse(&v)
                .ok_or_else(|| anyhow::anyhow!("RELAY_UPDATE_MODE must be polling or webhook, got '{}'", v))?,
            Err(_) => UpdateMode::Polling,
        };

        let cfg = Self {
            bind_addr,
            db_path: env::var("RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data.json")),
            tiers: TierConfig::from_env(),
            destinations,
            invite_policy: InvitePolicy::from_env(),
            replies: ReplyConfig::from_env(),
            telegram: TelegramConfig::from_env()?,
            update_mode,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.tiers.validate()?;
        if self.destinations.is_empty() {
            anyhow::bail!("RELAY_DESTINATIONS must name at least one invite group (key:chat_id:tier)");
        }
        for level in [TierLevel::Mid, TierLevel::Top] {
            if !self.destinations.iter().any(|d| d.min_tier == level) {
                warn!("⚙️ No {:?}-tier destination configured; that tier will get no links", level);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_mode_parse() {
        assert_eq!(UpdateMode::parse("Webhook"), Some(UpdateMode::Webhook));
        assert_eq!(UpdateMode::parse("poll"), Some(UpdateMode::Polling));
        assert_eq!(UpdateMode::parse("push"), None);
    }
}
