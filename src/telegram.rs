// Chat platform seam + lightweight Telegram Bot API client.
// Talks plain HTTP + serde_json instead of pulling a bot framework.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum ChatError {
    /// Network / decode failure. URL is stripped so the token never leaks.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{method} rejected: {description}")]
    Api {
        method: &'static str,
        description: String,
    },
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.without_url().to_string())
    }
}

// ─────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// `(chat_id, text)` for plain text messages, `None` for anything else.
    pub fn text_message(&self) -> Option<(i64, &str)> {
        let msg = self.message.as_ref()?;
        Some((msg.chat.id, msg.text.as_deref()?))
    }
}

/// Parameters of a one-time invite link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    pub name: String,
    /// Unix seconds; `None` means the link never expires.
    pub expire_date: Option<i64>,
    pub member_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

// ─────────────────────────────────────────────────────────
// Seam
// ─────────────────────────────────────────────────────────

/// The three capabilities the relay needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Long-poll for inbound updates starting at `offset`.
    async fn poll_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ChatError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatError>;

    /// Mint an invite link for the `destination` group. Returns the link.
    async fn create_invite_link(
        &self,
        destination: &str,
        request: &InviteRequest,
    ) -> Result<String, ChatError>;
}

// ─────────────────────────────────────────────────────────
// Telegram client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: SecretString,
    pub api_base: String,
    /// Long-poll window handed to getUpdates.
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .or_else(|_| std::env::var("TOKEN"))
            .context("TELEGRAM_BOT_TOKEN (or TOKEN) must be set")?;
        Ok(Self {
            token: SecretString::from(token),
            api_base: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_BASE.to_string()),
            poll_timeout_secs: std::env::var("RELAY_POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }
}

pub struct TelegramClient {
    client: reqwest::Client,
    cfg: TelegramConfig,
}

impl TelegramClient {
    pub fn new(cfg: TelegramConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            // Must outlive the long-poll window.
            .timeout(Duration::from_secs(cfg.poll_timeout_secs + 15))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self { client, cfg })
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, body: Value) -> Result<T, ChatError> {
        let url = format!(
            "{}/bot{}/{}",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.token.expose_secret(),
            method
        );
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let envelope: ApiEnvelope<T> = resp.json().await?;
        debug!("📡 Telegram {} → HTTP {} ok={}", method, status, envelope.ok);

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ChatError::Api {
                method,
                description: "missing result".to_string(),
            }),
            (false, _) => Err(ChatError::Api {
                method,
                description: envelope.description.unwrap_or_else(|| status.to_string()),
            }),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn poll_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ChatError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatError> {
        let _: Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    async fn create_invite_link(
        &self,
        destination: &str,
        request: &InviteRequest,
    ) -> Result<String, ChatError> {
        let mut body = json!({
            "chat_id": destination,
            "name": request.name,
        });
        if let Some(ts) = request.expire_date {
            body["expire_date"] = json!(ts);
        }
        if let Some(limit) = request.member_limit {
            body["member_limit"] = json!(limit);
        }
        let link: ChatInviteLink = self.call("createChatInviteLink", body).await?;
        Ok(link.invite_link)
    }
}
