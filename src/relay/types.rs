use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder stored for tracking fields the sender left out.
pub const NOT_AVAILABLE: &str = "N/A";

/// Trader lifecycle status reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TraderStatus {
    Unknown,
    /// First-time deposit.
    Ftd,
    Other(String),
}

impl TraderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TraderStatus::Unknown => "unknown",
            TraderStatus::Ftd => "ftd",
            TraderStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_ftd(&self) -> bool {
        matches!(self, TraderStatus::Ftd)
    }

    fn default_unknown() -> Self {
        TraderStatus::Unknown
    }
}

impl From<String> for TraderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "" | "unknown" => TraderStatus::Unknown,
            "ftd" => TraderStatus::Ftd,
            _ => TraderStatus::Other(raw),
        }
    }
}

impl From<TraderStatus> for String {
    fn from(status: TraderStatus) -> Self {
        match status {
            TraderStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TraderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an untrusted payout amount. Anything that is not a decimal
/// number counts as zero.
pub fn parse_payout(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .unwrap_or(Decimal::ZERO)
}

/// Accepts `"15"`, `15`, `15.5`, `null` or garbage; garbage becomes zero.
fn lenient_payout<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => parse_payout(&s),
        serde_json::Value::Number(n) => parse_payout(&n.to_string()),
        _ => Decimal::ZERO,
    })
}

/// Older stores hold ids written as bare numbers; take any scalar as text.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<TraderStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => TraderStatus::from(s),
        serde_json::Value::Number(n) => TraderStatus::from(n.to_string()),
        _ => TraderStatus::Unknown,
    })
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Cached invite links for one trader, keyed by destination key.
pub type InviteGrant = BTreeMap<String, String>;

/// One postback as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default = "not_available", deserialize_with = "lenient_string")]
    pub trader_id: String,
    #[serde(default = "not_available", deserialize_with = "lenient_string")]
    pub click_id: String,
    #[serde(default = "TraderStatus::default_unknown", deserialize_with = "lenient_status")]
    pub status: TraderStatus,
    #[serde(default, deserialize_with = "lenient_payout")]
    pub payout: Decimal,
    #[serde(default = "not_available", deserialize_with = "lenient_string")]
    pub event_id: String,
    #[serde(default = "not_available", deserialize_with = "lenient_string")]
    pub site_id: String,
    #[serde(default = "not_available", deserialize_with = "lenient_string")]
    pub landing_id: String,
    pub time: DateTime<Utc>,
    /// Only ever populated on the first record of a trader.
    #[serde(default, skip_serializing_if = "InviteGrant::is_empty")]
    pub invites: InviteGrant,
}

/// A record before the store has stamped it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub trader_id: String,
    pub click_id: String,
    pub status: TraderStatus,
    pub payout: Decimal,
    pub event_id: String,
    pub site_id: String,
    pub landing_id: String,
}

impl NewEvent {
    pub fn into_record(self, time: DateTime<Utc>) -> EventRecord {
        EventRecord {
            trader_id: self.trader_id,
            click_id: self.click_id,
            status: self.status,
            payout: self.payout,
            event_id: self.event_id,
            site_id: self.site_id,
            landing_id: self.landing_id,
            time,
            invites: InviteGrant::new(),
        }
    }
}

/// Whole persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderDb {
    #[serde(default)]
    pub traders: Vec<EventRecord>,
}

/// Derived view over all records of one trader.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderAggregate {
    pub total_payout: Decimal,
    pub last_status: TraderStatus,
    pub record_count: usize,
}
