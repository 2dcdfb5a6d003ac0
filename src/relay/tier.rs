//! Tier Policy — pure mapping from a trader aggregate to a membership tier.
//!
//! Precedence, top to bottom:
//!   1. Unknown          no records
//!   2. VerifiedTop      total ≥ high, last status ftd
//!   3. VerifiedMid      low ≤ total < high, last status ftd
//!   4. PendingPartial   0 < total < low
//!   5. PendingNone      everything else
//!
//! `total == low` with ftd is already mid (inclusive lower bound).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::TraderAggregate;

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Minimum cumulative deposit for the mid tier.
    /// Default: 10.
    pub low_threshold: Decimal,
    /// Minimum cumulative deposit for the top tier.
    /// Default: 30.
    pub high_threshold: Decimal,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            low_threshold: dec!(10),
            high_threshold: dec!(30),
        }
    }
}

impl TierConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("RELAY_LOW_THRESHOLD") {
            if let Ok(d) = v.trim().parse() {
                c.low_threshold = d;
            }
        }
        if let Ok(v) = std::env::var("RELAY_HIGH_THRESHOLD") {
            if let Ok(d) = v.trim().parse() {
                c.high_threshold = d;
            }
        }
        c
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.low_threshold.is_sign_negative() || self.high_threshold.is_sign_negative() {
            anyhow::bail!(
                "deposit thresholds must be non-negative (low={}, high={})",
                self.low_threshold,
                self.high_threshold
            );
        }
        if self.low_threshold > self.high_threshold {
            anyhow::bail!(
                "low threshold {} exceeds high threshold {}",
                self.low_threshold,
                self.high_threshold
            );
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────

/// Minimum tier a destination group requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TierLevel {
    Mid,
    Top,
}

impl TierLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mid" | "primary" => Some(TierLevel::Mid),
            "top" | "svip" => Some(TierLevel::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tier {
    Unknown,
    VerifiedTop { total: Decimal },
    VerifiedMid { total: Decimal },
    PendingPartial { total: Decimal },
    PendingNone,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Unknown => "UNKNOWN",
            Tier::VerifiedTop { .. } => "VERIFIED_TOP",
            Tier::VerifiedMid { .. } => "VERIFIED_MID",
            Tier::PendingPartial { .. } => "PENDING_PARTIAL",
            Tier::PendingNone => "PENDING_NONE",
        }
    }

    /// Whether a destination requiring `level` is granted at this tier.
    pub fn unlocks(&self, level: TierLevel) -> bool {
        match self {
            Tier::VerifiedTop { .. } => true,
            Tier::VerifiedMid { .. } => level == TierLevel::Mid,
            _ => false,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Tier::VerifiedTop { .. } | Tier::VerifiedMid { .. })
    }
}

// ─────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TierPolicy {
    cfg: TierConfig,
}

impl TierPolicy {
    pub fn new(cfg: TierConfig) -> Self {
        Self { cfg }
    }

    pub fn classify(&self, agg: Option<&TraderAggregate>) -> Tier {
        let Some(agg) = agg else {
            return Tier::Unknown;
        };
        let total = agg.total_payout;
        let ftd = agg.last_status.is_ftd();

        if ftd && total >= self.cfg.high_threshold {
            Tier::VerifiedTop { total }
        } else if ftd && total >= self.cfg.low_threshold {
            Tier::VerifiedMid { total }
        } else if total > Decimal::ZERO && total < self.cfg.low_threshold {
            Tier::PendingPartial { total }
        } else {
            Tier::PendingNone
        }
    }
}
