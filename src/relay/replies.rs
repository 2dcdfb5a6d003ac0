//! Chat reply texts for every tier outcome.

use rust_decimal::Decimal;

use super::invite::{InviteDestination, IssuedInvites};
use super::tier::{Tier, TierConfig};

pub const START_REPLY: &str = "Send me your trader ID to verify.";

/// Branding shown in replies.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    pub signup_url: String,
    pub bonus_code: Option<String>,
    pub support_handle: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            signup_url: "https://market-qx.trade/sign-up/".to_string(),
            bonus_code: None,
            support_handle: "@support".to_string(),
        }
    }
}

impl ReplyConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("RELAY_SIGNUP_URL") {
            if !v.trim().is_empty() {
                c.signup_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("RELAY_BONUS_CODE") {
            if !v.trim().is_empty() {
                c.bonus_code = Some(v.trim().to_string());
            }
        }
        if let Ok(v) = std::env::var("RELAY_SUPPORT_HANDLE") {
            if !v.trim().is_empty() {
                c.support_handle = v.trim().to_string();
            }
        }
        c
    }
}

pub struct Replies {
    cfg: ReplyConfig,
    tiers: TierConfig,
}

impl Replies {
    pub fn new(cfg: ReplyConfig, tiers: TierConfig) -> Self {
        Self { cfg, tiers }
    }

    pub fn render(&self, tier: &Tier, invites: &IssuedInvites) -> String {
        let body = match tier {
            Tier::Unknown => self.unknown(),
            Tier::VerifiedTop { .. } => {
                format!("CONGRATULATIONS 🎉🍾 YOUR ID IS VERIFIED ✅\n{}", self.link_lines(invites))
            }
            Tier::VerifiedMid { total } => format!(
                "CONGRATULATIONS 🎉 YOUR ID IS VERIFIED ✅\nTOTAL DEPOSITED: {}$\n{}\n\
                 💎 DEPOSIT {}$ OR MORE IN TOTAL TO UNLOCK EVERY GROUP",
                amount(*total),
                self.link_lines(invites),
                amount(self.tiers.high_threshold),
            ),
            Tier::PendingPartial { total } => format!(
                "✅✅✅ ACCOUNT CREATED ✅✅✅\n\n\
                 YOU DEPOSITED {}$ THAT IS LESS THAN {}$. PLEASE DEPOSIT THE REQUIRED AMOUNT ❤️",
                amount(*total),
                amount(self.tiers.low_threshold),
            ),
            Tier::PendingNone => "✅✅✅ ACCOUNT CREATED ✅✅✅\n\n\
                 PLEASE DEPOSIT THE REQUIRED AMOUNT TO JOIN THE VIP GROUP ❤️"
                .to_string(),
        };
        format!("{}\n\n{}", body, self.footer())
    }

    fn unknown(&self) -> String {
        let mut s = format!(
            "🚫🚫🚫 ID NOT FOUND 🚫🚫🚫\n\n⬇️👇\n\n\
             🌐 CREATE YOUR ACCOUNT NOW: {}\n\n\
             💵 DEPOSIT {}$ OR MORE",
            self.cfg.signup_url,
            amount(self.tiers.high_threshold),
        );
        if let Some(code) = &self.cfg.bonus_code {
            s.push_str(&format!("\n🎁 BONUS CODE: {}", code));
        }
        s
    }

    fn link_lines(&self, invites: &IssuedInvites) -> String {
        let mut lines: Vec<String> = invites
            .links
            .iter()
            .map(|(dest, link)| format!("LINK TO {}: {}", label(dest), link))
            .collect();
        for dest in &invites.failed {
            lines.push(format!(
                "⚠️ {} LINK IS TEMPORARILY UNAVAILABLE. SEND YOUR ID AGAIN IN A FEW MINUTES.",
                label(dest)
            ));
        }
        lines.join("\n")
    }

    fn footer(&self) -> String {
        format!(
            "❓ HAVE ANY QUESTIONS? CONTACT US DIRECTLY: {}\n📈 START TRADING LIKE A PRO TODAY!",
            self.cfg.support_handle
        )
    }
}

fn label(dest: &InviteDestination) -> String {
    dest.key.to_uppercase()
}

/// `25.00` → `25`, `12.50` → `12.5`.
fn amount(d: Decimal) -> String {
    d.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::tier::TierLevel;
    use rust_decimal_macros::dec;

    fn replies() -> Replies {
        Replies::new(
            ReplyConfig {
                signup_url: "https://example.test/signup".into(),
                bonus_code: Some("BONUS50".into()),
                support_handle: "@desk".into(),
            },
            TierConfig::default(),
        )
    }

    fn svip() -> InviteDestination {
        InviteDestination { key: "svip".into(), chat_id: "-1".into(), min_tier: TierLevel::Mid }
    }

    #[test]
    fn test_unknown_has_signup_instructions() {
        let text = replies().render(&Tier::Unknown, &IssuedInvites::default());
        assert!(text.contains("ID NOT FOUND"));
        assert!(text.contains("https://example.test/signup"));
        assert!(text.contains("BONUS50"));
        assert!(text.contains("@desk"));
    }

    #[test]
    fn test_mid_echoes_total_and_link() {
        let invites = IssuedInvites {
            links: vec![(svip(), "https://t.me/+abc".into())],
            failed: vec![],
        };
        let text = replies().render(&Tier::VerifiedMid { total: dec!(25.00) }, &invites);
        assert!(text.contains("TOTAL DEPOSITED: 25$"));
        assert!(text.contains("LINK TO SVIP: https://t.me/+abc"));
    }

    #[test]
    fn test_partial_echoes_amount() {
        let text = replies().render(&Tier::PendingPartial { total: dec!(7.5) }, &IssuedInvites::default());
        assert!(text.contains("YOU DEPOSITED 7.5$ THAT IS LESS THAN 10$"));
    }

    #[test]
    fn test_failed_link_is_called_out() {
        let invites = IssuedInvites { links: vec![], failed: vec![svip()] };
        let text = replies().render(&Tier::VerifiedTop { total: dec!(50) }, &invites);
        assert!(text.contains("SVIP LINK IS TEMPORARILY UNAVAILABLE"));
        assert!(!text.contains("LINK TO SVIP:"));
    }
}
