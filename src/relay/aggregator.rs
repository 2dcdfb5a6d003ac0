//! Aggregator — folds a trader's records into a `TraderAggregate`.
//!
//! Re-delivered postbacks are summed like any other record; there is no
//! event-id deduplication.

use rust_decimal::Decimal;
use tracing::warn;

use super::types::{EventRecord, TraderAggregate};

/// `None` means the trader is unknown (no records at all).
pub fn aggregate(records: &[EventRecord]) -> Option<TraderAggregate> {
    let last = records.last()?;
    let total_payout = records.iter().fold(Decimal::ZERO, |acc, r| {
        acc.checked_add(r.payout).unwrap_or_else(|| {
            warn!("🧮 Payout sum overflow for trader={}, saturating", r.trader_id);
            if r.payout.is_sign_negative() { Decimal::MIN } else { Decimal::MAX }
        })
    });
    Some(TraderAggregate {
        total_payout,
        last_status: last.status.clone(),
        record_count: records.len(),
    })
}
