//! Ownership/price history decisions made on the write path.
//!
//! Every update of an existing item row passes through [`before_update`],
//! which decides what (if anything) is archived into `history` and whether
//! the row update is applied at all. Keeping this a plain function lets the
//! ordering rules be tested without a database.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::encoding::{is_steam_id, signed_to_unsigned};
use crate::row::{HistoryRow, ItemRow};

/// Days during which a completed trade can still be reversed
pub const TRADE_REVERSAL_DAYS: i64 = 7;

/// Result of running the update rules on one row
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Row to write, `None` when the update must be discarded
    pub row: Option<ItemRow>,
    /// History entry to insert (insert-or-ignore)
    pub history: Option<HistoryRow>,
}

/// Assign permanent identity on first sighting.
pub fn before_insert(mut row: ItemRow) -> ItemRow {
    if row.float_id.is_none() {
        row.float_id = Some(row.asset_id);
    }
    row
}

/// Decide how an incoming row replaces the stored one.
///
/// `new` is the stored row with the merge columns already applied (see
/// [`ItemRow::merged_onto`]).
pub fn before_update(old: &ItemRow, mut new: ItemRow) -> UpdateOutcome {
    let float_id = *new.float_id.get_or_insert(old.asset_id);

    if new.asset_id == old.asset_id {
        return UpdateOutcome { row: Some(new), history: None };
    }

    if new.asset_id < old.asset_id {
        // A late inspection of an older reference: remember it, never regress
        return UpdateOutcome {
            row: None,
            history: Some(HistoryRow {
                float_id,
                asset_id: new.asset_id,
                steam_id: new.ms,
                created_at: new.updated,
                price: None,
            }),
        };
    }

    let owner_changed = is_steam_id(signed_to_unsigned(old.ms)) && old.ms != new.ms;
    let history = (owner_changed || old.price.is_some()).then(|| HistoryRow {
        float_id,
        asset_id: old.asset_id,
        steam_id: old.ms,
        created_at: old.updated,
        price: old.price,
    });

    let same_price = matches!((new.price, old.price), (Some(n), Some(o)) if n == o);
    let same_listed = matches!((new.listed_price, old.listed_price), (Some(n), Some(o)) if n == o);
    if same_price || same_listed || is_steam_id(signed_to_unsigned(new.ms)) {
        new.price = None;
        new.listed_price = None;
    }

    UpdateOutcome { row: Some(new), history }
}

/// One archived owner/listing of an item, decoded for callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(serialize_with = "as_str")]
    pub asset_id: u64,
    #[serde(serialize_with = "as_str")]
    pub steam_id: u64,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i32>,
}

fn as_str<S: serde::Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Reversal risk derived from the most recent history entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "risk", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeRisk {
    /// No history recorded
    Unknown,
    /// Last trade is recent enough to be reversed
    #[serde(rename_all = "camelCase")]
    High {
        days_remaining: i64,
        last_trade_date: DateTime<Utc>,
        reversible_until: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Safe {
        days_since_last_trade: i64,
        last_trade_date: DateTime<Utc>,
    },
}

impl TradeRisk {
    /// Assess `history` (newest first) at time `now`
    pub fn assess(history: &[HistoryEntry], now: DateTime<Utc>) -> Self {
        let Some(latest) = history.first() else {
            return TradeRisk::Unknown;
        };

        let elapsed = now - latest.date;
        let window = Duration::days(TRADE_REVERSAL_DAYS);

        if elapsed < window {
            let remaining = window - elapsed;
            // ceil to whole days
            let days_remaining = (remaining.num_seconds() + 86_399) / 86_400;
            TradeRisk::High {
                days_remaining,
                last_trade_date: latest.date,
                reversible_until: latest.date + window,
            }
        } else {
            TradeRisk::Safe {
                days_since_last_trade: elapsed.num_days(),
                last_trade_date: latest.date,
            }
        }
    }

    pub fn can_reverse(&self) -> bool {
        matches!(self, TradeRisk::High { .. })
    }
}
