//! Row-level representation of the `items` and `history` tables.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::encoding::{unsigned_to_signed, wear_to_int, ItemProperties};
use crate::error::StoreResult;
use crate::item::{InspectedItem, Keychain, Sticker};

/// Sticker as stored in the `stickers` JSON column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSticker {
    pub s: u8,
    pub i: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Number of copies of this sticker id on the item; set on one entry only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<u32>,
}

/// Keychain as stored in the `keychains` JSON column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredKeychain {
    pub s: u8,
    pub i: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sc: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,
}

fn non_zero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

/// Compact stickers and annotate duplicates.
///
/// Returns `None` for an empty list so the column stays NULL.
pub fn normalize_stickers(stickers: &[Sticker]) -> Option<Vec<StoredSticker>> {
    if stickers.is_empty() {
        return None;
    }

    let mut counts: HashMap<u32, u32> = HashMap::new();
    for sticker in stickers {
        *counts.entry(sticker.sticker_id).or_default() += 1;
    }

    let mut annotated = HashSet::new();
    let stored = stickers
        .iter()
        .map(|s| {
            let count = counts[&s.sticker_id];
            let d = (count > 1 && annotated.insert(s.sticker_id)).then_some(count);
            StoredSticker {
                s: s.slot,
                i: s.sticker_id,
                w: non_zero(s.wear),
                r: non_zero(s.rotation),
                x: non_zero(s.offset_x),
                y: non_zero(s.offset_y),
                d,
            }
        })
        .collect();

    Some(stored)
}

pub fn normalize_keychains(keychains: &[Keychain]) -> Option<Vec<StoredKeychain>> {
    if keychains.is_empty() {
        return None;
    }

    Some(
        keychains
            .iter()
            .map(|k| StoredKeychain {
                s: k.slot,
                i: k.sticker_id,
                w: non_zero(k.wear),
                sc: non_zero(k.scale),
                r: non_zero(k.rotation),
                t: non_zero(k.tint_id),
                x: non_zero(k.offset_x),
                y: non_zero(k.offset_y),
                z: non_zero(k.offset_z),
                p: non_zero(k.pattern),
            })
            .collect(),
    )
}

impl From<StoredSticker> for Sticker {
    fn from(s: StoredSticker) -> Self {
        Sticker {
            slot: s.s,
            sticker_id: s.i,
            wear: s.w,
            rotation: s.r,
            offset_x: s.x,
            offset_y: s.y,
        }
    }
}

impl From<StoredKeychain> for Keychain {
    fn from(k: StoredKeychain) -> Self {
        Keychain {
            slot: k.s,
            sticker_id: k.i,
            wear: k.w,
            scale: k.sc,
            rotation: k.r,
            tint_id: k.t,
            offset_x: k.x,
            offset_y: k.y,
            offset_z: k.z,
            pattern: k.p,
        }
    }
}

/// One row of the `items` table, in stored (signed) representation
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub ms: i64,
    pub asset_id: i64,
    pub d: i64,
    pub paintseed: u16,
    pub paintwear: i32,
    pub defindex: u16,
    pub paintindex: u16,
    pub stattrak: bool,
    pub souvenir: bool,
    pub props: i32,
    pub rarity: u8,
    pub stickers: Option<String>,
    pub keychains: Option<String>,
    /// Unix milliseconds of the last write
    pub updated: i64,
    pub float_id: Option<i64>,
    pub price: Option<i32>,
    pub listed_price: Option<i32>,
}

impl ItemRow {
    /// Build the row an inspection result would write.
    ///
    /// Returns `Ok(None)` for items that are not stored (see
    /// [`InspectedItem::is_storable`]).
    pub fn prepare(
        item: &InspectedItem,
        price: Option<i32>,
        updated: i64,
    ) -> StoreResult<Option<Self>> {
        if !item.is_storable() {
            return Ok(None);
        }

        let stickers = normalize_stickers(&item.stickers)
            .map(|s| serde_json::to_string(&s))
            .transpose()?;
        let keychains = normalize_keychains(&item.keychains)
            .map(|k| serde_json::to_string(&k))
            .transpose()?;

        Ok(Some(Self {
            ms: unsigned_to_signed(item.owner_or_listing()),
            asset_id: unsigned_to_signed(item.a),
            d: unsigned_to_signed(item.d),
            paintseed: item.paintseed,
            paintwear: wear_to_int(item.floatvalue),
            defindex: item.defindex,
            paintindex: item.paintindex,
            stattrak: item.is_stattrak(),
            souvenir: item.is_souvenir(),
            props: ItemProperties::new(item.origin, item.quality, item.rarity).pack(),
            rarity: item.rarity,
            stickers,
            keychains,
            updated,
            float_id: None,
            price,
            listed_price: price,
        }))
    }

    /// Uniqueness key of the physical item
    pub fn unique_key(&self) -> (u16, u16, i32, u16) {
        (self.defindex, self.paintindex, self.paintwear, self.paintseed)
    }

    /// Apply the columns an upsert merge overwrites onto an existing row.
    ///
    /// Wear and template columns never change for the same key.
    ///
    /// Prices are coalesced on purpose: a write without a submitted price
    /// keeps the stored `price` and `listed_price`, a submitted price replaces
    /// both. Whether a transition then clears them is decided afterwards by
    /// [`crate::history::before_update`], which also archives the stored
    /// price when the item leaves its listing.
    pub fn merged_onto(&self, existing: &ItemRow) -> ItemRow {
        ItemRow {
            ms: self.ms,
            asset_id: self.asset_id,
            d: self.d,
            stickers: self.stickers.clone(),
            keychains: self.keychains.clone(),
            updated: self.updated,
            price: self.price.or(existing.price),
            listed_price: self.listed_price.or(existing.listed_price),
            ..existing.clone()
        }
    }
}

/// One row of the `history` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub float_id: i64,
    pub asset_id: i64,
    pub steam_id: i64,
    pub created_at: i64,
    pub price: Option<i32>,
}
