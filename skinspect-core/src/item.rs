//! Item payloads: what the inspection protocol returns and what the service
//! answers with.

use serde::{Deserialize, Deserializer, Serialize};

/// Quality id of souvenir items
pub const SOUVENIR_QUALITY: u8 = 12;

/// Definition index exempt from the zero-wear skip (vanilla knife)
pub const ZERO_WEAR_DEFINDEX: u16 = 507;

/// Applied sticker as reported by the inspection protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub slot: u8,
    #[serde(rename = "stickerId")]
    pub sticker_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wear: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f32>,
}

/// Attached keychain as reported by the inspection protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keychain {
    pub slot: u8,
    pub sticker_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wear: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<u32>,
}

/// Decoded item returned by one inspection round-trip.
///
/// 64-bit ids arrive as decimal strings (JSON numbers lose precision above
/// 2^53); numbers are accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectedItem {
    /// Owner account id, `0` for market listings
    #[serde(deserialize_with = "u64_from_str_or_num", serialize_with = "u64_as_str", default)]
    pub s: u64,
    /// Asset id
    #[serde(deserialize_with = "u64_from_str_or_num", serialize_with = "u64_as_str")]
    pub a: u64,
    /// Checksum token
    #[serde(deserialize_with = "u64_from_str_or_num", serialize_with = "u64_as_str")]
    pub d: u64,
    /// Listing id, `0` for inventory items
    #[serde(deserialize_with = "u64_from_str_or_num", serialize_with = "u64_as_str", default)]
    pub m: u64,
    pub floatvalue: f32,
    pub paintseed: u16,
    pub defindex: u16,
    pub paintindex: u16,
    pub rarity: u8,
    pub quality: u8,
    pub origin: u8,
    /// Present (possibly 0) on StatTrak items
    #[serde(default)]
    pub killeatervalue: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customname: Option<String>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub keychains: Vec<Keychain>,
}

impl InspectedItem {
    /// StatTrak items carry a kill counter, even when it reads 0
    pub fn is_stattrak(&self) -> bool {
        self.killeatervalue.is_some()
    }

    pub fn is_souvenir(&self) -> bool {
        self.quality == SOUVENIR_QUALITY
    }

    /// Owner-or-listing id as stored in the `ms` column
    pub fn owner_or_listing(&self) -> u64 {
        if self.s != 0 {
            self.s
        } else {
            self.m
        }
    }

    /// Only weapons are stored; the zero-wear knife is the one exception
    pub fn is_storable(&self) -> bool {
        self.floatvalue > 0.0 || self.defindex == ZERO_WEAR_DEFINDEX
    }
}

/// Position of an item's wear among items of the same template.
///
/// `None` means the count reached the ranking horizon and the item is
/// reported as unranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rank {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_rank: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_rank: Option<u32>,
}

/// Item as answered to callers, either decoded from storage or built from a
/// fresh inspection.
///
/// `extra` holds whatever an annotator adds (names, images, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    #[serde(serialize_with = "u64_as_str", deserialize_with = "u64_from_str_or_num")]
    pub s: u64,
    #[serde(serialize_with = "u64_as_str", deserialize_with = "u64_from_str_or_num")]
    pub a: u64,
    #[serde(serialize_with = "u64_as_str", deserialize_with = "u64_from_str_or_num")]
    pub d: u64,
    #[serde(serialize_with = "u64_as_str", deserialize_with = "u64_from_str_or_num")]
    pub m: u64,
    #[serde(
        default,
        serialize_with = "opt_u64_as_str",
        deserialize_with = "opt_u64_from_str_or_num",
        skip_serializing_if = "Option::is_none"
    )]
    pub floatid: Option<u64>,
    pub floatvalue: f32,
    pub paintseed: u16,
    pub defindex: u16,
    pub paintindex: u16,
    pub rarity: u8,
    pub quality: u8,
    pub origin: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killeatervalue: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customname: Option<String>,
    pub stickers: Vec<Sticker>,
    pub keychains: Vec<Keychain>,
    #[serde(flatten)]
    pub rank: Rank,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemInfo {
    /// StatTrak items carry a kill counter, even when it reads 0
    pub fn is_stattrak(&self) -> bool {
        self.killeatervalue.is_some()
    }

    pub fn is_souvenir(&self) -> bool {
        self.quality == SOUVENIR_QUALITY
    }

    /// Build the response for a freshly inspected item
    pub fn from_inspected(item: &InspectedItem, rank: Rank) -> Self {
        Self {
            s: item.s,
            a: item.a,
            d: item.d,
            m: item.m,
            floatid: None,
            floatvalue: item.floatvalue,
            paintseed: item.paintseed,
            defindex: item.defindex,
            paintindex: item.paintindex,
            rarity: item.rarity,
            quality: item.quality,
            origin: item.origin,
            killeatervalue: item.killeatervalue,
            customname: item.customname.clone(),
            stickers: item.stickers.clone(),
            keychains: item.keychains.clone(),
            rank,
            extra: serde_json::Map::new(),
        }
    }
}

fn u64_as_str<S: serde::Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

fn opt_u64_as_str<S: serde::Serializer>(
    value: &Option<u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(u64),
}

fn u64_from_str_or_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn opt_u64_from_str_or_num<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    match Option::<StrOrNum>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StrOrNum::Num(n)) => Ok(Some(n)),
        Some(StrOrNum::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
