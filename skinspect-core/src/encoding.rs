//! Compact column encodings for item identity and wear.
//!
//! SQLite (like most relational stores) has no unsigned 64-bit integer and no
//! exact way to index an `f32`. Every item column therefore goes through one
//! of the helpers below on the way in and its inverse on the way out.
//!
//! ```text
//!                       rarity     quality    origin
//! props:   00000000   00000000   00000000   00000000
//!          <unused>    8 bits     8 bits     8 bits
//! ```

use serde::{Deserialize, Serialize};

/// Lowest individual-account id (universe 1, type 1, instance 1)
pub const STEAM_ID_BASE: u64 = 76_561_197_960_265_728;

/// Store a wear value as the bit pattern of its `f32`, read as `i32`.
///
/// Wear is always non-negative, so the sign bit is 0 and integer order equals
/// float order.
pub fn wear_to_int(wear: f32) -> i32 {
    wear.to_bits() as i32
}

/// Inverse of [`wear_to_int`]
pub fn int_to_wear(paintwear: i32) -> f32 {
    f32::from_bits(paintwear as u32)
}

/// Map an unsigned 64-bit id into the store's signed column type.
pub fn unsigned_to_signed(value: u64) -> i64 {
    value as i64
}

/// Inverse of [`unsigned_to_signed`]
pub fn signed_to_unsigned(value: i64) -> u64 {
    value as u64
}

/// Whether `value` looks like an individual account id rather than a
/// marketplace listing id.
pub fn is_steam_id(value: u64) -> bool {
    if value < STEAM_ID_BASE {
        return false;
    }
    // universe
    if (value >> 56) > 5 {
        return false;
    }
    // instance
    if ((value >> 32) & ((1 << 20) - 1)) > 32 {
        return false;
    }
    true
}

/// Item properties packed into the `props` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemProperties {
    pub origin: u8,
    pub quality: u8,
    pub rarity: u8,
}

impl ItemProperties {
    pub fn new(origin: u8, quality: u8, rarity: u8) -> Self {
        Self { origin, quality, rarity }
    }

    /// Pack into a single column value
    pub fn pack(&self) -> i32 {
        i32::from(self.origin) | (i32::from(self.quality) << 8) | (i32::from(self.rarity) << 16)
    }

    /// Unpack a `props` column value; bits above 24 are ignored
    pub fn unpack(props: i32) -> Self {
        const MASK: i32 = (1 << 8) - 1;
        Self {
            origin: (props & MASK) as u8,
            quality: ((props >> 8) & MASK) as u8,
            rarity: ((props >> 16) & MASK) as u8,
        }
    }
}
