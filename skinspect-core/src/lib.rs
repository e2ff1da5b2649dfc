// skinspect core library
//
// Item storage, wear encoding, ownership history and rarity ranking

pub mod encoding;
pub mod error;
pub mod history;
pub mod item;
pub mod rarity;
pub mod row;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use history::{HistoryEntry, TradeRisk};
pub use item::{InspectedItem, ItemInfo, Keychain, Rank, Sticker};
pub use rarity::{FloatRarity, PatternStats, RarityTier};
pub use store::{CachedItem, ItemStore};
