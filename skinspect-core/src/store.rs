//! SQLite-backed item store.
//!
//! # Layout
//!
//! ```text
//! items    PRIMARY KEY (a)
//!          UNIQUE (defindex, paintindex, paintwear, paintseed)
//!          UNIQUE (floatid)
//! history  PRIMARY KEY (floatid, a)
//! ```
//!
//! All writes for one batch happen inside a single transaction. The history
//! rules run in Rust ([`crate::history`]) between reading the existing row
//! and writing the merged one, so concurrent writers serialized by SQLite can
//! never duplicate a row or regress its asset id.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, warn};

use crate::encoding::{
    int_to_wear, is_steam_id, signed_to_unsigned, unsigned_to_signed, wear_to_int,
    ItemProperties,
};
use crate::error::{StoreError, StoreResult};
use crate::history::{before_insert, before_update, HistoryEntry};
use crate::item::{InspectedItem, ItemInfo, Keychain, Rank, Sticker};
use crate::rarity::{
    display_wear, rank_from_count, FloatDistribution, FloatRarity, PatternStats,
    PercentileSpan, WearCounts, RANK_HORIZON,
};
use crate::row::{HistoryRow, ItemRow, StoredKeychain, StoredSticker};

/// Asset ids per lookup statement
pub const LOOKUP_CHUNK_SIZE: usize = 100;

/// Newest history entries returned per item
pub const HISTORY_LIMIT: u32 = 50;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        ms           INTEGER NOT NULL,
        a            INTEGER NOT NULL PRIMARY KEY,
        d            INTEGER NOT NULL,
        paintseed    INTEGER NOT NULL,
        paintwear    INTEGER NOT NULL,
        defindex     INTEGER NOT NULL,
        paintindex   INTEGER NOT NULL,
        stattrak     INTEGER NOT NULL,
        souvenir     INTEGER NOT NULL,
        props        INTEGER NOT NULL,
        stickers     TEXT,
        keychains    TEXT,
        updated      INTEGER NOT NULL,
        rarity       INTEGER NOT NULL,
        floatid      INTEGER,
        price        INTEGER,
        listed_price INTEGER
    );
    CREATE TABLE IF NOT EXISTS history (
        floatid    INTEGER NOT NULL,
        a          INTEGER NOT NULL,
        steamid    INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        price      INTEGER,
        PRIMARY KEY (floatid, a)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS i_unique_item ON items (defindex, paintindex, paintwear, paintseed);
    CREATE UNIQUE INDEX IF NOT EXISTS i_unique_fid ON items (floatid);
    CREATE INDEX IF NOT EXISTS i_paintwear ON items (paintwear);
    CREATE INDEX IF NOT EXISTS i_template ON items (defindex, paintindex, stattrak, souvenir, paintwear);
    CREATE INDEX IF NOT EXISTS i_history_created ON history (floatid, created_at);
";

const ROW_COLUMNS: &str = "ms, a, d, paintseed, paintwear, defindex, paintindex, stattrak, \
     souvenir, props, rarity, stickers, keychains, updated, floatid, price, listed_price";

/// A cached item plus the stored price, which is never sent to callers
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem {
    pub info: ItemInfo,
    pub price: Option<i32>,
}

/// Item store over one SQLite connection
pub struct ItemStore {
    conn: Connection,
}

impl ItemStore {
    /// Open (or create) a store file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            ",
        )?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create tables and indexes if missing
    pub fn ensure_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Read the stored items for `asset_ids`, each with its rank.
    ///
    /// Unknown ids are simply absent from the result.
    pub fn lookup_many(&self, asset_ids: &[u64]) -> StoreResult<Vec<CachedItem>> {
        let mut found = Vec::new();

        for chunk in asset_ids.chunks(LOOKUP_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT {ROW_COLUMNS} FROM items WHERE a IN ({placeholders})");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(|a| unsigned_to_signed(*a))),
                    read_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            for row in rows {
                let rank = self.rank_row(&row)?;
                let price = row.price;
                found.push(CachedItem { info: decode_row(row, rank)?, price });
            }
        }

        debug!(requested = asset_ids.len(), found = found.len(), "Looked up cached items");
        Ok(found)
    }

    /// Insert or merge a batch of inspection results; returns rows written.
    pub fn upsert_batch(&mut self, items: &[(InspectedItem, Option<i32>)]) -> StoreResult<usize> {
        self.upsert_batch_at(items, Utc::now().timestamp_millis())
    }

    /// [`Self::upsert_batch`] with an explicit write time (unix millis)
    pub fn upsert_batch_at(
        &mut self,
        items: &[(InspectedItem, Option<i32>)],
        now_ms: i64,
    ) -> StoreResult<usize> {
        let mut rows: Vec<ItemRow> = Vec::with_capacity(items.len());
        for (item, price) in items {
            let Some(row) = ItemRow::prepare(item, *price, now_ms)? else {
                continue;
            };
            // Two writes of the same key in one batch would fight each other
            if rows.iter().any(|r| r.unique_key() == row.unique_key()) {
                continue;
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut written = 0;
        for row in rows {
            if merge_row(&tx, row)? {
                written += 1;
            }
        }
        tx.commit()?;

        debug!(written, "Inserted/updated items");
        Ok(written)
    }

    /// Set the stored price of the item currently at `asset_id`
    pub fn update_price(&self, asset_id: u64, price: i32) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE items SET price = ?1 WHERE a = ?2",
            params![price, unsigned_to_signed(asset_id)],
        )?;
        Ok(changed > 0)
    }

    /// Rank of the item currently at `asset_id`; empty when unknown
    pub fn rank(&self, asset_id: u64) -> StoreResult<Rank> {
        match self.find_row(asset_id)? {
            Some(row) => self.rank_row(&row),
            None => Ok(Rank::default()),
        }
    }

    /// Rarity of `wear` among all observed items of a defindex/paintindex.
    ///
    /// Unlike [`Self::rank`] this does not separate StatTrak or souvenir
    /// variants.
    pub fn rarity(&self, defindex: u16, paintindex: u16, wear: f32) -> StoreResult<FloatRarity> {
        let paintwear = wear_to_int(wear);
        let (total, better, worse, best, worst, average): (
            i64,
            i64,
            i64,
            Option<i32>,
            Option<i32>,
            Option<f64>,
        ) = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN paintwear < ?1 THEN 1 END),
                    COUNT(CASE WHEN paintwear > ?1 THEN 1 END),
                    MIN(paintwear),
                    MAX(paintwear),
                    AVG(paintwear)
             FROM items
             WHERE defindex = ?2 AND paintindex = ?3",
            params![paintwear, defindex, paintindex],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )?;

        let (Some(best), Some(worst), Some(average)) = (best, worst, average) else {
            return Ok(FloatRarity::no_data());
        };

        Ok(FloatRarity::from_counts(
            wear,
            &WearCounts {
                total: total as u64,
                better: better as u64,
                worse: worse as u64,
                best,
                worst,
                average,
            },
        ))
    }

    /// Wear distribution and pattern variety of a defindex/paintindex
    pub fn pattern_stats(&self, defindex: u16, paintindex: u16) -> StoreResult<Option<PatternStats>> {
        let (total, unique, average, min, max): (i64, i64, Option<f64>, Option<i32>, Option<i32>) =
            self.conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT paintseed), AVG(paintwear), MIN(paintwear), MAX(paintwear)
                 FROM items
                 WHERE defindex = ?1 AND paintindex = ?2",
                params![defindex, paintindex],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )?;

        let (Some(average), Some(min), Some(max)) = (average, min, max) else {
            return Ok(None);
        };
        let total = total as u64;

        let quartile = |fraction: f64| -> StoreResult<f64> {
            let span = PercentileSpan::new(total, fraction);
            let lower = self.wear_at_offset(defindex, paintindex, span.lower)?;
            let upper = self.wear_at_offset(defindex, paintindex, span.upper)?;
            Ok(display_wear(span.interpolate(lower, upper) as i32))
        };

        Ok(Some(PatternStats {
            total_items: total,
            unique_patterns: unique as u64,
            float_distribution: FloatDistribution {
                min: display_wear(min),
                q1: quartile(0.25)?,
                median: quartile(0.5)?,
                q3: quartile(0.75)?,
                max: display_wear(max),
                mean: display_wear(average as i32),
            },
        }))
    }

    /// Archived owners/listings of an item, newest first
    pub fn ownership_history(&self, float_id: u64) -> StoreResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT a, steamid, created_at, price
             FROM history
             WHERE floatid = ?1
             ORDER BY created_at DESC, a DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![unsigned_to_signed(float_id), HISTORY_LIMIT], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, Option<i32>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(a, steamid, created_at, price)| {
                let date = DateTime::<Utc>::from_timestamp_millis(created_at)
                    .ok_or_else(|| StoreError::corrupt("history.created_at", created_at.to_string()))?;
                Ok(HistoryEntry {
                    asset_id: signed_to_unsigned(a),
                    steam_id: signed_to_unsigned(steamid),
                    date,
                    price,
                })
            })
            .collect()
    }

    /// Stored row for the item currently at `asset_id`
    pub fn find_row(&self, asset_id: u64) -> StoreResult<Option<ItemRow>> {
        let sql = format!("SELECT {ROW_COLUMNS} FROM items WHERE a = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![unsigned_to_signed(asset_id)], read_row)
            .optional()?)
    }

    /// Number of stored items
    pub fn item_count(&self) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn rank_row(&self, row: &ItemRow) -> StoreResult<Rank> {
        let count = |comparison: &str| -> StoreResult<u32> {
            let sql = format!(
                "SELECT COUNT(*) FROM (
                    SELECT 1 FROM items
                    WHERE defindex = ?1 AND paintindex = ?2 AND stattrak = ?3 AND souvenir = ?4
                      AND paintwear {comparison} ?5
                    LIMIT ?6
                 )"
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let n: i64 = stmt.query_row(
                params![
                    row.defindex,
                    row.paintindex,
                    row.stattrak,
                    row.souvenir,
                    row.paintwear,
                    RANK_HORIZON
                ],
                |r| r.get(0),
            )?;
            Ok(n as u32)
        };

        Ok(Rank {
            low_rank: rank_from_count(count("<")?),
            high_rank: rank_from_count(count(">")?),
        })
    }

    fn wear_at_offset(&self, defindex: u16, paintindex: u16, offset: u64) -> StoreResult<i32> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT paintwear FROM items
             WHERE defindex = ?1 AND paintindex = ?2
             ORDER BY paintwear
             LIMIT 1 OFFSET ?3",
        )?;
        Ok(stmt.query_row(params![defindex, paintindex, offset as i64], |r| r.get(0))?)
    }
}

/// Merge one prepared row; returns whether anything was written to `items`
fn merge_row(tx: &Transaction<'_>, incoming: ItemRow) -> StoreResult<bool> {
    let (defindex, paintindex, paintwear, paintseed) = incoming.unique_key();
    let sql = format!(
        "SELECT {ROW_COLUMNS} FROM items
         WHERE defindex = ?1 AND paintindex = ?2 AND paintwear = ?3 AND paintseed = ?4"
    );
    let existing = tx
        .query_row(&sql, params![defindex, paintindex, paintwear, paintseed], read_row)
        .optional()?;

    let Some(old) = existing else {
        insert_row(tx, &before_insert(incoming))?;
        return Ok(true);
    };

    let outcome = before_update(&old, incoming.merged_onto(&old));

    if let Some(history) = &outcome.history {
        insert_history(tx, history)?;
    }

    match outcome.row {
        Some(row) => {
            update_row(tx, old.asset_id, &row)?;
            Ok(true)
        }
        None => {
            warn!(
                current = signed_to_unsigned(old.asset_id),
                "Discarded out-of-order item update"
            );
            Ok(false)
        }
    }
}

fn insert_row(tx: &Transaction<'_>, row: &ItemRow) -> StoreResult<()> {
    tx.prepare_cached(
        "INSERT INTO items (ms, a, d, paintseed, paintwear, defindex, paintindex, stattrak,
                            souvenir, props, rarity, stickers, keychains, updated, floatid,
                            price, listed_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?
    .execute(params![
        row.ms,
        row.asset_id,
        row.d,
        row.paintseed,
        row.paintwear,
        row.defindex,
        row.paintindex,
        row.stattrak,
        row.souvenir,
        row.props,
        row.rarity,
        row.stickers,
        row.keychains,
        row.updated,
        row.float_id,
        row.price,
        row.listed_price,
    ])?;
    Ok(())
}

fn update_row(tx: &Transaction<'_>, current_asset_id: i64, row: &ItemRow) -> StoreResult<()> {
    tx.prepare_cached(
        "UPDATE items
         SET ms = ?1, a = ?2, d = ?3, stickers = ?4, keychains = ?5, updated = ?6,
             floatid = ?7, price = ?8, listed_price = ?9
         WHERE a = ?10",
    )?
    .execute(params![
        row.ms,
        row.asset_id,
        row.d,
        row.stickers,
        row.keychains,
        row.updated,
        row.float_id,
        row.price,
        row.listed_price,
        current_asset_id,
    ])?;
    Ok(())
}

fn insert_history(tx: &Transaction<'_>, history: &HistoryRow) -> StoreResult<()> {
    tx.prepare_cached(
        "INSERT OR IGNORE INTO history (floatid, a, steamid, created_at, price)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        history.float_id,
        history.asset_id,
        history.steam_id,
        history.created_at,
        history.price,
    ])?;
    Ok(())
}

fn read_row(r: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        ms: r.get(0)?,
        asset_id: r.get(1)?,
        d: r.get(2)?,
        paintseed: r.get(3)?,
        paintwear: r.get(4)?,
        defindex: r.get(5)?,
        paintindex: r.get(6)?,
        stattrak: r.get(7)?,
        souvenir: r.get(8)?,
        props: r.get(9)?,
        rarity: r.get(10)?,
        stickers: r.get(11)?,
        keychains: r.get(12)?,
        updated: r.get(13)?,
        float_id: r.get(14)?,
        price: r.get(15)?,
        listed_price: r.get(16)?,
    })
}

/// Decode a stored row back into the caller-facing shape
fn decode_row(row: ItemRow, rank: Rank) -> StoreResult<ItemInfo> {
    let stickers: Vec<Sticker> = match row.stickers.as_deref() {
        Some(json) => serde_json::from_str::<Vec<StoredSticker>>(json)?
            .into_iter()
            .map(Sticker::from)
            .collect(),
        None => Vec::new(),
    };
    let keychains: Vec<Keychain> = match row.keychains.as_deref() {
        Some(json) => serde_json::from_str::<Vec<StoredKeychain>>(json)?
            .into_iter()
            .map(Keychain::from)
            .collect(),
        None => Vec::new(),
    };

    let props = ItemProperties::unpack(row.props);
    let ms = signed_to_unsigned(row.ms);
    let (s, m) = if is_steam_id(ms) { (ms, 0) } else { (0, ms) };

    Ok(ItemInfo {
        s,
        a: signed_to_unsigned(row.asset_id),
        d: signed_to_unsigned(row.d),
        m,
        floatid: row.float_id.map(signed_to_unsigned),
        floatvalue: int_to_wear(row.paintwear),
        paintseed: row.paintseed,
        defindex: row.defindex,
        paintindex: row.paintindex,
        rarity: props.rarity,
        quality: props.quality,
        origin: props.origin,
        // the kill count itself is not stored
        killeatervalue: row.stattrak.then_some(0),
        customname: None,
        stickers,
        keychains,
        rank,
        extra: serde_json::Map::new(),
    })
}
