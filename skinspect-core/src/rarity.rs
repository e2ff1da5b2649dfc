//! Rank and rarity math over observed wear values.
//!
//! The SQL side (in [`crate::store`]) only counts; everything that turns
//! counts into percentiles, tiers and display values lives here.

use serde::Serialize;

use crate::encoding::int_to_wear;

/// Rows examined per side when ranking; counts at this cap are unranked
pub const RANK_HORIZON: u32 = 1000;

/// Turn a capped "strictly better/worse" count into a 1-based rank
pub fn rank_from_count(count: u32) -> Option<u32> {
    (count < RANK_HORIZON).then_some(count + 1)
}

/// Percentile bucket of a wear value within its template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RarityTier {
    #[serde(rename = "Ultra Rare (Top 0.1%)")]
    UltraRare,
    #[serde(rename = "Extremely Rare (Top 1%)")]
    ExtremelyRare,
    #[serde(rename = "Very Rare (Top 5%)")]
    VeryRare,
    #[serde(rename = "Rare (Top 10%)")]
    Rare,
    #[serde(rename = "Uncommon (Top 25%)")]
    Uncommon,
    Common,
}

impl RarityTier {
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile < 0.1 {
            RarityTier::UltraRare
        } else if percentile < 1.0 {
            RarityTier::ExtremelyRare
        } else if percentile < 5.0 {
            RarityTier::VeryRare
        } else if percentile < 10.0 {
            RarityTier::Rare
        } else if percentile < 25.0 {
            RarityTier::Uncommon
        } else {
            RarityTier::Common
        }
    }
}

/// Raw counts for one template, as returned by the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WearCounts {
    pub total: u64,
    pub better: u64,
    pub worse: u64,
    pub best: i32,
    pub worst: i32,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WearStatistics {
    pub best_float: f64,
    pub worst_float: f64,
    pub avg_float: f64,
}

/// Rarity of a wear value relative to every observed item of its template
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FloatRarity {
    #[serde(rename_all = "camelCase")]
    Ranked {
        float_value: f32,
        rarity_score: f64,
        rarity_tier: RarityTier,
        percentile: f64,
        total_seen: u64,
        better_floats: u64,
        worse_floats: u64,
        statistics: WearStatistics,
    },
    #[serde(rename_all = "camelCase")]
    NoData { error: &'static str, total_seen: u64 },
}

impl FloatRarity {
    pub fn no_data() -> Self {
        FloatRarity::NoData {
            error: "No data available for this item",
            total_seen: 0,
        }
    }

    /// Compute percentile, score and tier from template counts
    pub fn from_counts(float_value: f32, counts: &WearCounts) -> Self {
        if counts.total == 0 {
            return Self::no_data();
        }

        let percentile = counts.better as f64 / counts.total as f64 * 100.0;
        let rarity_score = 100.0 - percentile;

        FloatRarity::Ranked {
            float_value,
            rarity_score: round_to(rarity_score, 2),
            rarity_tier: RarityTier::from_percentile(percentile),
            percentile: round_to(percentile, 2),
            total_seen: counts.total,
            better_floats: counts.better,
            worse_floats: counts.worse,
            statistics: WearStatistics {
                best_float: display_wear(counts.best),
                worst_float: display_wear(counts.worst),
                avg_float: display_wear(counts.average as i32),
            },
        }
    }
}

/// Float distribution of one template
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FloatDistribution {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStats {
    pub total_items: u64,
    pub unique_patterns: u64,
    pub float_distribution: FloatDistribution,
}

/// Rows bracketing a continuous percentile over `count` ascending values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSpan {
    /// 0-based offset of the lower neighbour
    pub lower: u64,
    /// 0-based offset of the upper neighbour
    pub upper: u64,
    weight: f64,
}

impl PercentileSpan {
    pub fn new(count: u64, fraction: f64) -> Self {
        let position = fraction * count.saturating_sub(1) as f64;
        let lower = position.floor();
        Self {
            lower: lower as u64,
            upper: position.ceil() as u64,
            weight: position - lower,
        }
    }

    /// Linear interpolation between the two neighbouring wear ints
    pub fn interpolate(&self, lower: i32, upper: i32) -> f64 {
        let lo = f64::from(lower);
        lo + (f64::from(upper) - lo) * self.weight
    }
}

/// Decode a wear int and round for display
pub fn display_wear(paintwear: i32) -> f64 {
    round_to(f64::from(int_to_wear(paintwear)), 8)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
