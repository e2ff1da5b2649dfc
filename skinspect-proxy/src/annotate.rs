//! Display metadata added to items before they are returned.
//!
//! The catalog file is plain JSON keyed by definition and paint index:
//!
//! ```json
//! {
//!   "weapons": { "7": "AK-47" },
//!   "paints": { "44": "Case Hardened" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use skinspect_core::ItemInfo;
use tracing::info;

/// Adds display fields to an item in place
pub trait Annotator: Send + Sync {
    fn annotate(&self, item: &mut ItemInfo);
}

/// Leaves items untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Annotator for PassThrough {
    fn annotate(&self, _item: &mut ItemInfo) {}
}

/// Wear bucket name for a float value
pub fn wear_name(floatvalue: f32) -> &'static str {
    match floatvalue {
        f if f < 0.07 => "Factory New",
        f if f < 0.15 => "Minimal Wear",
        f if f < 0.38 => "Field-Tested",
        f if f < 0.45 => "Well-Worn",
        _ => "Battle-Scarred",
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    weapons: HashMap<u16, String>,
    #[serde(default)]
    paints: HashMap<u16, String>,
}

/// Names weapons and paints from a catalog file
#[derive(Debug, Default)]
pub struct CatalogAnnotator {
    weapons: HashMap<u16, String>,
    paints: HashMap<u16, String>,
}

impl CatalogAnnotator {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_json::from_str(json).context("Invalid catalog JSON")?;
        Ok(Self { weapons: file.weapons, paints: file.paints })
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let catalog = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            weapons = catalog.weapons.len(),
            paints = catalog.paints.len(),
            "Loaded item catalog"
        );
        Ok(catalog)
    }
}

impl Annotator for CatalogAnnotator {
    fn annotate(&self, item: &mut ItemInfo) {
        let weapon = self.weapons.get(&item.defindex);
        let paint = self.paints.get(&item.paintindex);

        if let Some(weapon) = weapon {
            item.extra.insert("weapon_type".into(), Value::from(weapon.as_str()));
        }
        if let Some(paint) = paint {
            item.extra.insert("item_name".into(), Value::from(paint.as_str()));
        }

        // Vanilla knives and zero-wear items have no wear bucket
        let has_wear = item.paintindex != 0 && item.floatvalue > 0.0;
        if has_wear {
            item.extra.insert("wear_name".into(), Value::from(wear_name(item.floatvalue)));
        }

        let Some(weapon) = weapon else {
            return;
        };
        let prefix = if item.is_stattrak() {
            "StatTrak™ "
        } else if item.is_souvenir() {
            "Souvenir "
        } else {
            ""
        };
        let mut full = format!("{prefix}{weapon}");
        if let Some(paint) = paint {
            full.push_str(&format!(" | {paint}"));
        }
        if has_wear {
            full.push_str(&format!(" ({})", wear_name(item.floatvalue)));
        }
        item.extra.insert("full_item_name".into(), Value::from(full));
    }
}
