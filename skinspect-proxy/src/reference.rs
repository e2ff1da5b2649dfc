//! Inspect references.
//!
//! A reference arrives either as split query fields (`s`/`m`, `a`, `d`) or as
//! a full inspect link:
//!
//! ```text
//! steam://rungame/730/76561202255233023/+csgo_econ_action_preview S76561198084749846A698323590D7935523998312483177
//! steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20M625254122282020305A6760346663D30614827701953021
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::InspectError;

static LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"csgo_econ_action_preview(?: |%20)([SM])(\d+)A(\d+)D(\d+)$")
        .expect("Invalid inspect link regex")
});

/// Where the item currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Owner account id
    Inventory(u64),
    /// Market listing id
    Listing(u64),
}

/// One item reference: owner-or-listing, asset id and checksum token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InspectReference {
    pub owner: Owner,
    pub asset_id: u64,
    pub checksum: u64,
}

/// Reference fields as they appear in queries and bulk bodies
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub s: Option<String>,
    #[serde(default)]
    pub m: Option<String>,
    #[serde(default)]
    pub a: Option<String>,
    #[serde(default)]
    pub d: Option<String>,
}

impl InspectReference {
    /// Build a reference from split fields.
    ///
    /// Exactly one of `s`/`m` must be non-zero.
    pub fn from_parts(s: &str, m: &str, a: &str, d: &str) -> Result<Self, InspectError> {
        let s = parse_id(s)?;
        let m = parse_id(m)?;
        let owner = match (s, m) {
            (s, 0) if s != 0 => Owner::Inventory(s),
            (0, m) if m != 0 => Owner::Listing(m),
            _ => return Err(InspectError::InvalidReference),
        };

        Ok(Self {
            owner,
            asset_id: parse_id(a)?,
            checksum: parse_id(d)?,
        })
    }

    /// Parse a full inspect link
    pub fn from_link(link: &str) -> Result<Self, InspectError> {
        let caps = LINK_REGEX
            .captures(link.trim())
            .ok_or(InspectError::InvalidReference)?;

        let id = parse_id(&caps[2])?;
        let owner = match &caps[1] {
            "S" => Owner::Inventory(id),
            _ => Owner::Listing(id),
        };
        if id == 0 {
            return Err(InspectError::InvalidReference);
        }

        Ok(Self {
            owner,
            asset_id: parse_id(&caps[3])?,
            checksum: parse_id(&caps[4])?,
        })
    }

    /// Accept whichever form the caller used; a link wins over split fields
    pub fn from_params(params: &ReferenceParams) -> Result<Self, InspectError> {
        if let Some(link) = params.url.as_deref().or(params.link.as_deref()) {
            return Self::from_link(link);
        }

        let (Some(a), Some(d)) = (params.a.as_deref(), params.d.as_deref()) else {
            return Err(InspectError::InvalidReference);
        };
        if params.s.is_none() && params.m.is_none() {
            return Err(InspectError::InvalidReference);
        }

        Self::from_parts(
            params.s.as_deref().unwrap_or("0"),
            params.m.as_deref().unwrap_or("0"),
            a,
            d,
        )
    }

    pub fn is_market_listing(&self) -> bool {
        matches!(self.owner, Owner::Listing(_))
    }

    /// Split `(s, m)` pair as sent upstream
    pub fn owner_fields(&self) -> (u64, u64) {
        match self.owner {
            Owner::Inventory(s) => (s, 0),
            Owner::Listing(m) => (0, m),
        }
    }
}

fn parse_id(value: &str) -> Result<u64, InspectError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InspectError::InvalidReference);
    }
    value.parse().map_err(|_| InspectError::InvalidReference)
}

/// Whether a submitted price is a plain decimal number
pub fn is_only_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_inventory() {
        let r = InspectReference::from_parts("76561198084749846", "0", "698323590", "7935523998312483177")
            .unwrap();
        assert_eq!(r.owner, Owner::Inventory(76_561_198_084_749_846));
        assert_eq!(r.asset_id, 698_323_590);
        assert_eq!(r.checksum, 7_935_523_998_312_483_177);
        assert!(!r.is_market_listing());
        assert_eq!(r.owner_fields(), (76_561_198_084_749_846, 0));
    }

    #[test]
    fn test_from_parts_requires_exactly_one_owner() {
        assert_eq!(
            InspectReference::from_parts("0", "0", "1", "2"),
            Err(InspectError::InvalidReference)
        );
        assert_eq!(
            InspectReference::from_parts("5", "6", "1", "2"),
            Err(InspectError::InvalidReference)
        );
    }

    #[test]
    fn test_from_parts_rejects_non_decimal() {
        for bad in ["", "-1", "12a", "0x10", "18446744073709551616"] {
            assert!(InspectReference::from_parts("5", "0", bad, "2").is_err(), "{bad}");
        }
    }

    #[test]
    fn test_from_link() {
        let r = InspectReference::from_link(
            "steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20M625254122282020305A6760346663D30614827701953021",
        )
        .unwrap();
        assert_eq!(r.owner, Owner::Listing(625_254_122_282_020_305));
        assert_eq!(r.asset_id, 6_760_346_663);
        assert!(r.is_market_listing());

        let r = InspectReference::from_link(
            "steam://rungame/730/76561202255233023/+csgo_econ_action_preview S76561198084749846A698323590D7935523998312483177",
        )
        .unwrap();
        assert_eq!(r.owner, Owner::Inventory(76_561_198_084_749_846));

        assert!(InspectReference::from_link("https://example.com").is_err());
    }

    #[test]
    fn test_from_params_split_fields() {
        let params = ReferenceParams {
            m: Some("625254122282020305".into()),
            a: Some("6760346663".into()),
            d: Some("30614827701953021".into()),
            ..Default::default()
        };
        let r = InspectReference::from_params(&params).unwrap();
        assert_eq!(r.owner, Owner::Listing(625_254_122_282_020_305));

        let missing = ReferenceParams { a: Some("1".into()), d: Some("2".into()), ..Default::default() };
        assert!(InspectReference::from_params(&missing).is_err());
    }

    #[test]
    fn test_is_only_digits() {
        assert!(is_only_digits("1500"));
        assert!(!is_only_digits(""));
        assert!(!is_only_digits("15.00"));
        assert!(!is_only_digits("-3"));
    }
}
