use std::collections::HashMap;

use serde::Deserialize;

/// Shape of the marketplace `render/` JSON response: a page of listings, the associated
/// asset metadata keyed by `(appid, contextid, assetid)`, and a snippet of rendered HTML
/// that carries per-listing stickers and the inspect link the JSON payload omits.
#[derive(Debug, Deserialize, Default)]
pub struct RenderResponse {
    pub success: bool,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub pagesize: u64,
    #[serde(default)]
    pub assets: HashMap<String, HashMap<String, HashMap<String, AssetEntry>>>,
    #[serde(default)]
    pub listinginfo: HashMap<String, ListingEntry>,
    #[serde(default)]
    pub results_html: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AssetEntry {
    pub id: String,
    #[serde(default)]
    pub market_hash_name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<Description>,
    #[serde(default)]
    pub asset_properties: Vec<AssetProperty>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Description {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: String,
}

/// One entry of a `render/` response asset's `asset_properties` array. Real payloads carry
/// either a `float_value` (the wear float) or a string `value` (e.g. the pattern seed as
/// text); `propertyid` identifies which. Per the upstream convention: `propertyid == 1` is
/// always the pattern seed, and the float lives under whichever entry's `propertyname`
/// mentions "float".
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AssetProperty {
    #[serde(default)]
    pub propertyid: i64,
    #[serde(default)]
    pub propertyname: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub float_value: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingEntry {
    pub listingid: String,
    pub asset: AssetRef,
    pub converted_price: i64,
    pub converted_fee: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetRef {
    pub appid: u64,
    pub contextid: String,
    pub id: String,
}

impl ListingEntry {
    /// The buyer-facing total (`market_listing_price_with_fee`'s JSON equivalent): the
    /// seller's proceeds plus Steam's cut, not the seller-side `converted_price` alone.
    pub fn total_price_cents(&self) -> i64 {
        self.converted_price + self.converted_fee
    }
}

impl RenderResponse {
    pub fn asset_for(&self, listing: &ListingEntry) -> Option<&AssetEntry> {
        self.assets
            .get(&listing.asset.appid.to_string())?
            .get(&listing.asset.contextid)?
            .get(&listing.asset.id)
    }
}
