use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use store::{ParsedListing, StickerInfo};

use crate::page::{AssetEntry, AssetProperty, RenderResponse};

const MAX_ACCEPTABLE_PRICE_CENTS: i64 = 100_000 * 100;
const MAX_PATTERN: i32 = 99_999;

fn inspect_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(steam://rungame/[^"'\\]+M\d+A\d+D\d+)"#).unwrap())
}

fn sticker_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"title="Sticker:\s*([^"]+)""#).unwrap())
}

fn sticker_icon_slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"econ/sticker/([^".]+)"#).unwrap())
}

fn sticker_img_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("img").unwrap())
}

/// Float lives under whichever `asset_properties` entry's name mentions "float"; pattern
/// seed is always `propertyid == 1`, coerced to an integer and accepted only within the
/// valid pattern range.
fn extract_float_and_pattern(properties: &[AssetProperty]) -> (Option<f64>, Option<i32>) {
    let float_value = properties
        .iter()
        .find(|p| {
            p.propertyname
                .as_deref()
                .map(|n| n.to_lowercase().contains("float"))
                .unwrap_or(false)
        })
        .and_then(|p| p.float_value.or_else(|| p.value.as_deref().and_then(|v| v.parse().ok())));

    let pattern = properties
        .iter()
        .find(|p| p.propertyid == 1)
        .and_then(|p| p.value.as_deref().and_then(|v| v.parse::<i32>().ok()))
        .filter(|&pat| (0..=MAX_PATTERN).contains(&pat));

    (float_value, pattern)
}

/// Parses the sticker_info description's embedded HTML: `<img title="Sticker: NAME">` per
/// applied sticker, positional order preserved, duplicates at different positions kept.
/// When `title` is absent, the name is recovered from the icon URL's slug if present.
fn extract_stickers(asset: &AssetEntry) -> Vec<StickerInfo> {
    let Some(desc) = asset.descriptions.iter().find(|d| d.name.as_deref() == Some("sticker_info")) else {
        return Vec::new();
    };

    let doc = Html::parse_fragment(&desc.value);
    let mut out = Vec::new();
    for (position, img) in doc.select(sticker_img_sel()).enumerate() {
        let title = img.value().attr("title");
        let name = title
            .and_then(|t| sticker_title_re().captures(&format!("title=\"{t}\"")).map(|c| c[1].trim().to_string()))
            .or_else(|| title.map(|t| t.trim().to_string()))
            .or_else(|| {
                img.value()
                    .attr("src")
                    .and_then(|src| sticker_icon_slug_re().captures(src))
                    .map(|c| c[1].replace(['_', '-'], " "))
            });

        let Some(name) = name.filter(|n| !n.is_empty()) else {
            continue;
        };

        out.push(StickerInfo {
            position: position as u32,
            name,
            price_cents: None,
        });
    }
    out
}

fn extract_inspect_link(row_html: &str) -> Option<String> {
    inspect_re().captures(row_html).map(|c| c[1].replace("\\/", "/"))
}

/// Joins the structured `listinginfo`/`assets` maps (authoritative price, float, pattern,
/// stickers) with `results_html` (the only place the inspect link's onclick handler shows
/// up) into one parsed record per listing.
pub fn parse_render_page(resp: &RenderResponse) -> Vec<ParsedListing> {
    let row_sel = Selector::parse("div[id^='listing_']").ok();
    let doc = row_sel.as_ref().map(|_| Html::parse_fragment(&resp.results_html));

    let mut out = Vec::new();

    for (listing_id, entry) in &resp.listinginfo {
        let price_cents = entry.total_price_cents();
        if !(0..MAX_ACCEPTABLE_PRICE_CENTS).contains(&price_cents) {
            continue;
        }

        let asset = resp.asset_for(entry);
        let (float_value, pattern) = asset.map(|a| extract_float_and_pattern(&a.asset_properties)).unwrap_or((None, None));
        let stickers = asset.map(extract_stickers).unwrap_or_default();

        let inspect_link = doc.as_ref().zip(row_sel.as_ref()).and_then(|(doc, sel)| {
            doc.select(sel)
                .find(|el| el.value().attr("id").map(|id| id.contains(listing_id.as_str())).unwrap_or(false))
                .and_then(|row| extract_inspect_link(&row.html()))
        });

        out.push(ParsedListing {
            listing_id: listing_id.clone(),
            price_cents,
            float_value,
            pattern,
            stickers,
            inspect_link,
            total_stickers_price_cents: 0,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{AssetRef, Description, ListingEntry};
    use std::collections::HashMap;

    fn sample_response() -> RenderResponse {
        let mut listinginfo = HashMap::new();
        listinginfo.insert(
            "123".to_string(),
            ListingEntry {
                listingid: "123".to_string(),
                asset: AssetRef { appid: 730, contextid: "2".to_string(), id: "1".to_string() },
                converted_price: 1000,
                converted_fee: 150,
            },
        );

        let mut assets = HashMap::new();
        let mut ctx = HashMap::new();
        ctx.insert(
            "1".to_string(),
            AssetEntry {
                id: "1".to_string(),
                market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
                icon_url: None,
                descriptions: vec![Description {
                    name: Some("sticker_info".to_string()),
                    value: r#"<img title="Sticker: Katowice 2014">"#.to_string(),
                }],
                asset_properties: vec![
                    AssetProperty { propertyid: 2, propertyname: Some("Float Value".to_string()), value: Some("0.1234".to_string()), float_value: None },
                    AssetProperty { propertyid: 1, propertyname: Some("Paint Seed".to_string()), value: Some("55".to_string()), float_value: None },
                ],
            },
        );
        assets.insert("2".to_string(), ctx);
        let mut appid_map = HashMap::new();
        appid_map.insert("730".to_string(), assets);

        RenderResponse {
            success: true,
            total_count: 1,
            pagesize: 20,
            assets: appid_map,
            listinginfo,
            results_html: r#"<div id="listing_123_name">
                <a href="steam://rungame/730/1234/+csgo_econ_action_preview M1A2D3">inspect</a>
            </div>"#.to_string(),
        }
    }

    #[test]
    fn joins_json_price_with_asset_properties_and_html_inspect_link() {
        let parsed = parse_render_page(&sample_response());
        assert_eq!(parsed.len(), 1);
        let listing = &parsed[0];
        assert_eq!(listing.price_cents, 1150);
        assert_eq!(listing.float_value, Some(0.1234));
        assert_eq!(listing.pattern, Some(55));
        assert_eq!(listing.stickers.len(), 1);
        assert_eq!(listing.stickers[0].name, "Katowice 2014");
        assert!(listing.inspect_link.is_some());
    }

    #[test]
    fn pattern_outside_valid_range_is_rejected() {
        let mut resp = sample_response();
        for ctx in resp.assets.get_mut("730").unwrap().values_mut() {
            for asset in ctx.values_mut() {
                for prop in asset.asset_properties.iter_mut() {
                    if prop.propertyid == 1 {
                        prop.value = Some("100000".to_string());
                    }
                }
            }
        }
        let parsed = parse_render_page(&resp);
        assert_eq!(parsed[0].pattern, None);
    }

    #[test]
    fn price_out_of_bounds_drops_the_listing() {
        let mut resp = sample_response();
        resp.listinginfo.get_mut("123").unwrap().converted_price = 100_000_00;
        let parsed = parse_render_page(&resp);
        assert!(parsed.is_empty());
    }
}
