use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

fn promote_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(".market_commodity_orders_header_promote").unwrap())
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d,]+\.\d{2})").unwrap())
}

fn g_rg_listing_info_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"g_rgListingInfo\s*=\s*(\{.*?\});").unwrap())
}

/// The page embeds two `market_commodity_orders_header_promote` spans: the first holds the
/// order count, the second (last) the "for sale starting at" price. Taking the first would
/// silently misreport a count as a price.
pub fn parse_promoted_price(html: &str) -> Option<i64> {
    let doc = Html::parse_document(html);
    let spans: Vec<_> = doc.select(promote_selector()).collect();
    let last = spans.last()?;
    let text: String = last.text().collect();
    let captures = money_re().captures(&text)?;
    let raw = captures.get(1)?.as_str().replace(',', "");
    let value: f64 = raw.parse().ok()?;
    Some((value * 100.0).round() as i64)
}

/// Falls back to the embedded `g_rgListingInfo` JSON blob, reading only `lowest_price`
/// fields — the sibling `price` field is per-listing and not representative.
pub fn parse_g_rg_listing_info(html: &str) -> Option<i64> {
    let captures = g_rg_listing_info_re().captures(html)?;
    let json_str = captures.get(1)?.as_str();
    let value: serde_json::Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;
    obj.values()
        .filter_map(|entry| entry.get("lowest_price").and_then(|p| p.as_i64()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_last_promote_span_not_the_count() {
        let html = r#"
            <span class="market_commodity_orders_header_promote">17</span>
            <span class="market_commodity_orders_header_promote">$5.14</span>
        "#;
        assert_eq!(parse_promoted_price(html), Some(514));
    }

    #[test]
    fn reads_lowest_price_never_price_field() {
        let html = r#"
        <script>
        var g_rgListingInfo = {"12345": {"price": 9999, "lowest_price": 420}};
        </script>
        "#;
        assert_eq!(parse_g_rg_listing_info(html), Some(420));
    }

    #[test]
    fn missing_promote_span_returns_none() {
        assert_eq!(parse_promoted_price("<div>nothing here</div>"), None);
    }
}
