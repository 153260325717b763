use common::ScrapeError;
use store::{FilterSpec, ParsedListing, StickerFilter, StickerInfo};

/// Sums resolved sticker prices into the total sticker price `P`. Any unresolved sticker
/// (`price_cents: None`) or a suspicious exact-zero alongside otherwise-priced stickers makes
/// `P` unusable for any sticker-dependent filter: the caller must skip evaluation rather than
/// silently treat a missing lookup as "free".
fn total_sticker_price_cents(stickers: &[StickerInfo]) -> Result<i64, ScrapeError> {
    if stickers.is_empty() {
        return Ok(0);
    }
    if stickers.iter().any(|s| s.price_cents.is_none()) {
        return Err(ScrapeError::FilterEvaluationSkipped("one or more sticker prices unresolved".into()));
    }
    let prices: Vec<i64> = stickers.iter().map(|s| s.price_cents.unwrap()).collect();
    let any_nonzero = prices.iter().any(|&p| p > 0);
    if any_nonzero && prices.iter().any(|&p| p == 0) {
        return Err(ScrapeError::FilterEvaluationSkipped(
            "a sticker priced at exactly 0 alongside priced stickers looks like a failed lookup".into(),
        ));
    }
    Ok(prices.iter().sum())
}

fn apply_sticker_filter(
    sf: &StickerFilter,
    listing_price_cents: i64,
    total_stickers_price_cents: i64,
    clean_reference_price_cents: Option<i64>,
) -> Result<bool, ScrapeError> {
    match sf {
        StickerFilter::TotalPriceRange { min_cents, max_cents } => {
            let p = total_stickers_price_cents;
            Ok(min_cents.map(|m| p >= m).unwrap_or(true) && max_cents.map(|m| p <= m).unwrap_or(true))
        }
        StickerFilter::MinTotalStickersPrice { min_cents } => Ok(total_stickers_price_cents >= *min_cents),
        StickerFilter::MaxOverpayCoefficient { k } => {
            if total_stickers_price_cents == 0 {
                return Err(ScrapeError::FilterEvaluationSkipped("overpay coefficient undefined when P = 0".into()));
            }
            let Some(clean) = clean_reference_price_cents else {
                return Err(ScrapeError::FilterEvaluationSkipped("no clean reference price available".into()));
            };
            let coefficient = (listing_price_cents - clean) as f64 / total_stickers_price_cents as f64;
            Ok(coefficient <= *k)
        }
    }
}

/// Applies a task's filter spec to a parsed listing in cheap-to-expensive order: item name,
/// price bound, float range, pattern set, then the sticker predicate (the only one requiring
/// enrichment). A listing passes iff every specified sub-filter passes.
///
/// `variant_hash_name` is the concrete hash name this listing was scraped under (post wear-
/// variant resolution); `clean_reference_price_cents` is the clean-item reference price used
/// by `MaxOverpayCoefficient`, either user-supplied or derived elsewhere.
pub fn apply_filters(
    listing: &ParsedListing,
    variant_hash_name: &str,
    filter: &FilterSpec,
    clean_reference_price_cents: Option<i64>,
) -> Result<bool, ScrapeError> {
    if let Some(name) = &filter.exact_name {
        if name != variant_hash_name {
            return Ok(false);
        }
    }

    if let Some(max) = filter.max_price_cents {
        if listing.price_cents > max {
            return Ok(false);
        }
    }

    if let Some((lo, hi)) = filter.float_range {
        match listing.float_value {
            Some(f) if f >= lo && f <= hi => {}
            _ => return Ok(false),
        }
    }

    if let Some(patterns) = &filter.patterns {
        match listing.pattern {
            Some(p) if patterns.contains(&p) => {}
            _ => return Ok(false),
        }
    }

    if let Some(sf) = &filter.sticker_filter {
        let total = total_sticker_price_cents(&listing.stickers)?;
        if !apply_sticker_filter(sf, listing.price_cents, total, clean_reference_price_cents)? {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price_cents: i64, float_value: Option<f64>, pattern: Option<i32>, stickers: Vec<StickerInfo>) -> ParsedListing {
        ParsedListing {
            listing_id: "1".into(),
            price_cents,
            float_value,
            pattern,
            stickers,
            inspect_link: None,
            total_stickers_price_cents: 0,
        }
    }

    fn sticker(price_cents: Option<i64>) -> StickerInfo {
        StickerInfo { position: 0, name: "s".into(), price_cents }
    }

    #[test]
    fn float_range_zero_to_zero_only_passes_exact_zero() {
        let filter = FilterSpec { float_range: Some((0.0, 0.0)), ..Default::default() };
        assert!(apply_filters(&listing(100, Some(0.0), None, vec![]), "n", &filter, None).unwrap());
        assert!(!apply_filters(&listing(100, Some(0.0001), None, vec![]), "n", &filter, None).unwrap());
        assert!(!apply_filters(&listing(100, None, None, vec![]), "n", &filter, None).unwrap());
    }

    #[test]
    fn pattern_list_membership_is_exact() {
        let filter = FilterSpec { patterns: Some(vec![999]), ..Default::default() };
        assert!(apply_filters(&listing(100, None, Some(999), vec![]), "n", &filter, None).unwrap());
        assert!(!apply_filters(&listing(100, None, Some(0), vec![]), "n", &filter, None).unwrap());
    }

    #[test]
    fn overpay_coefficient_scenario_c_passes_at_threshold_and_fails_below_it() {
        let stickers = vec![sticker(Some(1000)), sticker(Some(500)), sticker(Some(500))];
        let filter = FilterSpec {
            sticker_filter: Some(StickerFilter::MaxOverpayCoefficient { k: 1.5 }),
            ..Default::default()
        };
        assert!(apply_filters(&listing(6000, None, None, stickers.clone()), "n", &filter, Some(3000)).unwrap());

        let filter_tight = FilterSpec {
            sticker_filter: Some(StickerFilter::MaxOverpayCoefficient { k: 1.49 }),
            ..Default::default()
        };
        assert!(!apply_filters(&listing(6000, None, None, stickers), "n", &filter_tight, Some(3000)).unwrap());
    }

    #[test]
    fn unresolved_sticker_price_skips_evaluation_instead_of_false_passing() {
        let filter = FilterSpec {
            sticker_filter: Some(StickerFilter::MinTotalStickersPrice { min_cents: 0 }),
            ..Default::default()
        };
        let stickers = vec![sticker(Some(100)), sticker(None)];
        let err = apply_filters(&listing(100, None, None, stickers), "n", &filter, None).unwrap_err();
        assert!(matches!(err, ScrapeError::FilterEvaluationSkipped(_)));
    }

    #[test]
    fn suspicious_zero_alongside_priced_stickers_skips_evaluation() {
        let filter = FilterSpec {
            sticker_filter: Some(StickerFilter::MinTotalStickersPrice { min_cents: 0 }),
            ..Default::default()
        };
        let stickers = vec![sticker(Some(500)), sticker(Some(0))];
        let err = apply_filters(&listing(100, None, None, stickers), "n", &filter, None).unwrap_err();
        assert!(matches!(err, ScrapeError::FilterEvaluationSkipped(_)));
    }

    #[test]
    fn exact_name_mismatch_fails_before_any_other_filter_runs() {
        let filter = FilterSpec { exact_name: Some("AK-47 | Redline (Field-Tested)".into()), ..Default::default() };
        assert!(!apply_filters(&listing(100, None, None, vec![]), "AK-47 | Redline (Factory New)", &filter, None).unwrap());
    }
}
