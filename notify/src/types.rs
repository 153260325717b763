use store::FoundItem;

/// A structured match event handed off by the scraping pipeline after a `FoundItem` row
/// commits. The dispatcher treats the messenger as best-effort: nothing in this crate can
/// cause a caller to undo the insert that produced this event.
#[derive(Debug, Clone)]
pub struct MatchFoundEvent {
    pub task_name: String,
    pub hash_name: String,
    pub item: FoundItem,
}

impl MatchFoundEvent {
    /// English-only text rendering; deliberately not HTML/Markdown-escaped, since the
    /// Telegram API call sends it as plain text.
    pub fn summary(&self) -> String {
        format!(
            "{} matched on task \"{}\": listing {} at {:.2}",
            self.hash_name,
            self.task_name,
            self.item.listing_id,
            self.item.price_cents as f64 / 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::ParsedListing;

    #[test]
    fn summary_renders_price_in_major_units() {
        let event = MatchFoundEvent {
            task_name: "AK Redline watch".into(),
            hash_name: "AK-47 | Redline (Field-Tested)".into(),
            item: FoundItem {
                id: 1,
                task_id: 42,
                listing_id: "723456".into(),
                hash_name: "AK-47 | Redline (Field-Tested)".into(),
                price_cents: 742,
                item_data: ParsedListing {
                    listing_id: "723456".into(),
                    price_cents: 742,
                    float_value: None,
                    pattern: None,
                    stickers: vec![],
                    inspect_link: None,
                    total_stickers_price_cents: 0,
                },
                inspect_link: None,
                notification_status: "pending".into(),
                discovered_at_ms: 0,
            },
        };

        let summary = event.summary();
        assert!(summary.contains("AK-47 | Redline (Field-Tested)"));
        assert!(summary.contains("AK Redline watch"));
        assert!(summary.contains("723456"));
        assert!(summary.contains("7.42"));
    }
}
