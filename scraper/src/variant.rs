use store::FilterSpec;

use crate::client::MarketplaceClient;

/// Wear suffixes that make a hash name concrete. A name carrying one of these needs no
/// variant expansion.
const WEAR_SUFFIXES: &[&str] = &[
    "(Factory New)",
    "(Minimal Wear)",
    "(Field-Tested)",
    "(Well-Worn)",
    "(Battle-Scarred)",
];

pub fn is_ambiguous(hash_name: &str) -> bool {
    !WEAR_SUFFIXES.iter().any(|suffix| hash_name.ends_with(suffix))
}

/// Expands an ambiguous hash name ("AK-47 | Redline") into the concrete wear variants the
/// marketplace's search suggestions return ("AK-47 | Redline (Field-Tested)", the StatTrak
/// prefixed form, etc.), then narrows to `filter.enabled_variants` when the task specified
/// one. An unset `enabled_variants` processes every discovered variant.
pub async fn resolve_variants(
    client: &dyn MarketplaceClient,
    hash_name: &str,
    filter: &FilterSpec,
) -> anyhow::Result<Vec<String>> {
    if !is_ambiguous(hash_name) {
        return Ok(vec![hash_name.to_string()]);
    }

    let suggestions = client.search_suggestions(hash_name).await?;
    let discovered: Vec<String> = suggestions
        .into_iter()
        .filter(|name| name.starts_with(hash_name) || name.contains(hash_name))
        .collect();

    Ok(match &filter.enabled_variants {
        Some(enabled) => discovered.into_iter().filter(|v| enabled.contains(v)).collect(),
        None => discovered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::ScrapeError;
    use store::FilterSpec;

    #[test]
    fn concrete_wear_names_are_not_ambiguous() {
        assert!(!is_ambiguous("AK-47 | Redline (Field-Tested)"));
        assert!(is_ambiguous("AK-47 | Redline"));
    }

    struct FakeClient {
        suggestions: Vec<String>,
    }

    #[async_trait]
    impl MarketplaceClient for FakeClient {
        async fn fetch_render_page(
            &self,
            _appid: i64,
            _hash_name: &str,
            _start: u32,
            _currency: &str,
        ) -> Result<crate::page::RenderResponse, ScrapeError> {
            unimplemented!()
        }
        async fn search_suggestions(&self, _query: &str) -> Result<Vec<String>, ScrapeError> {
            Ok(self.suggestions.clone())
        }
    }

    #[tokio::test]
    async fn only_enabled_variants_are_returned() {
        let client = FakeClient {
            suggestions: vec![
                "AK-47 | Redline (Field-Tested)".to_string(),
                "AK-47 | Redline (Factory New)".to_string(),
                "StatTrak\u{2122} AK-47 | Redline (Field-Tested)".to_string(),
            ],
        };
        let mut filter = FilterSpec::default();
        filter.enabled_variants = Some(vec!["AK-47 | Redline (Field-Tested)".to_string()]);
        let variants = resolve_variants(&client, "AK-47 | Redline", &filter).await.unwrap();
        assert_eq!(variants, vec!["AK-47 | Redline (Field-Tested)".to_string()]);
    }

    #[tokio::test]
    async fn unset_enabled_variants_processes_everything_discovered() {
        let client = FakeClient {
            suggestions: vec!["AK-47 | Redline (Field-Tested)".to_string(), "AK-47 | Redline (Factory New)".to_string()],
        };
        let variants = resolve_variants(&client, "AK-47 | Redline", &FilterSpec::default()).await.unwrap();
        assert_eq!(variants.len(), 2);
    }

    #[tokio::test]
    async fn concrete_hash_name_skips_network_entirely() {
        let client = FakeClient { suggestions: vec!["should not be used".to_string()] };
        let variants = resolve_variants(&client, "AK-47 | Redline (Field-Tested)", &FilterSpec::default())
            .await
            .unwrap();
        assert_eq!(variants, vec!["AK-47 | Redline (Field-Tested)".to_string()]);
    }
}
