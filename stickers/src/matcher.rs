use std::collections::HashMap;

/// Lowercases, strips punctuation, and collapses whitespace so two spellings of the same
/// sticker ("Crown (Foil)" / "Crown Foil") compare equal. Mirrors
/// `core/utils/sticker_name_matcher.py::normalize_sticker_name`.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

/// Jaccard similarity over normalized whitespace-split tokens, with a containment floor:
/// if one normalized name fully contains the other, the score is never reported below 0.8.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if norm_a == norm_b {
        return 1.0;
    }

    let words_a: std::collections::HashSet<&str> = norm_a.split_whitespace().collect();
    let words_b: std::collections::HashSet<&str> = norm_b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    let mut jaccard = if union == 0 { 0.0 } else { intersection as f64 / union as f64 };

    if norm_a.contains(&norm_b) || norm_b.contains(&norm_a) {
        jaccard = jaccard.max(0.8);
    }
    jaccard
}

pub const TIER_ONE_THRESHOLD: f64 = 0.7;
pub const TIER_TWO_THRESHOLD: f64 = 0.5;

/// Finds the best-scoring entry of `available` for `requested`, first tier at 0.7+, falling
/// back to a looser 0.5+ match only when no tier-one candidate exists.
pub fn find_best_match<'a>(
    requested: &str,
    available: &'a HashMap<String, i64>,
) -> Option<(&'a str, f64)> {
    let requested_norm = normalize(requested);
    for (name, _) in available {
        if normalize(name) == requested_norm {
            return Some((name.as_str(), 1.0));
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (name, _) in available {
        let score = similarity(requested, name);
        if score >= TIER_ONE_THRESHOLD && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((name.as_str(), score));
        }
    }
    if best.is_some() {
        return best;
    }

    for (name, _) in available {
        let score = similarity(requested, name);
        if score >= TIER_TWO_THRESHOLD && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((name.as_str(), score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(normalize("Crown (Foil)"), "crown foil");
        assert_eq!(normalize("Team EnVyUs | Cluj-Napoca 2015"), "team envyus cluj napoca 2015");
    }

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(similarity("Crown (Foil)", "Crown Foil"), 1.0);
    }

    #[test]
    fn containment_floors_at_point_eight() {
        let score = similarity("MOUZ", "MOUZ | Stockholm 2021");
        assert!(score >= 0.8);
    }

    #[test]
    fn disjoint_names_score_low() {
        assert!(similarity("Katowice 2014", "Cologne 2015") < 0.3);
    }

    #[test]
    fn best_match_prefers_tier_one_over_tier_two() {
        let mut available = HashMap::new();
        available.insert("Katowice 2014 Holo".to_string(), 100);
        available.insert("Katowice 2014".to_string(), 200);
        let (name, score) = find_best_match("Katowice 2014", &available).unwrap();
        assert_eq!(name, "Katowice 2014");
        assert_eq!(score, 1.0);
    }
}
