use std::collections::HashMap;

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Currency codes the source tracks against USD. Other codes in the primary response, if
/// any, are ignored rather than rejected — `convert` only ever promises the subset the
/// cache actually holds.
pub const TARGET_CURRENCIES: &[&str] = &["THB", "CNY", "RUB"];

fn script_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)var\s+\w*[Rr]ates\w*\s*=\s*(\{.*?\});").unwrap())
}

/// Strategy 1: the response is already the JSON shape `{"THB": 35.5, "CNY": 7.2, ...}`.
pub fn parse_json_shape(body: &str) -> Option<HashMap<String, f64>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    extract_rates_from_value(&value)
}

/// Strategy 2: an HTML table with a currency-code cell followed by a rate cell per row.
pub fn parse_html_table(body: &str) -> Option<HashMap<String, f64>> {
    let doc = Html::parse_document(body);
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td").ok()?;

    let mut out = HashMap::new();
    for row in doc.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(|c| c.text().collect::<String>().trim().to_string()).collect();
        if cells.len() < 2 {
            continue;
        }
        let code = cells[0].to_uppercase();
        if !TARGET_CURRENCIES.contains(&code.as_str()) {
            continue;
        }
        if let Ok(rate) = cells[1].replace(',', "").parse::<f64>() {
            out.insert(code, rate);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Strategy 3: a `<script>`-embedded JSON object assigned to a `*rates*`-named variable.
pub fn parse_script_embedded_json(body: &str) -> Option<HashMap<String, f64>> {
    let captures = script_json_re().captures(body)?;
    let json_str = captures.get(1)?.as_str();
    let value: serde_json::Value = serde_json::from_str(json_str).ok()?;
    extract_rates_from_value(&value)
}

fn extract_rates_from_value(value: &serde_json::Value) -> Option<HashMap<String, f64>> {
    let obj = value.as_object()?;
    let mut out = HashMap::new();
    for (k, v) in obj {
        let code = k.to_uppercase();
        if let Some(rate) = v.as_f64() {
            out.insert(code, rate);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Tries every shape in order; the first that yields a non-empty rate set wins.
pub fn parse_defensive(body: &str) -> Option<HashMap<String, f64>> {
    parse_json_shape(body)
        .or_else(|| parse_html_table(body))
        .or_else(|| parse_script_embedded_json(body))
}

/// The public fallback API's shape: `{"base": "USD", "rates": {"THB": 35.5, ...}}`.
pub fn parse_fallback_api(body: &str) -> Option<HashMap<String, f64>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let rates = value.get("rates")?;
    extract_rates_from_value(rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_shape() {
        let body = r#"{"THB": 35.5, "CNY": 7.2, "RUB": 90.0}"#;
        let rates = parse_defensive(body).unwrap();
        assert_eq!(rates["THB"], 35.5);
    }

    #[test]
    fn falls_back_to_html_table_when_not_json() {
        let body = "<table><tr><td>THB</td><td>35.5</td></tr><tr><td>CNY</td><td>7.2</td></tr></table>";
        let rates = parse_defensive(body).unwrap();
        assert_eq!(rates["THB"], 35.5);
        assert_eq!(rates["CNY"], 7.2);
    }

    #[test]
    fn falls_back_to_script_embedded_json() {
        let body = r#"<script>var currencyRates = {"THB": 35.5, "RUB": 90.0};</script>"#;
        let rates = parse_defensive(body).unwrap();
        assert_eq!(rates["RUB"], 90.0);
    }

    #[test]
    fn unparseable_body_yields_none() {
        assert!(parse_defensive("not a recognizable shape at all").is_none());
    }

    #[test]
    fn parses_fallback_api_rates_wrapper() {
        let body = r#"{"base":"USD","date":"2026-01-01","rates":{"THB":35.5,"CNY":7.2,"RUB":90.0,"EUR":0.9}}"#;
        let rates = parse_fallback_api(body).unwrap();
        assert_eq!(rates["THB"], 35.5);
        assert_eq!(rates.len(), 4);
    }
}
