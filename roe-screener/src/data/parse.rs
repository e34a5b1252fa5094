//! Tolerant parsing of upstream field values.
//!
//! Upstream payloads mix numbers, numeric strings and assorted placeholders
//! for "no value". Everything here maps to `Option` and never fails.

use serde_json::Value;

/// Placeholder strings that mean "no value" (compared case-insensitively).
const PLACEHOLDERS: &[&str] = &["", "-", "--", "nan", "none", "null", "n/a"];

/// Parse a numeric field. Returns `None` for null, placeholders,
/// non-numeric text and non-finite numbers. A trailing `%` is accepted.
pub fn parse_metric(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_metric_str(s),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Parse a numeric string with the same rules as [`parse_metric`].
pub fn parse_metric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if is_placeholder(trimmed) {
        return None;
    }
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    number
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a text field. Returns `None` for null and placeholders.
pub fn parse_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!is_placeholder(trimmed)).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_placeholder(s: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| s.eq_ignore_ascii_case(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(12.5), Some(12.5) ; "number")]
    #[test_case(json!("8.75"), Some(8.75) ; "numeric string")]
    #[test_case(json!(" 3.2% "), Some(3.2) ; "percent string")]
    #[test_case(json!("1,234.5"), Some(1234.5) ; "thousands separator")]
    #[test_case(json!(null), None ; "null")]
    #[test_case(json!(""), None ; "empty")]
    #[test_case(json!("-"), None ; "dash")]
    #[test_case(json!("--"), None ; "double dash")]
    #[test_case(json!("NaN"), None ; "nan text")]
    #[test_case(json!("None"), None ; "none text")]
    #[test_case(json!("inf"), None ; "infinite text")]
    #[test_case(json!("abc"), None ; "garbage")]
    #[test_case(json!(true), None ; "boolean")]
    fn test_parse_metric(value: Value, expected: Option<f64>) {
        assert_eq!(parse_metric(Some(&value)), expected);
    }

    #[test]
    fn test_parse_metric_absent() {
        assert_eq!(parse_metric(None), None);
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(
            parse_text(Some(&json!(" 贵州茅台 "))),
            Some("贵州茅台".into())
        );
        assert_eq!(parse_text(Some(&json!("--"))), None);
        assert_eq!(parse_text(Some(&json!(""))), None);
        assert_eq!(parse_text(Some(&json!(null))), None);
        assert_eq!(parse_text(None), None);
    }
}
