use chrono::NaiveDate;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

/// Formats a date as the `yyyy-mm-dd` key used by report rows.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Removes the QR prefix from a scanned code, leaving the bare payment id.
pub fn strip_scan_prefix<'a>(raw: &'a str, prefix: &str) -> &'a str {
    let raw = raw.trim();
    raw.strip_prefix(prefix).unwrap_or(raw).trim()
}

/// Accepts a JSON number or a numeric string. `null`, a missing field and
/// a blank string all read as `None` so the caller can apply its default.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got {s:?}"))),
        Some(other) => Err(D::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}
