use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// Largest integer an f64 represents exactly (2^53).
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Normalize an identifier that may arrive as a JSON number or string.
///
/// Integers render without a decimal point, and so do floats holding an
/// integral value (spreadsheet exports often send `7.0` for `7`).
/// Returns `None` for anything that is not a string or number.
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_INT {
                    Some(format!("{}", f as i64))
                } else {
                    Some(n.to_string())
                }
            }
        }
        _ => None,
    }
}

/// Serde helper for `#[serde(deserialize_with = "...")]` on id fields.
///
/// A `null` id becomes the empty string; objects, arrays and booleans are
/// rejected.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(String::new());
    }
    normalize_id(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a string or number id, got {}", value)))
}

/// Strict variant for records that must carry an identifier: `null`, empty
/// strings and non-scalar values are rejected.
pub fn deserialize_required<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match normalize_id(&value) {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(de::Error::custom(format!("expected a non-empty string or number id, got {}", value))),
    }
}
