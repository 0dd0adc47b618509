use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Rebuilds every object in `value` as a `BTreeMap` so keys are sorted
/// lexicographically at every nesting level. Arrays keep their order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Re-escapes every non-ASCII char in a JSON string as `\uXXXX`, matching
/// Python's `json.dumps(..., ensure_ascii=True)`.
fn ascii_safe_encode(value: &Value) -> String {
    let text = value.to_string();
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

/// Computes the content fingerprint of a product snapshot, excluding `raw`.
/// `fields` is the product's own JSON value (title/url/price/etc, `raw`
/// already removed by the caller); `media` is the ordered list of
/// `(media_type, source_url)` pairs contributed by the current media set.
pub fn compute_fingerprint(fields: &Value, media: &[(String, String)]) -> String {
    let mut root = match fields.clone() {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    root.remove("raw");

    let media_value: Vec<Value> = media
        .iter()
        .map(|(media_type, source_url)| {
            let mut m = serde_json::Map::new();
            m.insert("media_type".to_string(), Value::String(media_type.clone()));
            m.insert("source_url".to_string(), Value::String(source_url.clone()));
            Value::Object(m)
        })
        .collect();
    root.insert("media".to_string(), Value::Array(media_value));

    let canonical = canonicalize(&Value::Object(root));
    let encoded = ascii_safe_encode(&canonical);

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

/// `dedupe_key = sha256("{product_key}:{version}:{event_type}")`.
pub fn build_dedupe_key(product_key: &str, version: i32, event_type: &str) -> String {
    let input = format!("{}:{}:{}", product_key, version, event_type);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
