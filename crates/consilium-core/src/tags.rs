//! Tag normalization and the OCR tag lifecycle.
//!
//! Tags are ordered, deduplicated string labels. Historic callers sometimes
//! submitted tags as an object of truthy keys; normalization accepts both
//! shapes so old payloads keep working.

use serde_json::Value as JsonValue;

/// Applied when a registration enqueues extraction work.
pub const TAG_OCR_QUEUED: &str = "ocr:queued";
/// Applied when extraction produced usable text.
pub const TAG_OCR_DONE: &str = "ocr:done";
/// Applied when every extraction strategy failed.
pub const TAG_OCR_FAILED: &str = "ocr:failed";

/// Normalize a caller-supplied tag value into an ordered, deduplicated list.
///
/// - A JSON array of strings keeps its order with duplicates dropped.
/// - A JSON object is treated as a truthy-key set (legacy shape); the keys
///   whose values are truthy are collected and sorted for determinism.
/// - Anything else normalizes to an empty list.
pub fn normalize_tags(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => {
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                if let Some(s) = item.as_str() {
                    if !out.iter().any(|t| t == s) {
                        out.push(s.to_string());
                    }
                }
            }
            out
        }
        JsonValue::Object(map) => {
            let mut out: Vec<String> = map
                .iter()
                .filter(|(_, v)| is_truthy(v))
                .map(|(k, _)| k.clone())
                .collect();
            out.sort();
            out
        }
        _ => Vec::new(),
    }
}

/// Replace `from` with `to` in a tag list, preserving order and uniqueness.
///
/// If `from` is absent, `to` is appended. If `to` already exists, `from` is
/// simply removed. The input order of the untouched tags is preserved.
pub fn swap_tag(tags: &[String], from: &str, to: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len() + 1);
    let mut placed = false;
    for tag in tags {
        if tag == from {
            if !placed && !out.iter().any(|t| t == to) {
                out.push(to.to_string());
                placed = true;
            }
            continue;
        }
        if tag == to {
            placed = true;
        }
        if !out.iter().any(|t| t == tag) {
            out.push(tag.clone());
        }
    }
    if !placed && !out.iter().any(|t| t == to) {
        out.push(to.to_string());
    }
    out
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Null => false,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}
