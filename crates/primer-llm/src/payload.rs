//! Tolerant extraction of structured payloads from model output.
//!
//! Models asked for "JSON only" still wrap the payload in markdown fences or
//! surround it with prose. Every parse of model output in this workspace goes
//! through here; a non-conforming response yields `None`, never an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// Strip an optional markdown code fence and deserialize into `T`.
/// Use `serde_json::Value` as the target for free-form payloads.
#[must_use]
pub fn extract_payload<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let text = unfence(raw);
    serde_json::from_str(text).ok()
}

fn unfence(raw: &str) -> &str {
    let text = raw.trim();
    match FENCE_RE.captures(text) {
        Some(caps) => caps.get(1).map_or(text, |m| m.as_str().trim()),
        None => text,
    }
}
