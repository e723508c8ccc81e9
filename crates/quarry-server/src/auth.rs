//! API-key extraction.
//!
//! The raw key is digested immediately; nothing downstream of this module
//! ever sees it. Carriers are checked in priority order: `x-api-key`
//! header, `Authorization: Bearer`, `apiKey` query parameter.

use axum::http::HeaderMap;
use quarry_core::digest_api_key;

/// Extract the API key from the request, if any, and return its digest.
pub fn extract_key_digest(headers: &HeaderMap, params: &[(String, String)]) -> Option<String> {
    raw_key(headers, params)
        .filter(|k| !k.is_empty())
        .map(|k| digest_api_key(&k))
}

fn raw_key(headers: &HeaderMap, params: &[(String, String)]) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.trim().to_string());
    }
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    params
        .iter()
        .find(|(k, _)| k == "apiKey")
        .map(|(_, v)| v.trim().to_string())
}
