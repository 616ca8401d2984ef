//! Cache key derivation.
//!
//! A key is `"{route}_{METHOD}_{path}"`, followed by the JSON encoding of the
//! query parameters when there are any, followed by the JSON encoding of the
//! request body for non-GET routes that declare one. Query parameters are a
//! sorted map and JSON objects serialize with sorted keys, so equivalent
//! configurations always produce the same key.

use crate::config::RouteExpectation;

/// Separator between the key's leading components.
pub const SEPARATOR: char = '_';

/// Builds the cache key for `route` registered under `route_name`.
pub fn cache_key(route_name: &str, route: &RouteExpectation) -> String {
    let mut key = format!(
        "{route_name}{SEPARATOR}{}{SEPARATOR}{}",
        route.method, route.path
    );

    if !route.query_params.is_empty() {
        // A string map always serializes.
        if let Ok(query) = serde_json::to_string(&route.query_params) {
            key.push_str(&query);
        }
    }

    if !route.method.is_cacheable() && !route.body.is_null() {
        if let Ok(body) = serde_json::to_string(&route.body) {
            key.push_str(&body);
        }
    }

    key
}

/// The prefix shared by every key of `route_name`.
pub fn route_prefix(route_name: &str) -> String {
    format!("{route_name}{SEPARATOR}")
}
