//! Built-in fallback responses used when a config has no `globalDefaults`.

use std::collections::HashMap;

use serde_json::json;

use super::ResponseSpec;

/// Status class of the generic success fallback.
pub const SUCCESS_CLASS: &str = "2xx";

/// The generic success response: `200 {"status": "success"}`.
pub fn success_response() -> ResponseSpec {
    ResponseSpec::json(200, json!({ "status": "success" }))
}

fn error_response(status_code: u16, message: &str) -> ResponseSpec {
    ResponseSpec::json(status_code, json!({ "status": "error", "message": message }))
}

/// Returns the built-in table keyed by status class.
pub fn default_responses() -> HashMap<String, ResponseSpec> {
    HashMap::from([
        (SUCCESS_CLASS.to_string(), success_response()),
        ("400".to_string(), error_response(400, "Bad request")),
        ("401".to_string(), error_response(401, "Unauthorized")),
        ("403".to_string(), error_response(403, "Forbidden")),
        ("404".to_string(), error_response(404, "Not found")),
        ("5xx".to_string(), error_response(500, "Internal server error")),
    ])
}
