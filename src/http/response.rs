//! Simulated HTTP response.
//!
//! A [`Response`] is produced by the resolver and stored as-is in the cache,
//! so cloning it must stay cheap: the raw body lives in a shared [`Bytes`].

use std::time::SystemTime;

use bytes::Bytes;
use serde_json::Value;

use super::Headers;

/// A resolved mock response.
///
/// # Examples
///
/// ```
/// use mockroute::http::Response;
/// use serde_json::json;
///
/// let response = Response::new(201)
///     .header("Content-Type", "application/json")
///     .json_body(json!({"id": 7}))
///     .unwrap();
///
/// assert!(response.is_success());
/// assert_eq!(response.content_type(), Some("application/json"));
/// assert_eq!(response.raw_body().as_ref(), br#"{"id":7}"#);
/// assert!(response.cached_at().is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status_code: u16,
    headers: Headers,
    raw_body: Bytes,
    parsed_body: Value,
    cached_at: Option<SystemTime>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            raw_body: Bytes::new(),
            parsed_body: Value::Null,
            cached_at: None,
        }
    }

    /// Sets a response header. A later call with the same name (any case) replaces it.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Replaces the whole header map.
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body from a structured value, encoding it as compact JSON.
    ///
    /// A `null` value leaves the raw body empty.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the value cannot be encoded.
    pub fn json_body(mut self, body: Value) -> Result<Self, serde_json::Error> {
        self.raw_body = if body.is_null() {
            Bytes::new()
        } else {
            Bytes::from(serde_json::to_vec(&body)?)
        };
        self.parsed_body = body;
        Ok(self)
    }

    /// Returns the status code of this response.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns `true` for status codes in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Returns the response headers.
    pub fn header_map(&self) -> &Headers {
        &self.headers
    }

    /// Returns the `Content-Type` header value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Returns the encoded body bytes.
    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Returns the structured body the raw bytes were encoded from.
    pub fn parsed_body(&self) -> &Value {
        &self.parsed_body
    }

    /// Decodes the raw body into `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.raw_body)
    }

    /// Returns when this response was stored in the cache, if it was.
    pub fn cached_at(&self) -> Option<SystemTime> {
        self.cached_at
    }

    pub(crate) fn stamp_cached_at(&mut self, at: SystemTime) {
        self.cached_at = Some(at);
    }
}
