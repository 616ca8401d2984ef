//! Route configuration consumed by the resolver.
//!
//! The on-disk format is JSON:
//!
//! ```json
//! {
//!   "globalDefaults": { "2xx": { "statusCode": 200, "headers": {}, "body": {} } },
//!   "globalCache": { "enabled": true, "ttl": 300, "maxEntries": 100 },
//!   "routes": {
//!     "users": { "method": "GET", "path": "/users", "timeout": 0 }
//!   }
//! }
//! ```
//!
//! [`Config::apply_defaults`] fills in what the file leaves out; the loaders in
//! this module call it for you.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::http::{Headers, Method};

pub mod defaults;

/// TTL used when a cache policy leaves `ttl` at zero.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Errors produced while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration: fallback responses, the global cache policy and
/// the named routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Fallback responses keyed by status class (`"2xx"`, `"404"`, ...).
    /// `None` until defaults are applied.
    #[serde(default)]
    pub global_defaults: Option<HashMap<String, ResponseSpec>>,
    #[serde(default)]
    pub global_cache: CachePolicy,
    #[serde(default)]
    pub routes: HashMap<String, RouteExpectation>,
}

impl Config {
    /// Reads and parses a JSON config file, then applies defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not a valid config document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_slice(&data)?;
        Ok(config.apply_defaults())
    }

    /// Parses a JSON config document, then applies defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config.apply_defaults())
    }

    /// Installs the built-in fallback table when none is configured and the
    /// default global TTL when it is zero.
    #[must_use]
    pub fn apply_defaults(mut self) -> Self {
        if self.global_defaults.is_none() {
            self.global_defaults = Some(defaults::default_responses());
        }
        if self.global_cache.ttl == 0 {
            self.global_cache.ttl = DEFAULT_TTL_SECS;
        }
        self
    }

    /// Adds (or replaces) a route. Handy for building configs in code.
    #[must_use]
    pub fn route(mut self, name: impl Into<String>, route: RouteExpectation) -> Self {
        self.routes.insert(name.into(), route);
        self
    }

    /// Returns the fallback response configured for `class` in the global table.
    pub fn global_default(&self, class: &str) -> Option<&ResponseSpec> {
        self.global_defaults.as_ref()?.get(class)
    }
}

/// Caching behaviour for the whole config or a single route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Time-to-live in seconds. Zero means "use the default".
    #[serde(default, alias = "ttlSeconds")]
    pub ttl: u64,
    /// Capacity bound. Zero means unbounded. Only the global value sizes the cache.
    #[serde(default)]
    pub max_entries: usize,
}

impl CachePolicy {
    /// An enabled policy with the given TTL in seconds.
    pub fn enabled(ttl: u64) -> Self {
        Self {
            enabled: true,
            ttl,
            max_entries: 0,
        }
    }

    /// The TTL to store entries with, substituting the default for zero.
    pub fn effective_ttl(&self) -> Duration {
        match self.ttl {
            0 => Duration::from_secs(DEFAULT_TTL_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// A configured mock route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteExpectation {
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub path: String,
    /// Request headers the route expects. Not part of the cache key.
    #[serde(default)]
    pub headers: Headers,
    /// Query parameters; kept sorted so the cache key is canonical.
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    /// Request body. Part of the cache key for non-GET routes.
    #[serde(default)]
    pub body: Value,
    /// Simulated latency in whole seconds.
    #[serde(default, rename = "timeout")]
    pub delay_secs: u64,
    #[serde(default)]
    pub expected_response: Option<ResponseSpec>,
    #[serde(default)]
    pub default_responses: HashMap<String, ResponseSpec>,
    #[serde(default)]
    pub cache: CachePolicy,
}

impl RouteExpectation {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn expect(mut self, response: ResponseSpec) -> Self {
        self.expected_response = Some(response);
        self
    }

    #[must_use]
    pub fn fallback(mut self, class: impl Into<String>, response: ResponseSpec) -> Self {
        self.default_responses.insert(class.into(), response);
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn delay(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    #[must_use]
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    /// The simulated latency, or `None` when the route responds immediately.
    pub fn simulated_delay(&self) -> Option<Duration> {
        (self.delay_secs > 0).then(|| Duration::from_secs(self.delay_secs))
    }
}

/// A response template: status, headers and a structured body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    #[serde(default)]
    pub status_code: u16,
    /// Case-insensitive; a later duplicate in the document overrides an earlier one.
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Value,
}

impl ResponseSpec {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// A JSON response with `Content-Type: application/json`.
    pub fn json(status_code: u16, body: Value) -> Self {
        Self::new(status_code)
            .header("Content-Type", "application/json")
            .body(body)
    }
}
