//! Route resolution — turn a route name into a simulated [`Response`].
//!
//! [`Resolver`] owns the configuration and one response [`Cache`]. For each
//! call it:
//!
//! 1. looks the route up by name;
//! 2. picks the effective cache policy (the route's own when it enables
//!    caching, the global one otherwise);
//! 3. serves cacheable `GET` routes from the cache when possible;
//! 4. otherwise materializes the explicit expected response, or a fallback
//!    from the route table, then the global table, then the global success
//!    entry;
//! 5. stores successful cacheable responses;
//! 6. waits out the route's simulated delay unless the caller cancels first.
//!
//! The resolver holds no lock of its own, so it can be shared behind an
//! [`Arc`] and called from any number of tasks.

use std::borrow::Cow;
use std::future::{self, Future};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::sweeper::DEFAULT_SWEEP_INTERVAL;
use crate::cache::{Cache, Sweeper};
use crate::config::defaults::{self, SUCCESS_CLASS};
use crate::config::{CachePolicy, Config, ConfigError, ResponseSpec, RouteExpectation};
use crate::http::Response;

pub mod key;

pub use key::cache_key;

/// Status the fallback lookup targets when a route has no explicit response.
const TARGET_STATUS: u16 = 200;

/// Errors returned by the resolve operations.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("route {0} not found in configuration")]
    RouteNotFound(String),

    #[error("failed to encode response body: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("request for route {route} was cancelled")]
    Cancelled { route: String },

    #[error("request for route {route} timed out after {after:?}")]
    Timeout { route: String, after: Duration },
}

/// Resolves named routes into mock responses, caching idempotent ones.
///
/// # Examples
///
/// ```
/// use mockroute::config::{CachePolicy, Config, ResponseSpec, RouteExpectation};
/// use mockroute::http::Method;
/// use mockroute::resolver::Resolver;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default().route(
///     "hello",
///     RouteExpectation::new(Method::Get, "/hello")
///         .expect(ResponseSpec::json(200, json!({"message": "hi"})))
///         .cache(CachePolicy::enabled(60)),
/// );
///
/// let resolver = Resolver::new(config);
/// let first = resolver.resolve("hello").await?;
/// let second = resolver.resolve("hello").await?;
///
/// assert_eq!(first.status_code(), 200);
/// assert_eq!(first.cached_at(), second.cached_at());
/// resolver.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Resolver {
    config: Config,
    cache: Arc<Cache<Response>>,
    sweeper: Sweeper,
}

impl Resolver {
    /// Creates a resolver with the default sweep interval.
    ///
    /// Defaults are applied to `config` if the caller has not done so. Must be
    /// called inside a tokio runtime: the cache sweeper is spawned here.
    pub fn new(config: Config) -> Self {
        Self::with_sweep_interval(config, DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates a resolver whose cache is swept every `interval`.
    ///
    /// Intervals shorter than [`MIN_SWEEP_INTERVAL`] are raised to it.
    ///
    /// [`MIN_SWEEP_INTERVAL`]: crate::cache::sweeper::MIN_SWEEP_INTERVAL
    pub fn with_sweep_interval(config: Config, interval: Duration) -> Self {
        let config = config.apply_defaults();
        let cache = Arc::new(Cache::with_capacity(config.global_cache.max_entries));
        let sweeper = Sweeper::spawn(Arc::clone(&cache), interval);
        info!(
            routes = config.routes.len(),
            max_entries = config.global_cache.max_entries,
            "resolver ready"
        );
        Self {
            config,
            cache,
            sweeper,
        }
    }

    /// Loads a JSON config file and builds a resolver from it.
    ///
    /// Like [`new`](Self::new), must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::new(Config::load(path)?))
    }

    /// Parses a JSON config document and builds a resolver from it.
    ///
    /// Like [`new`](Self::new), must be called inside a tokio runtime.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(Config::from_json(json)?))
    }

    /// The configuration this resolver serves, with defaults applied.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of entries currently held by the cache, expired ones included.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Resolves `route_name`, waiting out any simulated delay in full.
    pub async fn resolve(&self, route_name: &str) -> Result<Response, ResolveError> {
        self.resolve_with_cancellation(future::pending::<()>(), route_name)
            .await
    }

    /// Resolves `route_name`, abandoning the simulated delay if `cancel`
    /// completes first.
    ///
    /// `cancel` can be any future: a oneshot receiver, a sleep, a
    /// cancellation token's `cancelled()`. It is only polled while the delay
    /// is pending.
    ///
    /// # Errors
    ///
    /// [`ResolveError::RouteNotFound`] for an unknown route,
    /// [`ResolveError::Encoding`] if the body cannot be serialized, and
    /// [`ResolveError::Cancelled`] if `cancel` wins the race. A cancelled call
    /// returns no response; anything already stored in the cache stays there.
    pub async fn resolve_with_cancellation<C>(
        &self,
        cancel: C,
        route_name: &str,
    ) -> Result<Response, ResolveError>
    where
        C: Future<Output = ()>,
    {
        let (response, delay) = self.resolve_now(route_name)?;

        let Some(delay) = delay else {
            return Ok(response);
        };

        debug!(route = %route_name, delay_ms = delay.as_millis() as u64, "simulating latency");
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(route = %route_name, "resolve cancelled during simulated latency");
                Err(ResolveError::Cancelled {
                    route: route_name.to_owned(),
                })
            }
            _ = tokio::time::sleep(delay) => Ok(response),
        }
    }

    /// Resolves `route_name`, failing with [`ResolveError::Timeout`] if the
    /// simulated delay is still running after `after`.
    pub async fn resolve_with_timeout(
        &self,
        after: Duration,
        route_name: &str,
    ) -> Result<Response, ResolveError> {
        self.resolve_with_cancellation(tokio::time::sleep(after), route_name)
            .await
            .map_err(|e| match e {
                ResolveError::Cancelled { route } => ResolveError::Timeout { route, after },
                other => other,
            })
    }

    /// Drops every cached response.
    pub fn invalidate_all(&self) {
        self.cache.clear();
        info!("response cache cleared");
    }

    /// Drops every cached response belonging to `route_name`.
    pub fn invalidate_route(&self, route_name: &str) {
        let prefix = key::route_prefix(route_name);
        let removed = self.cache.remove_matching(|k| k.starts_with(&prefix));
        info!(route = %route_name, removed, "route cache invalidated");
    }

    /// Stops the background sweeper and waits for it to exit.
    pub async fn shutdown(self) {
        self.sweeper.shutdown().await;
    }

    // Everything up to (not including) the simulated delay. Returns the
    // response and the delay still to be served; cache hits carry none.
    fn resolve_now(
        &self,
        route_name: &str,
    ) -> Result<(Response, Option<Duration>), ResolveError> {
        let route = self
            .config
            .routes
            .get(route_name)
            .ok_or_else(|| ResolveError::RouteNotFound(route_name.to_owned()))?;

        let policy = self.effective_policy(route);
        let key = (policy.enabled && route.method.is_cacheable())
            .then(|| cache_key(route_name, route));

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                debug!(route = %route_name, key = %key, "cache hit");
                return Ok((hit, None));
            }
            debug!(route = %route_name, key = %key, "cache miss");
        }

        let spec = self.select_spec(route);
        let mut response = build_response(&spec)?;

        if let Some(key) = key {
            if response.is_success() {
                response.stamp_cached_at(SystemTime::now());
                let ttl = policy.effective_ttl();
                debug!(route = %route_name, key = %key, ttl_secs = ttl.as_secs(), "caching response");
                self.cache.set(key, response.clone(), ttl);
            }
        }

        Ok((response, route.simulated_delay()))
    }

    fn effective_policy(&self, route: &RouteExpectation) -> CachePolicy {
        if route.cache.enabled {
            route.cache
        } else {
            self.config.global_cache
        }
    }

    // Explicit response first; otherwise route table (exact status), global
    // table (exact status), global table (success class), in that order.
    fn select_spec<'a>(&'a self, route: &'a RouteExpectation) -> Cow<'a, ResponseSpec> {
        if let Some(spec) = &route.expected_response {
            return Cow::Borrowed(spec);
        }

        let exact = TARGET_STATUS.to_string();
        route
            .default_responses
            .get(&exact)
            .or_else(|| self.config.global_default(&exact))
            .or_else(|| self.config.global_default(SUCCESS_CLASS))
            .map_or_else(|| Cow::Owned(defaults::success_response()), Cow::Borrowed)
    }
}

fn build_response(spec: &ResponseSpec) -> Result<Response, ResolveError> {
    Response::new(spec.status_code)
        .headers(spec.headers.clone())
        .json_body(spec.body.clone())
        .map_err(ResolveError::Encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Instant;
    use tokio::sync::oneshot;

    fn test_config() -> Config {
        Config {
            global_defaults: Some(defaults::default_responses()),
            global_cache: CachePolicy::enabled(300),
            routes: HashMap::new(),
        }
        .route(
            "test-route",
            RouteExpectation::new(Method::Get, "/test").expect(ResponseSpec::json(
                200,
                json!({"message": "test response"}),
            )),
        )
        .route(
            "timeout-route",
            RouteExpectation::new(Method::Get, "/timeout").delay(1),
        )
    }

    #[tokio::test]
    async fn resolves_explicit_response() {
        let resolver = Resolver::new(test_config());
        let resp = resolver.resolve("test-route").await.unwrap();

        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.content_type(), Some("application/json"));
        let body: Value = resp.json().unwrap();
        assert_eq!(body, json!({"message": "test response"}));
        assert!(resp.cached_at().is_some());
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let resolver = Resolver::new(test_config());
        let first = resolver.resolve("test-route").await.unwrap();
        let second = resolver.resolve("test-route").await.unwrap();

        assert_eq!(first.cached_at(), second.cached_at());
        assert_eq!(first, second);
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[tokio::test]
    async fn unknown_route_leaves_cache_alone() {
        let resolver = Resolver::new(test_config());
        let err = resolver.resolve("non-existent").await.unwrap_err();

        assert!(matches!(err, ResolveError::RouteNotFound(name) if name == "non-existent"));
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn cancellation_beats_simulated_delay() {
        let resolver = Resolver::new(test_config());
        let started = Instant::now();

        let err = resolver
            .resolve_with_cancellation(
                tokio::time::sleep(Duration::from_millis(500)),
                "timeout-route",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn timeout_variant_reports_duration() {
        let resolver = Resolver::new(test_config());
        let err = resolver
            .resolve_with_timeout(Duration::from_millis(100), "timeout-route")
            .await
            .unwrap_err();

        match err {
            ResolveError::Timeout { route, after } => {
                assert_eq!(route, "timeout-route");
                assert_eq!(after, Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn external_signal_cancels() {
        let resolver = Resolver::new(test_config());
        let (tx, rx) = oneshot::channel::<()>();
        let _ = tx.send(());

        let err = resolver
            .resolve_with_cancellation(
                async {
                    let _ = rx.await;
                },
                "timeout-route",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn delay_completes_without_cancellation() {
        let resolver = Resolver::new(test_config());
        let started = Instant::now();
        let resp = resolver.resolve("timeout-route").await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(resp.json::<Value>().unwrap(), json!({"status": "success"}));
    }

    #[tokio::test]
    async fn cache_write_precedes_delay() {
        let resolver = Resolver::new(test_config());
        let _ = resolver
            .resolve_with_timeout(Duration::from_millis(50), "timeout-route")
            .await;
        assert_eq!(resolver.cached_entries(), 1);

        // Hits skip the delay entirely.
        let resp = resolver
            .resolve_with_timeout(Duration::from_millis(50), "timeout-route")
            .await
            .unwrap();
        assert!(resp.cached_at().is_some());
    }

    #[tokio::test]
    async fn non_get_is_never_cached() {
        let config = test_config().route(
            "create",
            RouteExpectation::new(Method::Post, "/items")
                .body(json!({"name": "x"}))
                .expect(ResponseSpec::json(201, json!({"id": 1}))),
        );
        let resolver = Resolver::new(config);
        let resp = resolver.resolve("create").await.unwrap();

        assert_eq!(resp.status_code(), 201);
        assert!(resp.cached_at().is_none());
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn non_success_is_not_cached() {
        let config = test_config().route(
            "missing",
            RouteExpectation::new(Method::Get, "/missing")
                .expect(ResponseSpec::json(404, json!({"error": "nope"}))),
        );
        let resolver = Resolver::new(config);
        let resp = resolver.resolve("missing").await.unwrap();

        assert_eq!(resp.status_code(), 404);
        assert!(resp.cached_at().is_none());
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn disabled_policy_skips_cache() {
        let mut config = test_config();
        config.global_cache.enabled = false;
        let resolver = Resolver::new(config);

        let resp = resolver.resolve("test-route").await.unwrap();
        assert!(resp.cached_at().is_none());
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn route_policy_overrides_disabled_global() {
        let mut config = test_config().route(
            "own-cache",
            RouteExpectation::new(Method::Get, "/own").cache(CachePolicy::enabled(0)),
        );
        config.global_cache.enabled = false;
        let resolver = Resolver::new(config);

        let resp = resolver.resolve("own-cache").await.unwrap();
        assert!(resp.cached_at().is_some());
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[tokio::test]
    async fn route_ttl_overrides_global_ttl() {
        let config = test_config().route(
            "short",
            RouteExpectation::new(Method::Get, "/short").cache(CachePolicy::enabled(1)),
        );
        assert_eq!(config.global_cache.ttl, 300);
        let resolver = Resolver::new(config);

        let first = resolver.resolve("short").await.unwrap();
        let again = resolver.resolve("short").await.unwrap();
        assert_eq!(first.cached_at(), again.cached_at());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let fresh = resolver.resolve("short").await.unwrap();

        assert!(fresh.cached_at().is_some());
        assert_ne!(first.cached_at(), fresh.cached_at());
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[tokio::test]
    async fn duplicate_header_keys_resolve_deterministically() {
        let json = r#"{
            "routes": {
                "hdr": {
                    "method": "GET",
                    "path": "/hdr",
                    "expectedResponse": {
                        "statusCode": 200,
                        "headers": {
                            "content-type": "text/plain",
                            "Content-Type": "application/json"
                        },
                        "body": {"ok": true}
                    }
                }
            }
        }"#;
        for _ in 0..16 {
            let resolver = Resolver::from_json(json).unwrap();
            let resp = resolver.resolve("hdr").await.unwrap();
            assert_eq!(resp.content_type(), Some("application/json"));
            assert_eq!(resp.header_map().len(), 1);
        }
    }

    #[tokio::test]
    async fn fallback_prefers_route_table() {
        let mut config = test_config().route(
            "fb",
            RouteExpectation::new(Method::Get, "/fb")
                .fallback("200", ResponseSpec::json(200, json!({"from": "route"}))),
        );
        if let Some(table) = config.global_defaults.as_mut() {
            table.insert("200".into(), ResponseSpec::json(200, json!({"from": "global"})));
        }
        let resolver = Resolver::new(config);

        let resp = resolver.resolve("fb").await.unwrap();
        assert_eq!(resp.parsed_body(), &json!({"from": "route"}));
    }

    #[tokio::test]
    async fn fallback_then_global_exact_then_global_class() {
        let mut config = test_config().route("plain", RouteExpectation::new(Method::Get, "/p"));
        let resolver = Resolver::new(config.clone());
        let resp = resolver.resolve("plain").await.unwrap();
        assert_eq!(resp.parsed_body(), &json!({"status": "success"}));

        if let Some(table) = config.global_defaults.as_mut() {
            table.insert("200".into(), ResponseSpec::json(200, json!({"from": "global"})));
        }
        let resolver = Resolver::new(config);
        let resp = resolver.resolve("plain").await.unwrap();
        assert_eq!(resp.parsed_body(), &json!({"from": "global"}));
    }

    #[tokio::test]
    async fn missing_success_class_uses_builtin() {
        let mut config = test_config().route("plain", RouteExpectation::new(Method::Get, "/p"));
        config.global_defaults = Some(HashMap::new());
        let resolver = Resolver::new(config);

        let resp = resolver.resolve("plain").await.unwrap();
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.parsed_body(), &json!({"status": "success"}));
    }

    #[tokio::test]
    async fn headers_are_case_normalized() {
        let config = test_config().route(
            "hdr",
            RouteExpectation::new(Method::Get, "/h").expect(
                ResponseSpec::new(200)
                    .header("X-Mock", "yes")
                    .header("Content-Type", "text/plain"),
            ),
        );
        let resolver = Resolver::new(config);
        let resp = resolver.resolve("hdr").await.unwrap();

        assert_eq!(resp.header_map().get("x-mock"), Some("yes"));
        assert_eq!(resp.content_type(), Some("text/plain"));
        assert!(resp.raw_body().is_empty());
    }

    #[tokio::test]
    async fn invalidate_all_clears_cache() {
        let resolver = Resolver::new(test_config());
        let first = resolver.resolve("test-route").await.unwrap();
        resolver.invalidate_all();
        assert_eq!(resolver.cached_entries(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let fresh = resolver.resolve("test-route").await.unwrap();
        assert_ne!(first.cached_at(), fresh.cached_at());
    }

    #[tokio::test]
    async fn invalidate_route_only_touches_that_route() {
        let config = test_config()
            .route("r", RouteExpectation::new(Method::Get, "/r"))
            .route("r2", RouteExpectation::new(Method::Get, "/r2"));
        let resolver = Resolver::new(config);
        for name in ["r", "r2", "test-route"] {
            resolver.resolve(name).await.unwrap();
        }
        assert_eq!(resolver.cached_entries(), 3);

        resolver.invalidate_route("r");

        assert_eq!(resolver.cached_entries(), 2);
        let r_key = cache_key("r", &resolver.config().routes["r"]);
        assert!(resolver.cache.get(&r_key).is_none());
        let r2_key = cache_key("r2", &resolver.config().routes["r2"]);
        assert!(resolver.cache.get(&r2_key).is_some());
    }

    #[tokio::test]
    async fn capacity_bounds_the_response_cache() {
        let mut config = test_config();
        config.global_cache.max_entries = 2;
        for i in 0..4 {
            config = config.route(format!("r{i}"), RouteExpectation::new(Method::Get, format!("/{i}")));
        }
        let resolver = Resolver::new(config);
        for i in 0..4 {
            resolver.resolve(&format!("r{i}")).await.unwrap();
        }
        assert_eq!(resolver.cached_entries(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_share_one_entry() {
        let resolver = Arc::new(Resolver::new(test_config()));
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve("test-route").await })
            })
            .collect();
        for task in tasks {
            let resp = task.await.unwrap().unwrap();
            assert_eq!(resp.status_code(), 200);
        }
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[tokio::test]
    async fn from_json_builds_resolver() {
        let resolver = Resolver::from_json(
            r#"{ "routes": { "ping": { "method": "GET", "path": "/ping" } } }"#,
        )
        .unwrap();
        assert_eq!(resolver.config().global_cache.ttl, 300);
        let resp = resolver.resolve("ping").await.unwrap();
        assert_eq!(resp.status_code(), 200);
        assert!(resp.cached_at().is_none());
        resolver.shutdown().await;
    }

    #[tokio::test]
    async fn from_path_reports_bad_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            Resolver::from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
