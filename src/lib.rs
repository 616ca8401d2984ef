//! # mockroute
//!
//! Configuration-driven mock HTTP responses with a concurrent TTL cache.
//!
//! Routes are declared in a [`Config`]; a [`Resolver`] turns a route name into
//! a simulated [`Response`] without touching the network, caching successful
//! `GET` responses and honouring each route's simulated latency.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mockroute::Resolver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::from_path("routes.json")?;
//!     let response = resolver.resolve("users").await?;
//!     println!("{} {:?}", response.status_code(), response.raw_body());
//!     resolver.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod resolver;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{Cache, Sweeper};
pub use config::{CachePolicy, Config, ConfigError, ResponseSpec, RouteExpectation};
pub use http::{Headers, Method, Response};
pub use resolver::{ResolveError, Resolver};
