//! In-memory TTL cache with an optional capacity bound.
//!
//! [`Cache`] maps string keys to immutable snapshots. Every entry carries its
//! own expiry; expired entries read as absent but are only deleted by a write
//! ([`Cache::clean_expired_entries`], usually driven by a [`Sweeper`]).
//!
//! A single read-write lock guards the whole map. Reads share the lock; every
//! mutation (set, eviction, sweep, clear, prefix removal) takes it exclusively,
//! so a reader never observes a half-evicted or half-swept map.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, trace};

pub mod sweeper;

pub use sweeper::Sweeper;

// Stored snapshot. Replaced wholesale on overwrite, never mutated.
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    // Insertion sequence; orders entries whose `created_at` compare equal.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

/// Concurrency-safe key → value store with per-entry TTL.
///
/// With a capacity set, a write that finds the map full first evicts the
/// single oldest entry (smallest creation time). A capacity of zero means the
/// cache grows without bound.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mockroute::cache::Cache;
///
/// let cache = Cache::with_capacity(2);
/// cache.set("a", 1, Duration::from_secs(60));
/// cache.set("b", 2, Duration::from_secs(60));
/// cache.set("c", 3, Duration::from_secs(60));
///
/// assert_eq!(cache.len(), 2);
/// assert_eq!(cache.get("a"), None);
/// assert_eq!(cache.get("c"), Some(3));
/// ```
#[derive(Debug)]
pub struct Cache<V> {
    inner: RwLock<Inner<V>>,
    max_entries: Option<NonZeroUsize>,
}

impl<V: Clone> Cache<V> {
    /// Creates an unbounded cache.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a cache holding at most `max_entries` entries (`0` = unbounded).
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            max_entries: NonZeroUsize::new(max_entries),
        }
    }

    /// Returns the capacity bound, if any.
    pub fn max_entries(&self) -> Option<NonZeroUsize> {
        self.max_entries
    }

    /// Returns a clone of the live value stored under `key`.
    ///
    /// Entries whose expiry is at or before now read as absent. The entry is
    /// left in place for the sweeper.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let inner = self.inner.read();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// When the cache is at capacity the oldest entry is evicted first. The
    /// check looks at current occupancy only, so overwriting a key that is
    /// already present still evicts the oldest entry, which may be a
    /// different key.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.write();

        if let Some(max) = self.max_entries {
            if inner.entries.len() >= max.get() {
                if let Some(victim) = oldest_key(&inner.entries) {
                    debug!(key = %victim, "cache full, evicting oldest entry");
                    inner.entries.remove(&victim);
                }
            }
        }

        let now = Instant::now();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                seq,
            },
        );
    }

    /// Deletes every entry whose expiry is at or before now.
    ///
    /// Returns the number of entries removed.
    pub fn clean_expired_entries(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        trace!(removed, remaining = inner.entries.len(), "expired entries swept");
        removed
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }

    /// Removes every entry whose key satisfies `predicate`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !predicate(key));
        before - inner.entries.len()
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Returns `true` if an entry (live or expired) is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

// Compares creation times explicitly instead of trusting map iteration order.
fn oldest_key<V>(entries: &HashMap<String, CacheEntry<V>>) -> Option<String> {
    entries
        .iter()
        .min_by_key(|(_, entry)| (entry.created_at, entry.seq))
        .map(|(key, _)| key.clone())
}
