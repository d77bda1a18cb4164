//! Fast-path cache.
//!
//! Holds the current canvas, per-contributor cooldown markers and the publish/subscribe channel
//! that carries live updates. Nothing stored here is authoritative: the durable placement log can
//! rebuild the canvas after the cache is flushed or restarted.
//!
//! The cache is reached through two traits so components receive an explicitly constructed
//! handle instead of a process-wide client:
//!
//! - [`FastCache`]: hash fields, expiring markers and publishing.
//! - [`CacheSubscriber`]: long-lived channel subscriptions used by the relay.
//!
//! [`MemoryCache`] implements both in-process.

mod keys;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use keys::{CANVAS_HASH, cooldown_key};
pub use memory::{MemoryCache, MemoryCacheOptions};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation `{0}` is not supported by this backend")]
    Unsupported(&'static str),
    #[error("compare-and-set gave up after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error("subscription closed")]
    Disconnected,
    #[error("cached value could not be decoded: {0}")]
    Codec(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// A plain key read together with its write version, used for compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
    pub expires_in: Option<Duration>,
}

#[async_trait]
pub trait FastCache: Send + Sync {
    /// Set `field` inside hash `key`, overwriting any previous value.
    async fn hash_set(&self, key: &str, field: &str, value: String) -> Result<(), CacheError>;

    /// Set `field` only when it is absent. Returns whether the value was written.
    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> Result<bool, CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, CacheError>;

    /// Atomically create `key` with an expiry unless a live value exists.
    ///
    /// Backends without this primitive return [`CacheError::Unsupported`]; callers then fall
    /// back to [`FastCache::get_versioned`] plus [`FastCache::compare_and_set`].
    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Read a live (unexpired) plain key and its version.
    async fn get_versioned(&self, key: &str) -> Result<Option<VersionedValue>, CacheError>;

    /// Write `key` with an expiry if its current version matches `expected`.
    ///
    /// `expected == None` succeeds only when no live value exists.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Remaining lifetime of a live key; `None` when absent or expired.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Publish to a channel. Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

#[async_trait]
pub trait CacheSubscriber: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, CacheError>;
}

/// A live channel subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. Returns [`CacheError::Disconnected`] once the subscription is
    /// gone and must be re-established.
    async fn next_message(&mut self) -> Result<String, CacheError>;
}
