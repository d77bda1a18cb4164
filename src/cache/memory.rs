//! In-process cache backend.
//!
//! Hashes and markers live in sharded maps; each channel is a `tokio::sync::broadcast` sender.
//! Expiry is evaluated lazily against `tokio::time::Instant` so paused test clocks apply.

use std::collections::HashMap;
use std::collections::hash_map::Entry as HashEntry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::util::sync::{read_or_recover, write_or_recover};

use super::{CacheError, CacheSubscriber, FastCache, Subscription, VersionedValue};

const OWNER: &str = "cache::memory";
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct MemoryCacheOptions {
    /// Messages buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
    /// Offer the atomic set-if-absent-with-expiry primitive. When disabled, callers must
    /// emulate it with compare-and-set.
    pub atomic_set_if_absent: bool,
}

impl Default for MemoryCacheOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            atomic_set_if_absent: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Marker {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Marker {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn versioned(&self, now: Instant) -> VersionedValue {
        VersionedValue {
            value: self.value.clone(),
            version: self.version,
            expires_in: self.expires_at.map(|at| at.saturating_duration_since(now)),
        }
    }
}

pub struct MemoryCache {
    options: MemoryCacheOptions,
    hashes: DashMap<String, HashMap<String, String>>,
    markers: DashMap<String, Marker>,
    versions: AtomicU64,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    available: AtomicBool,
}

impl MemoryCache {
    pub fn new(options: MemoryCacheOptions) -> Self {
        Self {
            options: MemoryCacheOptions {
                channel_capacity: options.channel_capacity.max(1),
                ..options
            },
            hashes: DashMap::new(),
            markers: DashMap::new(),
            versions: AtomicU64::new(1),
            channels: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Drop every stored hash and marker, as after an eviction or restart.
    pub fn flush(&self) {
        self.hashes.clear();
        self.markers.clear();
        debug!(target = "pixelwar::cache", "Memory cache flushed");
    }

    /// Close all live subscriptions. Subscribers observe a disconnect and must re-subscribe.
    pub fn drop_subscriptions(&self) {
        write_or_recover(&self.channels, OWNER, "drop_subscriptions").clear();
    }

    /// Toggle availability. While unavailable every operation fails and subscriptions are closed.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.drop_subscriptions();
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        read_or_recover(&self.channels, OWNER, "subscriber_count")
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::unavailable("memory cache is offline"))
        }
    }

    fn new_marker(&self, value: String, ttl: Duration, now: Instant) -> Marker {
        Marker {
            value,
            version: self.versions.fetch_add(1, Ordering::SeqCst),
            expires_at: Some(now + ttl),
        }
    }

    fn live_marker(&self, key: &str, now: Instant) -> Option<VersionedValue> {
        let found = self
            .markers
            .get(key)
            .filter(|marker| marker.is_live(now))
            .map(|marker| marker.versioned(now));
        if found.is_none() {
            self.markers.remove_if(key, |_, marker| !marker.is_live(now));
        }
        found
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheOptions::default())
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn hash_set(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: String,
    ) -> Result<bool, CacheError> {
        self.ensure_available()?;
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        match hash.entry(field.to_string()) {
            HashEntry::Occupied(_) => Ok(false),
            HashEntry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.ensure_available()?;
        Ok(self
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, CacheError> {
        self.ensure_available()?;
        Ok(self
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.ensure_available()?;
        if !self.options.atomic_set_if_absent {
            return Err(CacheError::Unsupported("set_if_absent_with_expiry"));
        }

        let now = Instant::now();
        match self.markers.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    Ok(false)
                } else {
                    slot.insert(self.new_marker(value, ttl, now));
                    Ok(true)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.new_marker(value, ttl, now));
                Ok(true)
            }
        }
    }

    async fn get_versioned(&self, key: &str) -> Result<Option<VersionedValue>, CacheError> {
        self.ensure_available()?;
        Ok(self.live_marker(key, Instant::now()))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.ensure_available()?;
        let now = Instant::now();
        match self.markers.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                let matches = if current.is_live(now) {
                    expected == Some(current.version)
                } else {
                    expected.is_none()
                };
                if matches {
                    slot.insert(self.new_marker(value, ttl, now));
                }
                Ok(matches)
            }
            Entry::Vacant(slot) => {
                if expected.is_some() {
                    return Ok(false);
                }
                slot.insert(self.new_marker(value, ttl, now));
                Ok(true)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.ensure_available()?;
        Ok(self
            .live_marker(key, Instant::now())
            .and_then(|marker| marker.expires_in))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, CacheError> {
        self.ensure_available()?;
        let sender = read_or_recover(&self.channels, OWNER, "publish")
            .get(channel)
            .cloned();
        // `send` only fails when nobody is subscribed.
        Ok(sender
            .map(|sender| sender.send(payload).unwrap_or(0))
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.ensure_available()
    }
}

#[async_trait]
impl CacheSubscriber for MemoryCache {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, CacheError> {
        self.ensure_available()?;
        let capacity = self.options.channel_capacity;
        let receiver = write_or_recover(&self.channels, OWNER, "subscribe")
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            receiver,
        }))
    }
}

struct MemorySubscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Result<String, CacheError> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        target = "pixelwar::cache",
                        channel = %self.channel,
                        skipped,
                        "Subscriber lagged; skipped messages are not replayed"
                    );
                }
                Err(RecvError::Closed) => return Err(CacheError::Disconnected),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn hash_set_overwrites_and_set_if_absent_does_not() {
        let cache = MemoryCache::default();
        cache
            .hash_set("canvas", "1:1", "a".into())
            .await
            .expect("hash_set");
        cache
            .hash_set("canvas", "1:1", "b".into())
            .await
            .expect("hash_set");
        assert!(
            !cache
                .hash_set_if_absent("canvas", "1:1", "c".into())
                .await
                .expect("hash_set_if_absent")
        );
        assert!(
            cache
                .hash_set_if_absent("canvas", "2:2", "d".into())
                .await
                .expect("hash_set_if_absent")
        );

        assert_eq!(
            cache.hash_get("canvas", "1:1").await.expect("hash_get"),
            Some("b".to_string())
        );
        let mut all = cache.hash_get_all("canvas").await.expect("hash_get_all");
        all.sort();
        assert_eq!(
            all,
            vec![
                ("1:1".to_string(), "b".to_string()),
                ("2:2".to_string(), "d".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_expiry() {
        let cache = MemoryCache::default();
        assert!(
            cache
                .set_if_absent_with_expiry("cooldown:alice", "1".into(), TTL)
                .await
                .expect("first set")
        );
        assert!(
            !cache
                .set_if_absent_with_expiry("cooldown:alice", "1".into(), TTL)
                .await
                .expect("second set")
        );

        let remaining = cache
            .ttl("cooldown:alice")
            .await
            .expect("ttl")
            .expect("live marker");
        assert!(remaining <= TTL);

        tokio::time::advance(TTL + Duration::from_millis(1)).await;

        assert_eq!(cache.ttl("cooldown:alice").await.expect("ttl"), None);
        assert!(
            cache
                .set_if_absent_with_expiry("cooldown:alice", "1".into(), TTL)
                .await
                .expect("set after expiry")
        );
    }

    #[tokio::test]
    async fn atomic_primitive_can_be_disabled() {
        let cache = MemoryCache::new(MemoryCacheOptions {
            atomic_set_if_absent: false,
            ..Default::default()
        });
        assert_eq!(
            cache
                .set_if_absent_with_expiry("k", "1".into(), TTL)
                .await,
            Err(CacheError::Unsupported("set_if_absent_with_expiry"))
        );
    }

    #[tokio::test]
    async fn compare_and_set_checks_versions() {
        let cache = MemoryCache::default();
        assert!(
            cache
                .compare_and_set("k", None, "1".into(), TTL)
                .await
                .expect("create")
        );
        assert!(
            !cache
                .compare_and_set("k", None, "2".into(), TTL)
                .await
                .expect("create again")
        );

        let current = cache
            .get_versioned("k")
            .await
            .expect("get_versioned")
            .expect("live value");
        assert!(
            !cache
                .compare_and_set("k", Some(current.version + 100), "3".into(), TTL)
                .await
                .expect("stale version")
        );
        assert!(
            cache
                .compare_and_set("k", Some(current.version), "4".into(), TTL)
                .await
                .expect("matching version")
        );
        assert_eq!(
            cache
                .get_versioned("k")
                .await
                .expect("get_versioned")
                .map(|v| v.value),
            Some("4".to_string())
        );
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let cache = MemoryCache::default();
        cache.set_available(false);

        assert!(matches!(
            cache.hash_set("canvas", "1:1", "x".into()).await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(matches!(
            cache.publish("pixel_updates", "x".into()).await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.subscribe("pixel_updates").await.is_err());

        cache.set_available(true);
        assert!(cache.ping().await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let cache = MemoryCache::default();
        let mut first = cache.subscribe("pixel_updates").await.expect("subscribe");
        let mut second = cache.subscribe("pixel_updates").await.expect("subscribe");
        assert_eq!(cache.subscriber_count("pixel_updates"), 2);

        let delivered = cache
            .publish("pixel_updates", "hello".into())
            .await
            .expect("publish");
        assert_eq!(delivered, 2);
        assert_eq!(first.next_message().await.expect("message"), "hello");
        assert_eq!(second.next_message().await.expect("message"), "hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let cache = MemoryCache::default();
        assert_eq!(
            cache
                .publish("pixel_updates", "lost".into())
                .await
                .expect("publish"),
            0
        );
    }

    #[tokio::test]
    async fn dropped_subscriptions_report_disconnect() {
        let cache = MemoryCache::default();
        let mut subscription = cache.subscribe("pixel_updates").await.expect("subscribe");

        cache.drop_subscriptions();

        assert_eq!(
            subscription.next_message().await,
            Err(CacheError::Disconnected)
        );
    }

    #[tokio::test]
    async fn flush_clears_canvas_and_markers() {
        let cache = MemoryCache::default();
        cache
            .hash_set("canvas", "1:1", "x".into())
            .await
            .expect("hash_set");
        cache
            .set_if_absent_with_expiry("cooldown:alice", "1".into(), TTL)
            .await
            .expect("marker");

        cache.flush();

        assert!(cache.hash_get_all("canvas").await.expect("read").is_empty());
        assert_eq!(cache.ttl("cooldown:alice").await.expect("ttl"), None);
    }
}
