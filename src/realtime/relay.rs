//! Bridge from the cache's update channel to the fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use pixelwar_api_types::UpdateEventPayload;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheSubscriber, Subscription};
use crate::domain::canvas::UpdateEvent;

use super::fanout::SessionManager;

const METRIC_EVENTS: &str = "pixelwar_relay_events_total";
const METRIC_DECODE_FAILURES: &str = "pixelwar_relay_decode_failures_total";
const METRIC_RECONNECTS: &str = "pixelwar_relay_reconnects_total";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay subscription lost")]
    Disconnected(#[source] CacheError),
    #[error("update event could not be decoded: {0}")]
    Decode(String),
}

/// Exponential reconnect delay, doubling up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl RelayBackoff {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for RelayBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
pub struct RelayStats {
    subscriptions: AtomicU64,
    events: AtomicU64,
    decode_failures: AtomicU64,
}

impl RelayStats {
    /// Successful subscriptions, including the first one.
    pub fn subscriptions(&self) -> u64 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::SeqCst)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::SeqCst)
    }
}

pub struct RelayBridge {
    subscriber: Arc<dyn CacheSubscriber>,
    channel: String,
    sessions: Arc<SessionManager>,
    backoff: RelayBackoff,
    stats: Arc<RelayStats>,
}

impl RelayBridge {
    pub fn new(
        subscriber: Arc<dyn CacheSubscriber>,
        channel: impl Into<String>,
        sessions: Arc<SessionManager>,
        backoff: RelayBackoff,
    ) -> Self {
        Self {
            subscriber,
            channel: channel.into(),
            sessions,
            backoff,
            stats: Arc::new(RelayStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Consume the channel forever, re-subscribing with backoff whenever the subscription is
    /// lost. Events published while disconnected are not replayed.
    pub async fn run(&self) {
        let mut delay = self.backoff.initial;
        loop {
            match self.subscriber.subscribe(&self.channel).await {
                Ok(mut subscription) => {
                    self.stats.subscriptions.fetch_add(1, Ordering::SeqCst);
                    info!(target = "pixelwar::relay", channel = %self.channel, "Relay subscribed");
                    delay = self.backoff.initial;

                    let err = self.pump(subscription.as_mut()).await;
                    warn!(
                        target = "pixelwar::relay",
                        channel = %self.channel,
                        error = %err,
                        "Relay disconnected; reconnecting"
                    );
                }
                Err(err) => warn!(
                    target = "pixelwar::relay",
                    channel = %self.channel,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Relay subscribe failed"
                ),
            }

            counter!(METRIC_RECONNECTS).increment(1);
            tokio::time::sleep(delay).await;
            delay = self.backoff.next(delay);
        }
    }

    async fn pump(&self, subscription: &mut dyn Subscription) -> RelayError {
        loop {
            match subscription.next_message().await {
                Ok(raw) => self.forward(&raw).await,
                Err(err) => return RelayError::Disconnected(err),
            }
        }
    }

    async fn forward(&self, raw: &str) {
        let event = match decode_event(raw) {
            Ok(event) => event,
            Err(err) => {
                self.stats.decode_failures.fetch_add(1, Ordering::SeqCst);
                counter!(METRIC_DECODE_FAILURES).increment(1);
                warn!(target = "pixelwar::relay", error = %err, "Skipping update event");
                return;
            }
        };

        self.stats.events.fetch_add(1, Ordering::SeqCst);
        counter!(METRIC_EVENTS).increment(1);
        let report = self.sessions.broadcast(&event).await;
        debug!(
            target = "pixelwar::relay",
            coordinate = %event.coordinate,
            delivered = report.delivered,
            dropped = report.dropped,
            "Update event relayed"
        );
    }
}

/// Decode one raw channel message.
pub fn decode_event(raw: &str) -> Result<UpdateEvent, RelayError> {
    let payload: UpdateEventPayload =
        serde_json::from_str(raw).map_err(|err| RelayError::Decode(err.to_string()))?;
    UpdateEvent::try_from(payload).map_err(|err| RelayError::Decode(err.to_string()))
}
