//! Per-contributor cooldown built on expiring cache markers.
//!
//! A contributor is blocked while a live marker exists under `cooldown:{id}`. Markers are never
//! cleared explicitly; they disappear when their expiry passes.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheError, FastCache, cooldown_key};
use crate::domain::canvas::ContributorId;

const MARKER_VALUE: &str = "1";

/// Result of trying to arm a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed,
    /// A live marker already existed; nothing was written.
    Blocked { remaining_seconds: u64 },
}

pub struct CooldownLimiter {
    cache: Arc<dyn FastCache>,
    window: Duration,
    cas_retry_budget: u32,
}

impl CooldownLimiter {
    pub fn new(cache: Arc<dyn FastCache>, window: Duration, cas_retry_budget: u32) -> Self {
        Self {
            cache,
            window,
            cas_retry_budget: cas_retry_budget.max(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remaining whole seconds of a live marker, rounded up.
    pub async fn is_blocked(&self, contributor: &ContributorId) -> Result<Option<u64>, CacheError> {
        let ttl = self.cache.ttl(&cooldown_key(contributor)).await?;
        Ok(ttl.map(ceil_seconds))
    }

    /// Remaining seconds, `0` when the contributor may place.
    pub async fn remaining(&self, contributor: &ContributorId) -> Result<u64, CacheError> {
        Ok(self.is_blocked(contributor).await?.unwrap_or(0))
    }

    /// Arm a marker for `window` unless one is live.
    ///
    /// Uses the backend's atomic set-if-absent-with-expiry. Backends without it are driven through
    /// a bounded compare-and-set loop that fails with [`CacheError::Contention`] once the retry
    /// budget is spent.
    pub async fn arm(
        &self,
        contributor: &ContributorId,
        window: Duration,
    ) -> Result<ArmOutcome, CacheError> {
        let key = cooldown_key(contributor);
        match self
            .cache
            .set_if_absent_with_expiry(&key, MARKER_VALUE.to_string(), window)
            .await
        {
            Ok(true) => Ok(ArmOutcome::Armed),
            Ok(false) => {
                let remaining = self.cache.ttl(&key).await?.map(ceil_seconds);
                Ok(blocked(remaining))
            }
            Err(CacheError::Unsupported(_)) => self.arm_with_compare_and_set(&key, window).await,
            Err(err) => Err(err),
        }
    }

    async fn arm_with_compare_and_set(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<ArmOutcome, CacheError> {
        for attempt in 1..=self.cas_retry_budget {
            if let Some(current) = self.cache.get_versioned(key).await? {
                return Ok(blocked(current.expires_in.map(ceil_seconds)));
            }

            if self
                .cache
                .compare_and_set(key, None, MARKER_VALUE.to_string(), window)
                .await?
            {
                return Ok(ArmOutcome::Armed);
            }

            debug!(
                target = "pixelwar::cooldown",
                key, attempt, "Cooldown marker changed during compare-and-set; retrying"
            );
        }

        Err(CacheError::Contention {
            attempts: self.cas_retry_budget,
        })
    }
}

/// A marker that expired between the write attempt and the ttl read still blocked this attempt.
fn blocked(remaining: Option<u64>) -> ArmOutcome {
    ArmOutcome::Blocked {
        remaining_seconds: remaining.unwrap_or(1).max(1),
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
