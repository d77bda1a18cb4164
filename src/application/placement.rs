//! The write path: validate, rate limit, commit to both stores and publish.

use std::sync::Arc;

use metrics::counter;
use pixelwar_api_types::UpdateEventPayload;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::cooldown::{ArmOutcome, CooldownLimiter};
use crate::application::repos::{PlacementsRepo, RepoError};
use crate::cache::{CANVAS_HASH, CacheError, FastCache};
use crate::domain::canvas::{CanvasBounds, ContributorId, Coordinate, Placement};
use crate::domain::palette::Color;

const METRIC_ACCEPTED: &str = "pixelwar_placements_accepted_total";
const METRIC_REJECTED: &str = "pixelwar_placements_rejected_total";
const METRIC_DIVERGENCE: &str = "pixelwar_durable_divergence_total";
const METRIC_PUBLISH_FAILURES: &str = "pixelwar_publish_failures_total";

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("claimed identity `{claimed}` does not match the verified contributor")]
    IdentityMismatch { claimed: String },
    #[error("color `{0}` is not part of the palette")]
    InvalidColor(String),
    #[error("cooldown active for another {remaining_seconds}s")]
    CooldownActive { remaining_seconds: u64 },
    #[error("cell {coordinate} is outside the {width}x{height} canvas")]
    OutOfBounds {
        coordinate: Coordinate,
        width: u32,
        height: u32,
    },
    #[error("placement could not be recorded durably")]
    DurableWriteFailure(#[source] RepoError),
    #[error("cache unavailable")]
    CacheUnavailable(#[source] CacheError),
}

impl PlacementError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PlacementError::IdentityMismatch { .. } => "identity_mismatch",
            PlacementError::InvalidColor(_) => "invalid_color",
            PlacementError::CooldownActive { .. } => "cooldown_active",
            PlacementError::OutOfBounds { .. } => "out_of_bounds",
            PlacementError::DurableWriteFailure(_) => "durable_write_failure",
            PlacementError::CacheUnavailable(_) => "cache_unavailable",
        }
    }

    /// Whether repeating the same request can succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlacementError::CooldownActive { .. }
                | PlacementError::DurableWriteFailure(_)
                | PlacementError::CacheUnavailable(_)
        )
    }
}

/// A placement request after transport decoding. Nothing here is validated yet.
#[derive(Debug, Clone)]
pub struct PlacementCommand {
    pub coordinate: Coordinate,
    pub color: String,
    /// Identity the caller put in the request body.
    pub claimed_contributor: String,
}

pub struct PlacementService {
    repo: Arc<dyn PlacementsRepo>,
    cache: Arc<dyn FastCache>,
    limiter: Arc<CooldownLimiter>,
    bounds: CanvasBounds,
    channel: String,
}

impl PlacementService {
    pub fn new(
        repo: Arc<dyn PlacementsRepo>,
        cache: Arc<dyn FastCache>,
        limiter: Arc<CooldownLimiter>,
        bounds: CanvasBounds,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            cache,
            limiter,
            bounds,
            channel: channel.into(),
        }
    }

    pub fn bounds(&self) -> CanvasBounds {
        self.bounds
    }

    /// Validate and commit one placement for the verified `contributor`.
    ///
    /// Checks run in order and the first failure wins: claimed identity, palette membership,
    /// cooldown, then bounds. An accepted placement arms the contributor's cooldown, overwrites
    /// the cell in the cache, appends to the durable log and publishes one update event.
    ///
    /// The cooldown is armed before anything is written, so a placement that later fails on
    /// either store still consumes the window. A durable failure after the cache write is not
    /// rolled back: the cache keeps the placement until it is overwritten or evicted.
    pub async fn submit(
        &self,
        contributor: &ContributorId,
        command: PlacementCommand,
    ) -> Result<Placement, PlacementError> {
        let result = self.try_submit(contributor, command).await;
        match &result {
            Ok(placement) => {
                counter!(METRIC_ACCEPTED).increment(1);
                info!(
                    target = "pixelwar::placement",
                    placement_id = %placement.id,
                    coordinate = %placement.coordinate,
                    color = %placement.color,
                    contributor = %placement.contributor,
                    "Placement accepted"
                );
            }
            Err(err) => {
                counter!(METRIC_REJECTED, "reason" => err.kind()).increment(1);
                debug!(
                    target = "pixelwar::placement",
                    contributor = %contributor,
                    reason = err.kind(),
                    error = %err,
                    "Placement rejected"
                );
            }
        }
        result
    }

    async fn try_submit(
        &self,
        contributor: &ContributorId,
        command: PlacementCommand,
    ) -> Result<Placement, PlacementError> {
        let PlacementCommand {
            coordinate,
            color,
            claimed_contributor,
        } = command;

        if claimed_contributor.trim() != contributor.as_str() {
            return Err(PlacementError::IdentityMismatch {
                claimed: claimed_contributor,
            });
        }

        let color = Color::from_hex(&color).map_err(|_| PlacementError::InvalidColor(color))?;

        if let Some(remaining_seconds) = self
            .limiter
            .is_blocked(contributor)
            .await
            .map_err(PlacementError::CacheUnavailable)?
        {
            return Err(PlacementError::CooldownActive { remaining_seconds });
        }

        if !self.bounds.contains(coordinate) {
            return Err(PlacementError::OutOfBounds {
                coordinate,
                width: self.bounds.width(),
                height: self.bounds.height(),
            });
        }

        // A concurrent submission may have armed the marker since the check above.
        match self
            .limiter
            .arm(contributor, self.limiter.window())
            .await
            .map_err(PlacementError::CacheUnavailable)?
        {
            ArmOutcome::Armed => {}
            ArmOutcome::Blocked { remaining_seconds } => {
                return Err(PlacementError::CooldownActive { remaining_seconds });
            }
        }

        let placement = Placement::new(coordinate, color, contributor.clone());
        self.commit(&placement).await?;
        self.publish(&placement).await;
        Ok(placement)
    }

    async fn commit(&self, placement: &Placement) -> Result<(), PlacementError> {
        let encoded = serde_json::to_string(placement)
            .map_err(|err| PlacementError::CacheUnavailable(CacheError::codec(err)))?;
        self.cache
            .hash_set(CANVAS_HASH, &placement.coordinate.to_string(), encoded)
            .await
            .map_err(PlacementError::CacheUnavailable)?;

        if let Err(err) = self.repo.append(placement).await {
            counter!(METRIC_DIVERGENCE).increment(1);
            warn!(
                target = "pixelwar::placement",
                placement_id = %placement.id,
                coordinate = %placement.coordinate,
                error = %err,
                "Durable append failed after cache write; cache now ahead of the log"
            );
            return Err(PlacementError::DurableWriteFailure(err));
        }

        Ok(())
    }

    /// Fire and forget: a failed publish never fails the placement.
    async fn publish(&self, placement: &Placement) {
        let payload = UpdateEventPayload::from(&placement.update_event());
        let encoded = match serde_json::to_string(&payload) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_PUBLISH_FAILURES).increment(1);
                warn!(target = "pixelwar::placement", error = %err, "Update event could not be encoded");
                return;
            }
        };

        match self.cache.publish(&self.channel, encoded).await {
            Ok(receivers) => debug!(
                target = "pixelwar::placement",
                channel = %self.channel,
                receivers,
                "Update event published"
            ),
            Err(err) => {
                counter!(METRIC_PUBLISH_FAILURES).increment(1);
                warn!(
                    target = "pixelwar::placement",
                    channel = %self.channel,
                    placement_id = %placement.id,
                    error = %err,
                    "Update event publish failed"
                );
            }
        }
    }
}
