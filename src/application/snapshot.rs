//! Canvas reconstruction from the cache and the durable log.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::repos::{PlacementsRepo, RepoError};
use crate::cache::{CANVAS_HASH, CacheError, FastCache};
use crate::domain::canvas::{CanvasSnapshot, Coordinate, Placement};

const METRIC_SNAPSHOT_MS: &str = "pixelwar_snapshot_ms";

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("durable store query failed")]
    Repo(#[from] RepoError),
    #[error("cache query failed")]
    Cache(#[from] CacheError),
}

/// Outcome of copying durable rows into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub written: usize,
    pub skipped: usize,
}

pub fn clamp_history_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

pub struct CanvasService {
    repo: Arc<dyn PlacementsRepo>,
    cache: Arc<dyn FastCache>,
}

impl CanvasService {
    pub fn new(repo: Arc<dyn PlacementsRepo>, cache: Arc<dyn FastCache>) -> Self {
        Self { repo, cache }
    }

    /// Latest placement per cell.
    ///
    /// Cache entries win; durable rows fill every coordinate the cache does not hold. When the
    /// cache cannot be read the snapshot is built from the durable log alone.
    pub async fn snapshot(&self) -> Result<CanvasSnapshot, CanvasError> {
        let started_at = Instant::now();

        let mut snapshot = match self.cache.hash_get_all(CANVAS_HASH).await {
            Ok(entries) => decode_entries(entries),
            Err(err) => {
                warn!(
                    target = "pixelwar::canvas",
                    error = %err,
                    "Cache unreadable; rebuilding snapshot from the durable log only"
                );
                CanvasSnapshot::new()
            }
        };
        let cached = snapshot.len();

        let mut recovered = 0usize;
        for placement in self.repo.latest_per_cell().await? {
            if snapshot.insert_if_absent(placement) {
                recovered += 1;
            }
        }

        histogram!(METRIC_SNAPSHOT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target = "pixelwar::canvas",
            cached,
            recovered,
            cells = snapshot.len(),
            "Canvas snapshot built"
        );
        Ok(snapshot)
    }

    /// Latest placement at one cell: cache first, durable log otherwise.
    pub async fn cell(&self, coordinate: Coordinate) -> Result<Option<Placement>, CanvasError> {
        match self
            .cache
            .hash_get(CANVAS_HASH, &coordinate.to_string())
            .await
        {
            Ok(Some(raw)) => match serde_json::from_str::<Placement>(&raw) {
                Ok(placement) => return Ok(Some(placement)),
                Err(err) => warn!(
                    target = "pixelwar::canvas",
                    %coordinate,
                    error = %err,
                    "Cached cell could not be decoded"
                ),
            },
            Ok(None) => {}
            Err(err) => warn!(
                target = "pixelwar::canvas",
                %coordinate,
                error = %err,
                "Cache unreadable; falling back to the durable log"
            ),
        }

        Ok(self.repo.latest_at(coordinate).await?)
    }

    /// Placements at one cell, newest first. `limit` is clamped to `1..=100`, default 10.
    pub async fn history(
        &self,
        coordinate: Coordinate,
        limit: Option<u32>,
    ) -> Result<Vec<Placement>, CanvasError> {
        let limit = clamp_history_limit(limit);
        Ok(self.repo.history(coordinate, limit).await?)
    }

    /// Copy the latest durable row of every cell into the cache where the cache has no entry.
    ///
    /// Existing cache entries are never replaced, so a placement accepted while warming wins.
    pub async fn warm_cache(&self) -> Result<WarmReport, CanvasError> {
        let started_at = Instant::now();
        let mut report = WarmReport::default();

        for placement in self.repo.latest_per_cell().await? {
            let encoded = serde_json::to_string(&placement).map_err(CacheError::codec)?;
            let written = self
                .cache
                .hash_set_if_absent(CANVAS_HASH, &placement.coordinate.to_string(), encoded)
                .await?;
            if written {
                report.written += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            target = "pixelwar::canvas",
            written = report.written,
            skipped = report.skipped,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Cache warmed from the durable log"
        );
        Ok(report)
    }
}

fn decode_entries(entries: Vec<(String, String)>) -> CanvasSnapshot {
    let mut snapshot = CanvasSnapshot::new();
    for (field, raw) in entries {
        match serde_json::from_str::<Placement>(&raw) {
            Ok(placement) => {
                snapshot.insert_if_absent(placement);
            }
            Err(err) => warn!(
                target = "pixelwar::canvas",
                field = %field,
                error = %err,
                "Skipping undecodable cache entry"
            ),
        }
    }
    snapshot
}
