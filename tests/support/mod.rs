#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use pixelwar::application::cooldown::CooldownLimiter;
use pixelwar::application::placement::{PlacementCommand, PlacementService};
use pixelwar::application::repos::{HealthRepo, PlacementsRepo, RepoError};
use pixelwar::application::snapshot::CanvasService;
use pixelwar::cache::{MemoryCache, MemoryCacheOptions};
use pixelwar::domain::canvas::{CanvasBounds, ContributorId, Coordinate, Placement};

pub const CHANNEL: &str = "pixel_updates";
pub const WINDOW: Duration = Duration::from_secs(9);

/// Append-only log kept in memory, with switches to simulate database failures.
#[derive(Default)]
pub struct InMemoryPlacements {
    rows: Mutex<Vec<Placement>>,
    fail_appends: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryPlacements {
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn rows(&self) -> Vec<Placement> {
        self.rows.lock().await.clone()
    }

    pub async fn seed(&self, placement: Placement) {
        self.rows.lock().await.push(placement);
    }

    fn check_reads(&self) -> Result<(), RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PlacementsRepo for InMemoryPlacements {
    async fn append(&self, placement: &Placement) -> Result<(), RepoError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset by peer"));
        }
        self.rows.lock().await.push(placement.clone());
        Ok(())
    }

    async fn latest_per_cell(&self) -> Result<Vec<Placement>, RepoError> {
        self.check_reads()?;
        let latest: BTreeMap<Coordinate, Placement> = self
            .rows
            .lock()
            .await
            .iter()
            .map(|placement| (placement.coordinate, placement.clone()))
            .collect();
        Ok(latest.into_values().collect())
    }

    async fn latest_at(&self, coordinate: Coordinate) -> Result<Option<Placement>, RepoError> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .find(|placement| placement.coordinate == coordinate)
            .cloned())
    }

    async fn history(
        &self,
        coordinate: Coordinate,
        limit: u32,
    ) -> Result<Vec<Placement>, RepoError> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .rev()
            .filter(|placement| placement.coordinate == coordinate)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HealthRepo for InMemoryPlacements {
    async fn health_check(&self) -> Result<(), RepoError> {
        self.check_reads()
    }
}

pub struct Harness {
    pub cache: Arc<MemoryCache>,
    pub repo: Arc<InMemoryPlacements>,
    pub limiter: Arc<CooldownLimiter>,
    pub placements: Arc<PlacementService>,
    pub canvas: Arc<CanvasService>,
}

pub fn harness() -> Harness {
    harness_with(MemoryCacheOptions::default())
}

pub fn harness_with(options: MemoryCacheOptions) -> Harness {
    let cache = Arc::new(MemoryCache::new(options));
    let repo = Arc::new(InMemoryPlacements::default());
    let limiter = Arc::new(CooldownLimiter::new(cache.clone(), WINDOW, 5));
    let placements = Arc::new(PlacementService::new(
        repo.clone(),
        cache.clone(),
        limiter.clone(),
        CanvasBounds::new(50, 50).expect("valid bounds"),
        CHANNEL,
    ));
    let canvas = Arc::new(CanvasService::new(repo.clone(), cache.clone()));

    Harness {
        cache,
        repo,
        limiter,
        placements,
        canvas,
    }
}

pub fn contributor(name: &str) -> ContributorId {
    ContributorId::parse(name).expect("valid contributor")
}

pub fn command(x: i32, y: i32, color: &str, player: &str) -> PlacementCommand {
    PlacementCommand {
        coordinate: Coordinate::new(x, y),
        color: color.to_string(),
        claimed_contributor: player.to_string(),
    }
}

pub fn placement(x: i32, y: i32, color: pixelwar::domain::palette::Color, who: &str) -> Placement {
    Placement::new(Coordinate::new(x, y), color, contributor(who))
}
