//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::canvas::{Coordinate, Placement};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Append-only log of every accepted placement.
#[async_trait]
pub trait PlacementsRepo: Send + Sync {
    /// Record one placement. A single append is atomic.
    async fn append(&self, placement: &Placement) -> Result<(), RepoError>;

    /// The most recent placement of every cell that was ever written.
    ///
    /// Scans the whole log; cost grows with the number of distinct cells.
    async fn latest_per_cell(&self) -> Result<Vec<Placement>, RepoError>;

    async fn latest_at(&self, coordinate: Coordinate) -> Result<Option<Placement>, RepoError>;

    /// Placements at one cell, newest first.
    async fn history(
        &self,
        coordinate: Coordinate,
        limit: u32,
    ) -> Result<Vec<Placement>, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;
}
