//! Application services: the placement pipeline, the cooldown limiter and canvas reads.

pub mod cooldown;
pub mod error;
pub mod placement;
pub mod repos;
pub mod snapshot;
