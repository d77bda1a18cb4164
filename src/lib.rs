//! pixelwar: a shared pixel canvas.
//!
//! Contributors place colored cells on a shared grid. Every accepted placement is rate limited
//! per contributor, appended to a durable log, written to a fast cache and fanned out to every
//! connected viewer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod realtime;
mod util;
