//! Domain layer types and invariants.

pub mod canvas;
pub mod error;
pub mod palette;
