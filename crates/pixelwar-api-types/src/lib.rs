//! Wire types shared by the pixelwar server and its clients.
//!
//! Every JSON body the HTTP surface accepts or returns, plus the payload carried on the
//! live-update channel, is defined here so both sides agree on field names and encodings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Body of `POST /pixel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub x: i32,
    pub y: i32,
    pub color: String,
    /// Contributor the caller claims to act as; must match the verified session.
    pub player: String,
}

/// An accepted placement as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementView {
    pub id: Uuid,
    pub x: i32,
    pub y: i32,
    pub color: String,
    pub player: String,
    #[serde(with = "time::serde::rfc3339")]
    pub placed_at: OffsetDateTime,
}

/// The visible state of one cell inside a canvas response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellView {
    pub color: String,
    pub player: String,
    #[serde(with = "time::serde::rfc3339")]
    pub placed_at: OffsetDateTime,
}

/// Full canvas keyed by `"x:y"`.
pub type CanvasResponse = BTreeMap<String, CellView>;

/// Key used for a cell inside [`CanvasResponse`].
pub fn cell_key(x: i32, y: i32) -> String {
    format!("{x}:{y}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownResponse {
    pub remaining_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub name: String,
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteResponse {
    pub colors: Vec<PaletteEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub x: i32,
    pub y: i32,
    /// Newest first.
    pub entries: Vec<PlacementView>,
}

/// Payload published on the canvas channel and pushed to viewers as a `pixel_update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventPayload {
    pub x: i32,
    pub y: i32,
    pub color: String,
    pub player: String,
}

/// Name of the server-sent event carrying an [`UpdateEventPayload`].
pub const UPDATE_EVENT_NAME: &str = "pixel_update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
