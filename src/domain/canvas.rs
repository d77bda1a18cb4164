//! Canvas cells, placements and the views derived from them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use pixelwar_api_types::{CanvasResponse, CellView, PlacementView, UpdateEventPayload};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::palette::Color;

/// One addressable cell. Rendered as `x:y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

impl FromStr for Coordinate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("`{s}` is not an `x:y` pair")))?;
        let x = x
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid x in `{s}`")))?;
        let y = y
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid y in `{s}`")))?;
        Ok(Self { x, y })
    }
}

/// Canvas dimensions. Valid cells satisfy `0 <= x < width` and `0 <= y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasBounds {
    width: u32,
    height: u32,
}

impl CanvasBounds {
    pub fn new(width: u32, height: u32) -> Result<Self, DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::validation(
                "canvas dimensions must be greater than zero",
            ));
        }
        if width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(DomainError::validation(
                "canvas dimensions exceed the coordinate range",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate.x >= 0
            && coordinate.y >= 0
            && (coordinate.x as u32) < self.width
            && (coordinate.y as u32) < self.height
    }
}

/// Verified identity of a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContributorId(String);

impl ContributorId {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("contributor id must not be empty"));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::validation(
                "contributor id must not contain control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContributorId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContributorId> for String {
    fn from(id: ContributorId) -> Self {
        id.0
    }
}

/// An accepted write of a color to a cell. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: Uuid,
    pub coordinate: Coordinate,
    pub color: Color,
    pub contributor: ContributorId,
    #[serde(with = "time::serde::rfc3339")]
    pub placed_at: OffsetDateTime,
}

impl Placement {
    pub fn new(coordinate: Coordinate, color: Color, contributor: ContributorId) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate,
            color,
            contributor,
            placed_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn update_event(&self) -> UpdateEvent {
        UpdateEvent::from(self)
    }
}

impl From<&Placement> for PlacementView {
    fn from(placement: &Placement) -> Self {
        Self {
            id: placement.id,
            x: placement.coordinate.x,
            y: placement.coordinate.y,
            color: placement.color.hex().to_string(),
            player: placement.contributor.to_string(),
            placed_at: placement.placed_at,
        }
    }
}

/// Live notification that a cell changed; a projection of [`Placement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub coordinate: Coordinate,
    pub color: Color,
    pub contributor: ContributorId,
}

impl From<&Placement> for UpdateEvent {
    fn from(placement: &Placement) -> Self {
        Self {
            coordinate: placement.coordinate,
            color: placement.color,
            contributor: placement.contributor.clone(),
        }
    }
}

impl From<&UpdateEvent> for UpdateEventPayload {
    fn from(event: &UpdateEvent) -> Self {
        Self {
            x: event.coordinate.x,
            y: event.coordinate.y,
            color: event.color.hex().to_string(),
            player: event.contributor.to_string(),
        }
    }
}

impl TryFrom<UpdateEventPayload> for UpdateEvent {
    type Error = DomainError;

    fn try_from(payload: UpdateEventPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            coordinate: Coordinate::new(payload.x, payload.y),
            color: Color::from_hex(&payload.color)?,
            contributor: ContributorId::parse(payload.player)?,
        })
    }
}

/// Latest placement per cell, reconstructed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanvasSnapshot {
    cells: BTreeMap<Coordinate, Placement>,
}

impl CanvasSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the coordinate is already present. Returns whether the entry was added.
    pub fn insert_if_absent(&mut self, placement: Placement) -> bool {
        match self.cells.entry(placement.coordinate) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(placement);
                true
            }
        }
    }

    pub fn get(&self, coordinate: Coordinate) -> Option<&Placement> {
        self.cells.get(&coordinate)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &Placement)> {
        self.cells.iter()
    }

    pub fn to_response(&self) -> CanvasResponse {
        self.cells
            .iter()
            .map(|(coordinate, placement)| {
                (
                    coordinate.to_string(),
                    CellView {
                        color: placement.color.hex().to_string(),
                        player: placement.contributor.to_string(),
                        placed_at: placement.placed_at,
                    },
                )
            })
            .collect()
    }
}

impl FromIterator<Placement> for CanvasSnapshot {
    /// Later placements for the same coordinate replace earlier ones.
    fn from_iter<I: IntoIterator<Item = Placement>>(iter: I) -> Self {
        let cells = iter
            .into_iter()
            .map(|placement| (placement.coordinate, placement))
            .collect();
        Self { cells }
    }
}

/// What a viewer draws: the last applied color and contributor per cell.
///
/// Applying the same event twice leaves the canvas unchanged, so at-least-once delivery is safe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerCanvas {
    cells: HashMap<Coordinate, (Color, ContributorId)>,
}

impl ViewerCanvas {
    pub fn from_snapshot(snapshot: &CanvasSnapshot) -> Self {
        let cells = snapshot
            .iter()
            .map(|(coordinate, placement)| {
                (
                    *coordinate,
                    (placement.color, placement.contributor.clone()),
                )
            })
            .collect();
        Self { cells }
    }

    /// Apply an event, last applied wins. Returns whether the visible state changed.
    pub fn apply(&mut self, event: &UpdateEvent) -> bool {
        let next = (event.color, event.contributor.clone());
        match self.cells.insert(event.coordinate, next.clone()) {
            Some(previous) => previous != next,
            None => true,
        }
    }

    pub fn color_at(&self, coordinate: Coordinate) -> Option<Color> {
        self.cells.get(&coordinate).map(|(color, _)| *color)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
