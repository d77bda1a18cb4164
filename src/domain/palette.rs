//! The fixed 18-color palette.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// One of the 18 colors a contributor may place.
///
/// Serialized as its uppercase `#RRGGBB` hex code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    Burgundy,
    DarkRed,
    Red,
    Orange,
    Yellow,
    PaleYellow,
    DarkGreen,
    Green,
    LightGreen,
    DarkTeal,
    Teal,
    DarkBlue,
    Blue,
    LightBlue,
    Indigo,
    Periwinkle,
    White,
    Black,
}

impl Color {
    pub const ALL: [Color; 18] = [
        Color::Burgundy,
        Color::DarkRed,
        Color::Red,
        Color::Orange,
        Color::Yellow,
        Color::PaleYellow,
        Color::DarkGreen,
        Color::Green,
        Color::LightGreen,
        Color::DarkTeal,
        Color::Teal,
        Color::DarkBlue,
        Color::Blue,
        Color::LightBlue,
        Color::Indigo,
        Color::Periwinkle,
        Color::White,
        Color::Black,
    ];

    pub fn hex(self) -> &'static str {
        match self {
            Color::Burgundy => "#6D001A",
            Color::DarkRed => "#BE0039",
            Color::Red => "#FF4500",
            Color::Orange => "#FFA800",
            Color::Yellow => "#FFD635",
            Color::PaleYellow => "#FFF8B8",
            Color::DarkGreen => "#00A368",
            Color::Green => "#00CC78",
            Color::LightGreen => "#7EED56",
            Color::DarkTeal => "#00756F",
            Color::Teal => "#009EAA",
            Color::DarkBlue => "#2450A4",
            Color::Blue => "#3690EA",
            Color::LightBlue => "#51E9F4",
            Color::Indigo => "#493AC1",
            Color::Periwinkle => "#6A5CFF",
            Color::White => "#FFFFFF",
            Color::Black => "#000000",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::Burgundy => "burgundy",
            Color::DarkRed => "dark_red",
            Color::Red => "red",
            Color::Orange => "orange",
            Color::Yellow => "yellow",
            Color::PaleYellow => "pale_yellow",
            Color::DarkGreen => "dark_green",
            Color::Green => "green",
            Color::LightGreen => "light_green",
            Color::DarkTeal => "dark_teal",
            Color::Teal => "teal",
            Color::DarkBlue => "dark_blue",
            Color::Blue => "blue",
            Color::LightBlue => "light_blue",
            Color::Indigo => "indigo",
            Color::Periwinkle => "periwinkle",
            Color::White => "white",
            Color::Black => "black",
        }
    }

    /// Parse a `#RRGGBB` code. Hex digits are matched case-insensitively.
    pub fn from_hex(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.hex().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| DomainError::unknown_color(value))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

impl FromStr for Color {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.hex().to_string()
    }
}
