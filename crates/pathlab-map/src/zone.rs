use std::fmt::Display;
use std::str::FromStr;

use image::Rgb;

use crate::MapError;

/// Terrain classification of a single map cell.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Zone {
    Open,
    Road,
    Tree,
    #[default]
    Cliff,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::Open, Zone::Road, Zone::Tree, Zone::Cliff];

    /// Single character used for this zone in map files.
    pub fn code(self) -> char {
        match self {
            Zone::Open => 'O',
            Zone::Road => 'R',
            Zone::Tree => 'T',
            Zone::Cliff => 'C',
        }
    }

    pub fn from_code(c: char) -> Result<Self, MapError> {
        match c {
            'O' => Ok(Zone::Open),
            'R' => Ok(Zone::Road),
            'T' => Ok(Zone::Tree),
            'C' => Ok(Zone::Cliff),
            other => Err(MapError::UnknownZone(other)),
        }
    }

    /// Exact pixel color that marks this zone in a source image.
    pub fn color(self) -> Rgb<u8> {
        match self {
            Zone::Open => OPEN_COLOR,
            Zone::Road => ROAD_COLOR,
            Zone::Tree => TREE_COLOR,
            Zone::Cliff => CLIFF_COLOR,
        }
    }

    /// Classifies a pixel by exact color match. Anything outside the table is
    /// impassable.
    pub fn from_color(pixel: Rgb<u8>) -> Self {
        ZONE_COLORS
            .iter()
            .find(|(color, _)| *color == pixel)
            .map(|(_, zone)| *zone)
            .unwrap_or(Zone::Cliff)
    }
}

pub const OPEN_COLOR: Rgb<u8> = Rgb([125, 68, 29]);
pub const ROAD_COLOR: Rgb<u8> = Rgb([105, 105, 105]);
pub const TREE_COLOR: Rgb<u8> = Rgb([30, 147, 45]);
pub const CLIFF_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

pub const ZONE_COLORS: [(Rgb<u8>, Zone); 4] = [
    (OPEN_COLOR, Zone::Open),
    (ROAD_COLOR, Zone::Road),
    (TREE_COLOR, Zone::Tree),
    (CLIFF_COLOR, Zone::Cliff),
];

impl Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Zone {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Zone::from_code(c),
            _ => Err(MapError::UnknownZone(s.chars().next().unwrap_or(' '))),
        }
    }
}
