//! Terrain maps for the distributed pathfinding program: the zone alphabet,
//! the text grid format and the image to grid encoder.

use std::path::PathBuf;

mod encode;
mod grid;
mod zone;

pub use encode::{encode, encode_image, encode_to_file, open_image, Border};
pub use grid::ZoneMap;
pub use zone::{Zone, CLIFF_COLOR, OPEN_COLOR, ROAD_COLOR, TREE_COLOR, ZONE_COLORS};

/// File extension of encoded map files.
pub const MAP_EXTENSION: &str = "map";

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("cannot read image {}: {source}", .path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid map header '{0}': expected '<height> <width>'")]
    Header(String),
    #[error("map declares {expected} rows but has {found}")]
    RowCount { expected: usize, found: usize },
    #[error("map row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown zone code '{0}'")]
    UnknownZone(char),
}
